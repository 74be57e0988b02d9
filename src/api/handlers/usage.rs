//! Management handlers for usage aggregation queries.

use crate::api::models::usage::{
    DailyUsageResponse, RecentUsageResponse, UsageByKeyResponse, UsageByModelResponse, UsageByProviderResponse,
    UsageQuery, UsageRecordResponse, UsageSummaryResponse,
};
use crate::auth::AuthUser;
use crate::db::handlers::usage as usage_db;
use crate::errors::Result;
use crate::AppState;
use axum::{
    extract::{Query, State},
    response::Json,
};

/// Overall usage summary over the filtered window.
#[utoipa::path(
    get,
    path = "/usage",
    tag = "usage",
    params(UsageQuery),
    responses((status = 200, description = "Usage summary", body = UsageSummaryResponse))
)]
pub async fn summary(
    State(state): State<AppState>,
    Query(query): Query<UsageQuery>,
    user: AuthUser,
) -> Result<Json<UsageSummaryResponse>> {
    let row = usage_db::summary(&state.db, user.id, &query.filter()).await?;
    Ok(Json(UsageSummaryResponse::from(row)))
}

/// Usage grouped by calendar date, newest first.
#[utoipa::path(
    get,
    path = "/usage/daily",
    tag = "usage",
    params(UsageQuery),
    responses((status = 200, description = "Daily usage", body = [DailyUsageResponse]))
)]
pub async fn daily(
    State(state): State<AppState>,
    Query(query): Query<UsageQuery>,
    user: AuthUser,
) -> Result<Json<Vec<DailyUsageResponse>>> {
    let rows = usage_db::daily(&state.db, user.id, &query.filter()).await?;
    Ok(Json(rows.into_iter().filter_map(DailyUsageResponse::from_row).collect()))
}

/// Usage grouped by proxy key.
#[utoipa::path(
    get,
    path = "/usage/by-key",
    tag = "usage",
    params(UsageQuery),
    responses((status = 200, description = "Usage by key", body = [UsageByKeyResponse]))
)]
pub async fn by_key(
    State(state): State<AppState>,
    Query(query): Query<UsageQuery>,
    user: AuthUser,
) -> Result<Json<Vec<UsageByKeyResponse>>> {
    let rows = usage_db::by_key(&state.db, user.id, &query.filter()).await?;
    Ok(Json(rows.into_iter().map(UsageByKeyResponse::from).collect()))
}

/// Usage grouped by provider.
#[utoipa::path(
    get,
    path = "/usage/by-provider",
    tag = "usage",
    params(UsageQuery),
    responses((status = 200, description = "Usage by provider", body = [UsageByProviderResponse]))
)]
pub async fn by_provider(
    State(state): State<AppState>,
    Query(query): Query<UsageQuery>,
    user: AuthUser,
) -> Result<Json<Vec<UsageByProviderResponse>>> {
    let rows = usage_db::by_provider(&state.db, user.id, &query.filter()).await?;
    Ok(Json(rows.into_iter().map(UsageByProviderResponse::from).collect()))
}

/// Usage grouped by the model string as received.
#[utoipa::path(
    get,
    path = "/usage/by-model",
    tag = "usage",
    params(UsageQuery),
    responses((status = 200, description = "Usage by model", body = [UsageByModelResponse]))
)]
pub async fn by_model(
    State(state): State<AppState>,
    Query(query): Query<UsageQuery>,
    user: AuthUser,
) -> Result<Json<Vec<UsageByModelResponse>>> {
    let rows = usage_db::by_model(&state.db, user.id, &query.filter()).await?;
    Ok(Json(rows.into_iter().map(UsageByModelResponse::from).collect()))
}

/// Newest-first page of raw usage records with a total count for
/// pagination.
#[utoipa::path(
    get,
    path = "/usage/recent",
    tag = "usage",
    params(UsageQuery),
    responses((status = 200, description = "Recent usage records", body = RecentUsageResponse))
)]
pub async fn recent(
    State(state): State<AppState>,
    Query(query): Query<UsageQuery>,
    user: AuthUser,
) -> Result<Json<RecentUsageResponse>> {
    let filter = query.filter();
    let limit = query.limit();
    let offset = query.offset();

    let rows = usage_db::recent(&state.db, user.id, &filter, limit, offset).await?;
    let total_count = usage_db::count(&state.db, user.id, &filter).await?;

    Ok(Json(RecentUsageResponse {
        records: rows.into_iter().map(UsageRecordResponse::from).collect(),
        total_count,
        limit,
        offset,
    }))
}
