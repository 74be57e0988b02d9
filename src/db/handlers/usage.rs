//! Database queries for usage recording and time-windowed aggregation.
//!
//! Aggregations run over the shared pool rather than a checked-out
//! connection; each query is a single statement and the optional filters are
//! assembled with `QueryBuilder`.

use crate::db::errors::Result;
use crate::db::models::usage::{
    DailyUsageRow, UsageByKeyRow, UsageByModelRow, UsageByProviderRow, UsageFilter, UsageRecordCreateDBRequest,
    UsageRecordDetailRow, UsageSummaryRow,
};
use crate::types::UserId;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::instrument;

/// Append the optional usage filters to a query. `alias` is the table alias
/// the surrounding query uses for `usage_records` (empty for unaliased).
fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, alias: &str, filter: &UsageFilter) {
    let col = |name: &str| {
        if alias.is_empty() {
            name.to_string()
        } else {
            format!("{alias}.{name}")
        }
    };

    if let Some(start) = filter.start {
        qb.push(format!(" AND {} >= ", col("created_at"))).push_bind(start);
    }
    if let Some(end) = filter.end {
        qb.push(format!(" AND {} <= ", col("created_at"))).push_bind(end);
    }
    if let Some(provider_id) = filter.provider_id {
        qb.push(format!(" AND {} = ", col("provider_id"))).push_bind(provider_id);
    }
    if let Some(key_id) = filter.key_id {
        qb.push(format!(" AND {} = ", col("proxy_key_id"))).push_bind(key_id);
    }
    if let Some(model) = filter.model.clone().filter(|m| !m.is_empty()) {
        qb.push(format!(" AND {} = ", col("model"))).push_bind(model);
    }
}

#[instrument(skip(db, request), fields(model = %request.model, status = request.status_code), err)]
pub async fn insert_record(db: &PgPool, request: &UsageRecordCreateDBRequest) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO usage_records
            (user_id, proxy_key_id, provider_id, model, input_tokens, output_tokens,
             total_tokens, cost, request_duration_ms, status_code, error_message)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(request.user_id)
    .bind(request.proxy_key_id)
    .bind(request.provider_id)
    .bind(&request.model)
    .bind(request.input_tokens)
    .bind(request.output_tokens)
    .bind(request.total_tokens)
    .bind(request.cost)
    .bind(request.request_duration_ms)
    .bind(request.status_code)
    .bind(&request.error_message)
    .execute(db)
    .await?;

    Ok(())
}

#[instrument(skip(db, filter), err)]
pub async fn summary(db: &PgPool, user_id: UserId, filter: &UsageFilter) -> Result<UsageSummaryRow> {
    let mut qb = QueryBuilder::new(
        r#"
        SELECT
            COUNT(*) AS total_requests,
            COUNT(*) FILTER (WHERE status_code >= 200 AND status_code < 300 AND error_message = '') AS successful_requests,
            COUNT(*) FILTER (WHERE status_code >= 400 OR error_message <> '') AS failed_requests,
            COALESCE(SUM(input_tokens), 0)::bigint AS total_input_tokens,
            COALESCE(SUM(output_tokens), 0)::bigint AS total_output_tokens,
            COALESCE(SUM(total_tokens), 0)::bigint AS total_tokens,
            COALESCE(SUM(cost), 0)::float8 AS total_cost,
            COALESCE(SUM(request_duration_ms), 0)::bigint AS total_duration_ms,
            MIN(created_at) AS period_start,
            MAX(created_at) AS period_end
        FROM usage_records
        WHERE deleted_at IS NULL AND user_id = "#,
    );
    qb.push_bind(user_id);
    push_filters(&mut qb, "", filter);

    let row = qb.build_query_as::<UsageSummaryRow>().fetch_one(db).await?;
    Ok(row)
}

#[instrument(skip(db, filter), err)]
pub async fn daily(db: &PgPool, user_id: UserId, filter: &UsageFilter) -> Result<Vec<DailyUsageRow>> {
    let mut qb = QueryBuilder::new(
        r#"
        SELECT
            created_at::date AS date,
            COUNT(*) AS requests,
            COALESCE(SUM(input_tokens), 0)::bigint AS input_tokens,
            COALESCE(SUM(output_tokens), 0)::bigint AS output_tokens,
            COALESCE(SUM(total_tokens), 0)::bigint AS total_tokens,
            COALESCE(SUM(cost), 0)::float8 AS cost,
            COALESCE(SUM(request_duration_ms), 0)::bigint AS total_duration_ms
        FROM usage_records
        WHERE deleted_at IS NULL AND user_id = "#,
    );
    qb.push_bind(user_id);
    push_filters(&mut qb, "", filter);
    qb.push(" GROUP BY created_at::date ORDER BY date DESC");

    let rows = qb.build_query_as::<DailyUsageRow>().fetch_all(db).await?;
    Ok(rows)
}

#[instrument(skip(db, filter), err)]
pub async fn by_key(db: &PgPool, user_id: UserId, filter: &UsageFilter) -> Result<Vec<UsageByKeyRow>> {
    let mut qb = QueryBuilder::new(
        r#"
        SELECT
            ur.proxy_key_id AS key_id,
            pk.key_prefix AS key_prefix,
            pk.name AS key_name,
            COUNT(*) AS requests,
            COALESCE(SUM(ur.input_tokens), 0)::bigint AS input_tokens,
            COALESCE(SUM(ur.output_tokens), 0)::bigint AS output_tokens,
            COALESCE(SUM(ur.total_tokens), 0)::bigint AS total_tokens,
            COALESCE(SUM(ur.cost), 0)::float8 AS cost,
            COALESCE(SUM(ur.request_duration_ms), 0)::bigint AS total_duration_ms
        FROM usage_records ur
        LEFT JOIN proxy_keys pk ON ur.proxy_key_id = pk.id
        WHERE ur.deleted_at IS NULL AND ur.user_id = "#,
    );
    qb.push_bind(user_id);
    push_filters(&mut qb, "ur", filter);
    qb.push(" GROUP BY ur.proxy_key_id, pk.key_prefix, pk.name ORDER BY requests DESC");

    let rows = qb.build_query_as::<UsageByKeyRow>().fetch_all(db).await?;
    Ok(rows)
}

#[instrument(skip(db, filter), err)]
pub async fn by_provider(db: &PgPool, user_id: UserId, filter: &UsageFilter) -> Result<Vec<UsageByProviderRow>> {
    let mut qb = QueryBuilder::new(
        r#"
        SELECT
            ur.provider_id AS provider_id,
            p.name AS provider_name,
            p.provider_type AS provider_type,
            COUNT(*) AS requests,
            COALESCE(SUM(ur.input_tokens), 0)::bigint AS input_tokens,
            COALESCE(SUM(ur.output_tokens), 0)::bigint AS output_tokens,
            COALESCE(SUM(ur.total_tokens), 0)::bigint AS total_tokens,
            COALESCE(SUM(ur.cost), 0)::float8 AS cost,
            COALESCE(SUM(ur.request_duration_ms), 0)::bigint AS total_duration_ms
        FROM usage_records ur
        LEFT JOIN providers p ON ur.provider_id = p.id
        WHERE ur.deleted_at IS NULL AND ur.user_id = "#,
    );
    qb.push_bind(user_id);
    push_filters(&mut qb, "ur", filter);
    qb.push(" GROUP BY ur.provider_id, p.name, p.provider_type ORDER BY requests DESC");

    let rows = qb.build_query_as::<UsageByProviderRow>().fetch_all(db).await?;
    Ok(rows)
}

#[instrument(skip(db, filter), err)]
pub async fn by_model(db: &PgPool, user_id: UserId, filter: &UsageFilter) -> Result<Vec<UsageByModelRow>> {
    let mut qb = QueryBuilder::new(
        r#"
        SELECT
            model,
            COUNT(*) AS requests,
            COALESCE(SUM(input_tokens), 0)::bigint AS input_tokens,
            COALESCE(SUM(output_tokens), 0)::bigint AS output_tokens,
            COALESCE(SUM(total_tokens), 0)::bigint AS total_tokens,
            COALESCE(SUM(cost), 0)::float8 AS cost,
            COALESCE(SUM(request_duration_ms), 0)::bigint AS total_duration_ms
        FROM usage_records
        WHERE deleted_at IS NULL AND user_id = "#,
    );
    qb.push_bind(user_id);
    push_filters(&mut qb, "", filter);
    qb.push(" GROUP BY model ORDER BY requests DESC");

    let rows = qb.build_query_as::<UsageByModelRow>().fetch_all(db).await?;
    Ok(rows)
}

#[instrument(skip(db, filter), err)]
pub async fn recent(
    db: &PgPool,
    user_id: UserId,
    filter: &UsageFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<UsageRecordDetailRow>> {
    let mut qb = QueryBuilder::new(
        r#"
        SELECT
            ur.id, ur.user_id, ur.proxy_key_id, ur.provider_id, ur.model,
            ur.input_tokens, ur.output_tokens, ur.total_tokens, ur.cost,
            ur.request_duration_ms, ur.status_code, ur.error_message, ur.created_at,
            pk.key_prefix AS key_prefix,
            p.name AS provider_name,
            p.provider_type AS provider_type
        FROM usage_records ur
        LEFT JOIN proxy_keys pk ON ur.proxy_key_id = pk.id
        LEFT JOIN providers p ON ur.provider_id = p.id
        WHERE ur.deleted_at IS NULL AND ur.user_id = "#,
    );
    qb.push_bind(user_id);
    push_filters(&mut qb, "ur", filter);
    qb.push(" ORDER BY ur.created_at DESC LIMIT ");
    qb.push_bind(limit);
    qb.push(" OFFSET ");
    qb.push_bind(offset);

    let rows = qb.build_query_as::<UsageRecordDetailRow>().fetch_all(db).await?;
    Ok(rows)
}

#[instrument(skip(db, filter), err)]
pub async fn count(db: &PgPool, user_id: UserId, filter: &UsageFilter) -> Result<i64> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM usage_records WHERE deleted_at IS NULL AND user_id = ");
    qb.push_bind(user_id);
    push_filters(&mut qb, "", filter);

    let count: i64 = qb.build_query_scalar().fetch_one(db).await?;
    Ok(count)
}
