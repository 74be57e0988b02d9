//! Management handlers for provider configurations.

use crate::api::models::providers::{ProviderCreate, ProviderResponse, ProviderUpdate, TestConnectionResponse};
use crate::auth::AuthUser;
use crate::db::handlers::Providers;
use crate::db::models::providers::{ProviderCreateDBRequest, ProviderDBResponse, ProviderUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::providers::probe::ProbeReport;
use crate::providers::ProviderKind;
use crate::types::ProviderId;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;

/// List the caller's providers.
#[utoipa::path(
    get,
    path = "/providers",
    tag = "providers",
    responses(
        (status = 200, description = "List of providers", body = [ProviderResponse]),
        (status = 401, description = "Unauthorized"),
    )
)]
pub async fn list_providers(State(state): State<AppState>, user: AuthUser) -> Result<Json<Vec<ProviderResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let providers = Providers::new(&mut conn).list_for_user(user.id).await?;
    Ok(Json(providers.into_iter().map(ProviderResponse::from).collect()))
}

/// Create a provider. For `anthropic_max` the submitted credential is a
/// refresh token: the row is written, a refresh is attempted immediately,
/// and the row is removed again if the token turns out to be invalid.
#[utoipa::path(
    post,
    path = "/providers",
    tag = "providers",
    request_body = ProviderCreate,
    responses(
        (status = 201, description = "Provider created", body = ProviderResponse),
        (status = 400, description = "Invalid provider data"),
        (status = 401, description = "Unauthorized"),
    )
)]
pub async fn create_provider(
    State(state): State<AppState>,
    user: AuthUser,
    Json(data): Json<ProviderCreate>,
) -> Result<(StatusCode, Json<ProviderResponse>)> {
    data.validate()?;

    let is_oauth_bootstrap = data.provider_type == ProviderKind::AnthropicMax;
    let db_request = ProviderCreateDBRequest {
        user_id: user.id,
        name: data.name,
        provider_type: data.provider_type,
        base_url: data.base_url.filter(|u| !u.is_empty()),
        api_key: if is_oauth_bootstrap { String::new() } else { data.api_key.clone() },
        refresh_token: if is_oauth_bootstrap { data.api_key } else { String::new() },
        is_active: data.is_active.unwrap_or(true),
        default_model: data.default_model.unwrap_or_default(),
        input_cost_per_million: data.input_cost_per_million,
        output_cost_per_million: data.output_cost_per_million,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut provider = Providers::new(&mut conn).create(&db_request).await?;

    if is_oauth_bootstrap {
        if let Err(e) = state.oauth.refresh_access_token(&mut provider).await {
            Providers::new(&mut conn).hard_delete(provider.id).await?;
            return Err(Error::BadRequest {
                message: format!("invalid refresh token: {}", e.user_message()),
            });
        }
    }

    Ok((StatusCode::CREATED, Json(ProviderResponse::from(provider))))
}

/// Get one provider.
#[utoipa::path(
    get,
    path = "/providers/{id}",
    tag = "providers",
    params(("id" = String, Path, description = "Provider ID")),
    responses(
        (status = 200, description = "Provider", body = ProviderResponse),
        (status = 404, description = "Provider not found"),
    )
)]
pub async fn get_provider(
    State(state): State<AppState>,
    Path(id): Path<ProviderId>,
    user: AuthUser,
) -> Result<Json<ProviderResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let provider = Providers::new(&mut conn)
        .get_for_user(user.id, id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Provider".to_string(),
            id: id.to_string(),
        })?;

    Ok(Json(ProviderResponse::from(provider)))
}

/// Update a provider. Replacing an `anthropic_max` credential revalidates
/// the new refresh token; a rejected token clears the OAuth connection.
#[utoipa::path(
    put,
    path = "/providers/{id}",
    tag = "providers",
    params(("id" = String, Path, description = "Provider ID")),
    request_body = ProviderUpdate,
    responses(
        (status = 200, description = "Updated provider", body = ProviderResponse),
        (status = 400, description = "Invalid provider data"),
        (status = 404, description = "Provider not found"),
    )
)]
pub async fn update_provider(
    State(state): State<AppState>,
    Path(id): Path<ProviderId>,
    user: AuthUser,
    Json(data): Json<ProviderUpdate>,
) -> Result<Json<ProviderResponse>> {
    data.validate()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let existing = Providers::new(&mut conn)
        .get_for_user(user.id, id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Provider".to_string(),
            id: id.to_string(),
        })?;

    let credential_rotated = data.api_key.is_some();
    let is_oauth = existing.provider_type == ProviderKind::AnthropicMax;
    let db_request = ProviderUpdateDBRequest {
        name: data.name,
        base_url: data.base_url,
        api_key: if is_oauth { None } else { data.api_key.clone() },
        refresh_token: if is_oauth { data.api_key } else { None },
        is_active: data.is_active,
        default_model: data.default_model,
        input_cost_per_million: data.input_cost_per_million,
        output_cost_per_million: data.output_cost_per_million,
    };

    let mut provider = Providers::new(&mut conn).update_for_user(user.id, id, &db_request).await?;

    if is_oauth && credential_rotated {
        if let Err(e) = state.oauth.refresh_access_token(&mut provider).await {
            Providers::new(&mut conn).clear_oauth(provider.id).await?;
            return Err(Error::BadRequest {
                message: format!("invalid refresh token: {}", e.user_message()),
            });
        }
    }

    Ok(Json(ProviderResponse::from(provider)))
}

/// Soft-delete a provider.
#[utoipa::path(
    delete,
    path = "/providers/{id}",
    tag = "providers",
    params(("id" = String, Path, description = "Provider ID")),
    responses(
        (status = 204, description = "Provider deleted"),
        (status = 404, description = "Provider not found"),
    )
)]
pub async fn delete_provider(State(state): State<AppState>, Path(id): Path<ProviderId>, user: AuthUser) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let deleted = Providers::new(&mut conn).soft_delete_for_user(user.id, id).await?;

    if !deleted {
        return Err(Error::NotFound {
            resource: "Provider".to_string(),
            id: id.to_string(),
        });
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Probe a saved provider's connectivity and credentials.
#[utoipa::path(
    post,
    path = "/providers/{id}/test",
    tag = "providers",
    params(("id" = String, Path, description = "Provider ID")),
    responses(
        (status = 200, description = "Probe outcome", body = TestConnectionResponse),
        (status = 404, description = "Provider not found"),
    )
)]
pub async fn test_provider_connection(
    State(state): State<AppState>,
    Path(id): Path<ProviderId>,
    user: AuthUser,
) -> Result<Json<TestConnectionResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut provider = Providers::new(&mut conn)
        .get_for_user(user.id, id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Provider".to_string(),
            id: id.to_string(),
        })?;
    drop(conn);

    // Max subscriptions are exercised through the OAuth service; everything
    // else goes through the HTTP probe.
    let report = if provider.provider_type == ProviderKind::AnthropicMax && provider.oauth_connected {
        match state.oauth.test_connection(&mut provider).await {
            Ok(()) => ProbeReport {
                success: true,
                status_code: Some(200),
                latency_ms: 0,
                error_message: None,
            },
            Err(e) => ProbeReport {
                success: false,
                status_code: None,
                latency_ms: 0,
                error_message: Some(e.user_message()),
            },
        }
    } else {
        state.probe.execute(&provider).await
    };

    Ok(Json(TestConnectionResponse::from(report)))
}

/// Probe raw credentials before saving them.
#[utoipa::path(
    post,
    path = "/providers/test",
    tag = "providers",
    request_body = ProviderCreate,
    responses(
        (status = 200, description = "Probe outcome", body = TestConnectionResponse),
        (status = 400, description = "Invalid provider data"),
    )
)]
pub async fn test_provider_with_credentials(
    State(state): State<AppState>,
    user: AuthUser,
    Json(data): Json<ProviderCreate>,
) -> Result<Json<TestConnectionResponse>> {
    data.validate()?;

    let provider = ProviderDBResponse {
        id: uuid::Uuid::nil(),
        user_id: user.id,
        name: data.name,
        provider_type: data.provider_type,
        base_url: data.base_url.filter(|u| !u.is_empty()),
        api_key: data.api_key,
        refresh_token: String::new(),
        access_token: String::new(),
        token_expires_at: None,
        oauth_connected: false,
        is_active: true,
        default_model: data.default_model.unwrap_or_default(),
        input_cost_per_million: data.input_cost_per_million,
        output_cost_per_million: data.output_cost_per_million,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let report = state.probe.execute(&provider).await;
    Ok(Json(TestConnectionResponse::from(report)))
}
