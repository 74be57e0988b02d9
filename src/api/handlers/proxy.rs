//! The proxy surface: OpenAI-compatible chat completions, the synthesized
//! model catalog, and the Anthropic passthrough.
//!
//! Authenticated by bearer proxy key only; the management identity layer
//! plays no part here.

use crate::api::models::proxy::{catalog_for_key, ModelsResponse};
use crate::auth::{proxy_key_from_headers, validate_proxy_key};
use crate::db::models::proxy_keys::ProxyKeyDBResponse;
use crate::proxy::dispatch::dispatch;
use crate::proxy::router::{parse_model, select_provider};
use crate::proxy::transform::{to_anthropic, OpenAiChatRequest};
use crate::proxy::ProxyError;
use crate::providers::WireFormat;
use crate::usage::{RequestContext, UsageReceipt};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{Json, Response},
};
use chrono::Utc;
use serde::Deserialize;

/// Just enough of an Anthropic messages body to route it.
#[derive(Debug, Deserialize)]
struct AnthropicRoutingProbe {
    model: String,
    #[serde(default)]
    stream: Option<bool>,
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<ProxyKeyDBResponse, ProxyError> {
    let presented = proxy_key_from_headers(headers)?;
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ProxyError::Internal(format!("database unavailable: {e}")))?;
    validate_proxy_key(&mut conn, &presented).await
}

/// OpenAI-compatible chat completions endpoint.
#[utoipa::path(
    post,
    path = "/v1/chat/completions",
    tag = "proxy",
    request_body = String,
    responses(
        (status = 200, description = "Upstream response, mirrored"),
        (status = 401, description = "Invalid proxy key"),
        (status = 403, description = "Model not covered by the key's allow-list"),
    )
)]
pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let key = authenticate(&state, &headers).await?;

    let chat: OpenAiChatRequest = serde_json::from_slice(&body)
        .map_err(|e| ProxyError::InvalidRequest(format!("invalid request body: {e}")))?;
    let raw_model = chat.model.clone();

    let entry = select_provider(&key, &raw_model).ok_or_else(|| ProxyError::NoAllowedProvider(raw_model.clone()))?;
    let mut provider = entry.provider.clone();
    let route = parse_model(&raw_model, provider.provider_type.as_str());

    if provider.provider_type.is_oauth() {
        if !provider.oauth_connected {
            return Err(ProxyError::OAuthNotConnected);
        }
        state
            .oauth
            .ensure_valid_token(&mut provider)
            .await
            .map_err(|e| ProxyError::OAuthRefreshFailed(e.user_message()))?;
    }

    let upstream_body = match provider.provider_type.wire_format() {
        WireFormat::Anthropic => {
            let translated =
                to_anthropic(&chat, &route.model_name).map_err(|e| ProxyError::InvalidRequest(e.to_string()))?;
            serde_json::to_vec(&translated).map_err(|e| ProxyError::Internal(format!("failed to encode request: {e}")))?
        }
        WireFormat::OpenAi => {
            // Same schema both sides; only the model field is rewritten to
            // drop the routing prefix.
            let mut rewritten = chat.clone();
            rewritten.model = route.model_name.clone();
            serde_json::to_vec(&rewritten).map_err(|e| ProxyError::Internal(format!("failed to encode request: {e}")))?
        }
    };

    let wants_stream = chat.stream.unwrap_or(false);
    let receipt = UsageReceipt::new(
        state.usage.clone(),
        RequestContext {
            user_id: key.user_id,
            proxy_key_id: key.id,
            provider_id: provider.id,
            model: raw_model,
            input_cost_per_million: provider.input_cost_per_million,
            output_cost_per_million: provider.output_cost_per_million,
        },
    );

    dispatch(&state.http, &provider, upstream_body, &headers, wants_stream, receipt).await
}

/// Anthropic-compatible passthrough. The body goes upstream byte-for-byte;
/// only the model field is read for routing.
#[utoipa::path(
    post,
    path = "/v1/messages",
    tag = "proxy",
    request_body = String,
    responses(
        (status = 200, description = "Upstream response, mirrored"),
        (status = 401, description = "Invalid proxy key"),
        (status = 403, description = "Model not covered by the key's allow-list"),
    )
)]
pub async fn messages(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Response, ProxyError> {
    let key = authenticate(&state, &headers).await?;

    let probe: AnthropicRoutingProbe = serde_json::from_slice(&body)
        .map_err(|e| ProxyError::InvalidRequest(format!("invalid request body: {e}")))?;

    let entry = select_provider(&key, &probe.model).ok_or_else(|| ProxyError::NoAllowedProvider(probe.model.clone()))?;
    let mut provider = entry.provider.clone();

    if provider.provider_type.is_oauth() {
        if !provider.oauth_connected {
            return Err(ProxyError::OAuthNotConnected);
        }
        state
            .oauth
            .ensure_valid_token(&mut provider)
            .await
            .map_err(|e| ProxyError::OAuthRefreshFailed(e.user_message()))?;
    }

    let receipt = UsageReceipt::new(
        state.usage.clone(),
        RequestContext {
            user_id: key.user_id,
            proxy_key_id: key.id,
            provider_id: provider.id,
            model: probe.model,
            input_cost_per_million: provider.input_cost_per_million,
            output_cost_per_million: provider.output_cost_per_million,
        },
    );

    dispatch(
        &state.http,
        &provider,
        body.to_vec(),
        &headers,
        probe.stream.unwrap_or(false),
        receipt,
    )
    .await
}

/// Catalog of models this key may route to, synthesized from its
/// allow-list.
#[utoipa::path(
    get,
    path = "/v1/models",
    tag = "proxy",
    responses(
        (status = 200, description = "Available models", body = ModelsResponse),
        (status = 401, description = "Invalid proxy key"),
    )
)]
pub async fn list_models(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<ModelsResponse>, ProxyError> {
    let key = authenticate(&state, &headers).await?;
    Ok(Json(catalog_for_key(&key, Utc::now().timestamp())))
}
