//! Management handlers for the Anthropic-Max OAuth flow.

use crate::auth::AuthUser;
use crate::db::handlers::Providers;
use crate::errors::{Error, Result};
use crate::types::ProviderId;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    response::{Html, Json},
};
use serde::Deserialize;
use serde_json::json;
use utoipa::IntoParams;

#[derive(Debug, Deserialize, IntoParams)]
pub struct AuthorizeQuery {
    #[param(value_type = String)]
    pub provider_id: ProviderId,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// The redirect URI must be byte-identical between authorize and exchange.
/// Configured `public_url` wins; otherwise it is reconstructed from the
/// request's forwarded scheme and host.
fn callback_redirect_uri(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(public_url) = &state.config.public_url {
        return format!(
            "{}/api/v1/oauth/anthropic/callback",
            public_url.as_str().trim_end_matches('/')
        );
    }

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");

    format!("{scheme}://{host}/api/v1/oauth/anthropic/callback")
}

/// Start the OAuth flow for a provider; returns the URL the browser should
/// open.
#[utoipa::path(
    get,
    path = "/oauth/anthropic/authorize",
    tag = "oauth",
    params(AuthorizeQuery),
    responses(
        (status = 200, description = "Authorization URL"),
        (status = 400, description = "Provider is not an Anthropic Max provider"),
        (status = 404, description = "Provider not found"),
    )
)]
pub async fn authorize(
    State(state): State<AppState>,
    Query(query): Query<AuthorizeQuery>,
    headers: HeaderMap,
    user: AuthUser,
) -> Result<Json<serde_json::Value>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let provider = Providers::new(&mut conn)
        .get_for_user(user.id, query.provider_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Provider".to_string(),
            id: query.provider_id.to_string(),
        })?;

    let redirect_uri = callback_redirect_uri(&state, &headers);
    let authorization_url = state.oauth.authorize_url(user.id, &provider, &redirect_uri)?;

    Ok(Json(json!({ "authorization_url": authorization_url })))
}

/// OAuth callback. Serves a small self-closing page that reports the
/// outcome to the window that opened the flow; no JSON, no redirect.
#[utoipa::path(
    get,
    path = "/oauth/anthropic/callback",
    tag = "oauth",
    params(CallbackQuery),
    responses((status = 200, description = "Self-closing result page", content_type = "text/html"))
)]
pub async fn callback(State(state): State<AppState>, Query(query): Query<CallbackQuery>, headers: HeaderMap) -> Html<String> {
    if let Some(error) = query.error {
        let detail = query.error_description.unwrap_or(error);
        return Html(result_page(false, &detail));
    }

    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return Html(result_page(false, "missing code or state parameter"));
    };

    let redirect_uri = callback_redirect_uri(&state, &headers);
    match state.oauth.exchange_code(&code, &oauth_state, &redirect_uri).await {
        Ok(provider) => Html(result_page(true, &format!("Provider \"{}\" connected", provider.name))),
        Err(e) => Html(result_page(false, &e.user_message())),
    }
}

/// Minimal page that posts the result to the opener window and closes
/// itself.
fn result_page(ok: bool, message: &str) -> String {
    let payload = json!({ "type": "oauth-result", "ok": ok, "message": message });
    let heading = if ok { "Connected" } else { "Connection failed" };
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>SmoothLLM</title></head>\n<body>\n\
         <p>{heading}. You can close this window.</p>\n\
         <script>\n\
         if (window.opener) {{ window.opener.postMessage({payload}, \"*\"); }}\n\
         window.close();\n\
         </script>\n\
         </body>\n</html>\n"
    )
}

/// Clear a provider's OAuth tokens and connection flag.
#[utoipa::path(
    post,
    path = "/oauth/anthropic/disconnect/{id}",
    tag = "oauth",
    params(("id" = String, Path, description = "Provider ID")),
    responses(
        (status = 200, description = "OAuth disconnected"),
        (status = 404, description = "Provider not found"),
    )
)]
pub async fn disconnect(
    State(state): State<AppState>,
    Path(id): Path<ProviderId>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Providers::new(&mut conn);

    let provider = repo.get_for_user(user.id, id).await?.ok_or_else(|| Error::NotFound {
        resource: "Provider".to_string(),
        id: id.to_string(),
    })?;

    repo.clear_oauth(provider.id).await?;

    Ok(Json(json!({ "message": "OAuth disconnected successfully" })))
}

/// Exercise the OAuth connection end to end (refresh if stale, then a
/// minimal upstream call).
#[utoipa::path(
    post,
    path = "/oauth/anthropic/test/{id}",
    tag = "oauth",
    params(("id" = String, Path, description = "Provider ID")),
    responses(
        (status = 200, description = "OAuth connection works"),
        (status = 400, description = "OAuth not connected or upstream rejected the token"),
        (status = 404, description = "Provider not found"),
    )
)]
pub async fn test(State(state): State<AppState>, Path(id): Path<ProviderId>, user: AuthUser) -> Result<Json<serde_json::Value>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut provider = Providers::new(&mut conn)
        .get_for_user(user.id, id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Provider".to_string(),
            id: id.to_string(),
        })?;
    drop(conn);

    state.oauth.test_connection(&mut provider).await?;

    Ok(Json(json!({ "message": "OAuth connection successful" })))
}
