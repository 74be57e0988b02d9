//! Authentication seams.
//!
//! Management-API identity is an external collaborator: the hosting
//! executable's identity middleware authenticates the caller and inserts an
//! [`AuthUser`] into request extensions. This crate only ever consumes the
//! user id and the admin flag.
//!
//! Proxy-API identity is this crate's own concern: bearer proxy keys,
//! validated by hash lookup.

use crate::crypto::{self, PROXY_KEY_PREFIX};
use crate::db::handlers::ProxyKeys;
use crate::db::models::proxy_keys::ProxyKeyDBResponse;
use crate::errors::Error;
use crate::proxy::ProxyError;
use crate::types::UserId;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use sqlx::PgConnection;
use tracing::instrument;

/// The authenticated principal as handed over by the identity layer.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: UserId,
    pub is_admin: bool,
}

impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(Error::Unauthenticated { message: None })
    }
}

/// Pull the proxy key out of the Authorization header. Accepts
/// `Bearer <key>` or the raw key when it carries the fixed prefix.
pub fn proxy_key_from_headers(headers: &HeaderMap) -> Result<String, ProxyError> {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ProxyError::InvalidKey("missing Authorization header".to_string()))?;

    if let Some(token) = auth.strip_prefix("Bearer ") {
        return Ok(token.to_string());
    }

    if auth.starts_with(PROXY_KEY_PREFIX) {
        return Ok(auth.to_string());
    }

    Err(ProxyError::InvalidKey("invalid Authorization header format".to_string()))
}

/// Validate a presented proxy key: prefix check, hashed lookup, lifecycle
/// checks, then the advisory last-used stamp. Returns the key with its
/// allow-list eagerly loaded.
#[instrument(skip_all, err)]
pub async fn validate_proxy_key(conn: &mut PgConnection, presented: &str) -> Result<ProxyKeyDBResponse, ProxyError> {
    if !presented.starts_with(PROXY_KEY_PREFIX) {
        return Err(ProxyError::InvalidKey("invalid key format".to_string()));
    }

    let hash = crypto::hash_key(presented);
    let mut repo = ProxyKeys::new(conn);

    let key = repo
        .find_by_hash(&hash)
        .await
        .map_err(|e| ProxyError::Internal(format!("failed to validate key: {e}")))?
        .ok_or_else(|| ProxyError::InvalidKey("invalid API key".to_string()))?;

    if key.is_expired() {
        return Err(ProxyError::KeyExpired);
    }
    if !key.is_active {
        return Err(ProxyError::KeyInactive);
    }

    if let Err(e) = repo.touch_last_used(key.id).await {
        // Advisory only; the request proceeds.
        tracing::warn!(error = %e, "failed to update key last_used_at");
    }

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn bearer_form_is_stripped() {
        let headers = headers_with_auth("Bearer sk-smoothllm-abc");
        assert_eq!(proxy_key_from_headers(&headers).unwrap(), "sk-smoothllm-abc");
    }

    #[test]
    fn raw_prefixed_key_is_accepted() {
        let headers = headers_with_auth("sk-smoothllm-abc");
        assert_eq!(proxy_key_from_headers(&headers).unwrap(), "sk-smoothllm-abc");
    }

    #[test]
    fn missing_and_malformed_headers_are_rejected() {
        assert!(proxy_key_from_headers(&HeaderMap::new()).is_err());
        assert!(proxy_key_from_headers(&headers_with_auth("Basic dXNlcg==")).is_err());
        assert!(proxy_key_from_headers(&headers_with_auth("sk-other-prefix")).is_err());
    }
}
