//! Proxy-surface errors with the OpenAI-style error envelope.
//!
//! Codes are stable across releases; clients key off `error.code`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("{0}")]
    InvalidKey(String),

    #[error("API key has expired")]
    KeyExpired,

    #[error("API key is inactive")]
    KeyInactive,

    #[error("no allowed provider found for model: {0}")]
    NoAllowedProvider(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Authentication failed with provider")]
    ProviderAuth,

    #[error("Rate limit exceeded at provider")]
    ProviderRateLimit,

    #[error("Provider service unavailable: {0}")]
    ProviderUnavailable(String),

    /// Upstream status outside the classification table; mirrored to the
    /// client with the generic proxy_error code.
    #[error("{message}")]
    PassThrough { status: StatusCode, message: String },

    #[error("OAuth is not connected for this provider")]
    OAuthNotConnected,

    #[error("failed to refresh OAuth token: {0}")]
    OAuthRefreshFailed(String),

    #[error("{0}")]
    Internal(String),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::InvalidKey(_) | ProxyError::KeyExpired | ProxyError::KeyInactive => StatusCode::UNAUTHORIZED,
            ProxyError::NoAllowedProvider(_) => StatusCode::FORBIDDEN,
            ProxyError::InvalidRequest(_) | ProxyError::OAuthNotConnected => StatusCode::BAD_REQUEST,
            ProxyError::ProviderAuth => StatusCode::UNAUTHORIZED,
            ProxyError::ProviderRateLimit => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::ProviderUnavailable(_) | ProxyError::OAuthRefreshFailed(_) => StatusCode::BAD_GATEWAY,
            ProxyError::PassThrough { status, .. } => *status,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// OpenAI-envelope `error.type`.
    pub fn error_type(&self) -> &'static str {
        match self {
            ProxyError::InvalidKey(_)
            | ProxyError::KeyExpired
            | ProxyError::KeyInactive
            | ProxyError::ProviderAuth
            | ProxyError::OAuthRefreshFailed(_) => "authentication_error",
            ProxyError::ProviderRateLimit => "rate_limit_error",
            ProxyError::ProviderUnavailable(_) | ProxyError::Internal(_) => "server_error",
            ProxyError::InvalidRequest(_) => "invalid_request_error",
            ProxyError::NoAllowedProvider(_) | ProxyError::OAuthNotConnected | ProxyError::PassThrough { .. } => {
                "api_error"
            }
        }
    }

    /// OpenAI-envelope `error.code`. Stable across releases.
    pub fn error_code(&self) -> &'static str {
        match self {
            ProxyError::InvalidKey(_) | ProxyError::KeyExpired | ProxyError::KeyInactive => "invalid_api_key",
            ProxyError::NoAllowedProvider(_)
            | ProxyError::InvalidRequest(_)
            | ProxyError::OAuthNotConnected
            | ProxyError::PassThrough { .. } => "proxy_error",
            ProxyError::ProviderAuth => "provider_auth_error",
            ProxyError::ProviderRateLimit => "provider_rate_limit",
            ProxyError::ProviderUnavailable(_) => "provider_unavailable",
            ProxyError::OAuthRefreshFailed(_) => "provider_auth_error",
            ProxyError::Internal(_) => "server_error",
        }
    }

    /// Classify an upstream response status per the proxy's error table.
    /// Returns `None` for 2xx.
    pub fn from_upstream_status(status: StatusCode, message: String) -> Option<ProxyError> {
        match status.as_u16() {
            200..=299 => None,
            401 => Some(ProxyError::ProviderAuth),
            429 => Some(ProxyError::ProviderRateLimit),
            502 | 503 | 504 => Some(ProxyError::ProviderUnavailable(message)),
            _ => Some(ProxyError::PassThrough { status, message }),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match &self {
            ProxyError::Internal(_) | ProxyError::ProviderUnavailable(_) | ProxyError::OAuthRefreshFailed(_) => {
                tracing::error!("Proxy error: {}", self);
            }
            _ => {
                tracing::debug!("Proxy error: {}", self);
            }
        }

        let body = json!({
            "error": {
                "message": self.to_string(),
                "type": self.error_type(),
                "code": self.error_code(),
            }
        });

        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_classification_table() {
        let err = ProxyError::from_upstream_status(StatusCode::UNAUTHORIZED, "x".into()).unwrap();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.error_code(), "provider_auth_error");

        let err = ProxyError::from_upstream_status(StatusCode::TOO_MANY_REQUESTS, "x".into()).unwrap();
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.error_code(), "provider_rate_limit");
        assert_eq!(err.error_type(), "rate_limit_error");

        for upstream in [StatusCode::BAD_GATEWAY, StatusCode::SERVICE_UNAVAILABLE, StatusCode::GATEWAY_TIMEOUT] {
            let err = ProxyError::from_upstream_status(upstream, "down".into()).unwrap();
            assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
            assert_eq!(err.error_code(), "provider_unavailable");
        }
    }

    #[test]
    fn unlisted_statuses_pass_through() {
        let err = ProxyError::from_upstream_status(StatusCode::IM_A_TEAPOT, "teapot".into()).unwrap();
        assert_eq!(err.status_code(), StatusCode::IM_A_TEAPOT);
        assert_eq!(err.error_code(), "proxy_error");
    }

    #[test]
    fn success_is_not_an_error() {
        assert!(ProxyError::from_upstream_status(StatusCode::OK, String::new()).is_none());
        assert!(ProxyError::from_upstream_status(StatusCode::CREATED, String::new()).is_none());
    }

    #[test]
    fn key_errors_share_the_invalid_api_key_code() {
        for err in [
            ProxyError::InvalidKey("bad".into()),
            ProxyError::KeyExpired,
            ProxyError::KeyInactive,
        ] {
            assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
            assert_eq!(err.error_code(), "invalid_api_key");
            assert_eq!(err.error_type(), "authentication_error");
        }
    }
}
