//! Database models for upstream provider configurations.

use crate::providers::ProviderKind;
use crate::types::{ProviderId, UserId};
use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;

/// Refresh the OAuth access token this long before it actually expires.
pub const TOKEN_EXPIRY_MARGIN: Duration = Duration::minutes(5);

/// Database request for creating a new provider
#[derive(Debug, Clone)]
pub struct ProviderCreateDBRequest {
    pub user_id: UserId,
    pub name: String,
    pub provider_type: ProviderKind,
    pub base_url: Option<String>,
    pub api_key: String,
    pub refresh_token: String,
    pub is_active: bool,
    pub default_model: String,
    pub input_cost_per_million: f64,
    pub output_cost_per_million: f64,
}

/// Database request for updating a provider. `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct ProviderUpdateDBRequest {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub refresh_token: Option<String>,
    pub is_active: Option<bool>,
    pub default_model: Option<String>,
    pub input_cost_per_million: Option<f64>,
    pub output_cost_per_million: Option<f64>,
}

/// Database entity for a provider row. Secrets (`api_key`, `refresh_token`,
/// `access_token`) stay inside the server; the API layer whitelists what it
/// serializes.
#[derive(Debug, Clone, FromRow)]
pub struct ProviderDBResponse {
    pub id: ProviderId,
    pub user_id: UserId,
    pub name: String,
    pub provider_type: ProviderKind,
    pub base_url: Option<String>,
    pub api_key: String,
    pub refresh_token: String,
    pub access_token: String,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub oauth_connected: bool,
    pub is_active: bool,
    pub default_model: String,
    pub input_cost_per_million: f64,
    pub output_cost_per_million: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProviderDBResponse {
    /// Effective base URL: the explicit value wins, otherwise the kind's
    /// built-in default. Empty when neither exists.
    pub fn effective_base_url(&self) -> Option<String> {
        match self.base_url.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => Some(url.trim_end_matches('/').to_string()),
            None => self
                .provider_type
                .default_base_url()
                .map(|u| u.to_string()),
        }
    }

    /// Whether the OAuth access token needs a just-in-time refresh: unknown
    /// expiry counts as stale, and we refresh 5 minutes early.
    pub fn needs_token_refresh(&self) -> bool {
        match self.token_expires_at {
            Some(expires_at) => Utc::now() + TOKEN_EXPIRY_MARGIN >= expires_at,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn provider(kind: ProviderKind, base_url: Option<&str>) -> ProviderDBResponse {
        ProviderDBResponse {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "test".to_string(),
            provider_type: kind,
            base_url: base_url.map(|s| s.to_string()),
            api_key: String::new(),
            refresh_token: String::new(),
            access_token: String::new(),
            token_expires_at: None,
            oauth_connected: false,
            is_active: true,
            default_model: String::new(),
            input_cost_per_million: 0.0,
            output_cost_per_million: 0.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn explicit_base_url_wins_and_is_trimmed() {
        let p = provider(ProviderKind::OpenAi, Some("https://proxy.example.com/"));
        assert_eq!(p.effective_base_url().unwrap(), "https://proxy.example.com");
    }

    #[test]
    fn falls_back_to_kind_default() {
        let p = provider(ProviderKind::Anthropic, None);
        assert_eq!(p.effective_base_url().unwrap(), "https://api.anthropic.com");
        assert!(provider(ProviderKind::Local, None).effective_base_url().is_none());
    }

    #[test]
    fn refresh_needed_inside_margin() {
        let mut p = provider(ProviderKind::AnthropicMax, None);
        assert!(p.needs_token_refresh(), "unknown expiry is stale");

        p.token_expires_at = Some(Utc::now() + Duration::minutes(3));
        assert!(p.needs_token_refresh(), "3 minutes left is inside the margin");

        p.token_expires_at = Some(Utc::now() + Duration::hours(8));
        assert!(!p.needs_token_refresh());
    }
}
