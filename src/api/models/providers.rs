//! API request/response models for providers.
//!
//! Responses whitelist fields: `api_key`, `refresh_token` and
//! `access_token` have no serializable representation here, so adding a
//! secret column can never leak through this surface.

use crate::db::models::providers::ProviderDBResponse;
use crate::errors::Error;
use crate::providers::{probe::ProbeReport, ProviderKind};
use crate::types::{ProviderId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderCreate {
    pub name: String,
    pub provider_type: ProviderKind,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Upstream API key. For `anthropic_max` this field carries the
    /// bootstrap refresh token instead.
    pub api_key: String,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub input_cost_per_million: f64,
    #[serde(default)]
    pub output_cost_per_million: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ProviderUpdate {
    pub name: Option<String>,
    pub base_url: Option<String>,
    /// For `anthropic_max` this replaces the refresh token.
    pub api_key: Option<String>,
    pub is_active: Option<bool>,
    pub default_model: Option<String>,
    pub input_cost_per_million: Option<f64>,
    pub output_cost_per_million: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ProviderId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub name: String,
    pub provider_type: ProviderKind,
    /// Effective base URL (explicit value or the kind's default).
    pub base_url: String,
    pub is_active: bool,
    pub default_model: String,
    pub input_cost_per_million: f64,
    pub output_cost_per_million: f64,
    /// Whether OAuth is connected (meaningful for anthropic_max only).
    pub oauth_connected: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProviderDBResponse> for ProviderResponse {
    fn from(db: ProviderDBResponse) -> Self {
        Self {
            base_url: db.effective_base_url().unwrap_or_default(),
            id: db.id,
            user_id: db.user_id,
            name: db.name,
            provider_type: db.provider_type,
            is_active: db.is_active,
            default_model: db.default_model,
            input_cost_per_million: db.input_cost_per_million,
            output_cost_per_million: db.output_cost_per_million,
            oauth_connected: db.oauth_connected,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TestConnectionResponse {
    pub success: bool,
    pub message: String,
    pub status_code: Option<i32>,
    pub latency_ms: i64,
}

impl From<ProbeReport> for TestConnectionResponse {
    fn from(report: ProbeReport) -> Self {
        Self {
            message: if report.success {
                "connection successful".to_string()
            } else {
                report.error_message.clone().unwrap_or_else(|| "connection failed".to_string())
            },
            success: report.success,
            status_code: report.status_code,
            latency_ms: report.latency_ms,
        }
    }
}

fn validate_name(name: &str) -> Result<(), Error> {
    if name.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "name is required".to_string(),
        });
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::BadRequest {
            message: format!("name must be {MAX_NAME_LEN} characters or less"),
        });
    }
    Ok(())
}

fn validate_base_url(base_url: &str) -> Result<(), Error> {
    let parsed = url::Url::parse(base_url).map_err(|e| Error::BadRequest {
        message: format!("invalid base_url: {e}"),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::BadRequest {
            message: "base_url scheme must be http or https".to_string(),
        });
    }
    if parsed.host_str().is_none() {
        return Err(Error::BadRequest {
            message: "base_url must include a host".to_string(),
        });
    }
    Ok(())
}

fn validate_costs(input: f64, output: f64) -> Result<(), Error> {
    if input < 0.0 {
        return Err(Error::BadRequest {
            message: "input_cost_per_million cannot be negative".to_string(),
        });
    }
    if output < 0.0 {
        return Err(Error::BadRequest {
            message: "output_cost_per_million cannot be negative".to_string(),
        });
    }
    Ok(())
}

impl ProviderCreate {
    pub fn validate(&self) -> Result<(), Error> {
        validate_name(&self.name)?;

        if let Some(base_url) = self.base_url.as_deref().filter(|u| !u.is_empty()) {
            validate_base_url(base_url)?;
        }

        if self.api_key.trim().is_empty() {
            let message = if self.provider_type == ProviderKind::AnthropicMax {
                "refresh_token is required for Claude Max providers".to_string()
            } else {
                "api_key is required".to_string()
            };
            return Err(Error::BadRequest { message });
        }

        validate_costs(self.input_cost_per_million, self.output_cost_per_million)
    }
}

impl ProviderUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(base_url) = self.base_url.as_deref().filter(|u| !u.is_empty()) {
            validate_base_url(base_url)?;
        }
        if let Some(api_key) = &self.api_key {
            if api_key.trim().is_empty() {
                return Err(Error::BadRequest {
                    message: "api_key cannot be empty".to_string(),
                });
            }
        }
        validate_costs(
            self.input_cost_per_million.unwrap_or(0.0),
            self.output_cost_per_million.unwrap_or(0.0),
        )
    }
}
