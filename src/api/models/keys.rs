//! API request/response models for proxy keys.

use crate::db::models::proxy_keys::{AllowedProviderCreate, ProxyKeyDBResponse};
use crate::errors::Error;
use crate::providers::ProviderKind;
use crate::types::{KeyId, ProviderId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderSelection {
    #[schema(value_type = String, format = "uuid")]
    pub provider_id: ProviderId,
    /// Explicit model allow-list; empty admits every model the provider
    /// serves.
    #[serde(default)]
    pub models: Vec<String>,
}

impl From<ProviderSelection> for AllowedProviderCreate {
    fn from(sel: ProviderSelection) -> Self {
        Self {
            provider_id: sel.provider_id,
            models: sel.models,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KeyCreate {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub allowed_providers: Vec<ProviderSelection>,
}

impl KeyCreate {
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.len() > MAX_NAME_LEN {
            return Err(Error::BadRequest {
                message: format!("name must be {MAX_NAME_LEN} characters or less"),
            });
        }
        if self.allowed_providers.is_empty() {
            return Err(Error::BadRequest {
                message: "at least one allowed provider is required".to_string(),
            });
        }
        if let Some(expires_at) = self.expires_at {
            if expires_at <= Utc::now() {
                return Err(Error::BadRequest {
                    message: "expiration date must be in the future".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct KeyUpdate {
    pub name: Option<String>,
    pub is_active: Option<bool>,
    pub expires_at: Option<DateTime<Utc>>,
    pub allowed_providers: Option<Vec<ProviderSelection>>,
}

impl KeyUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(name) = &self.name {
            if name.len() > MAX_NAME_LEN {
                return Err(Error::BadRequest {
                    message: format!("name must be {MAX_NAME_LEN} characters or less"),
                });
            }
        }
        if let Some(allowed) = &self.allowed_providers {
            if allowed.is_empty() {
                return Err(Error::BadRequest {
                    message: "at least one allowed provider is required".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AllowedProviderInfo {
    #[schema(value_type = String, format = "uuid")]
    pub provider_id: ProviderId,
    pub provider_name: String,
    pub provider_type: ProviderKind,
    pub models: Vec<String>,
}

/// Key metadata. Never contains the key material; the display prefix is
/// all a client sees after creation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KeyResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: KeyId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub key_prefix: String,
    pub name: String,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub allowed_providers: Vec<AllowedProviderInfo>,
}

/// Returned from create only: includes the full key exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KeyCreateResponse {
    #[serde(flatten)]
    pub info: KeyResponse,
    pub key: String,
}

impl From<ProxyKeyDBResponse> for KeyResponse {
    fn from(db: ProxyKeyDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            key_prefix: db.key_prefix,
            name: db.name,
            is_active: db.is_active,
            last_used_at: db.last_used_at,
            expires_at: db.expires_at,
            created_at: db.created_at,
            updated_at: db.updated_at,
            allowed_providers: db
                .allowed_providers
                .into_iter()
                .map(|entry| AllowedProviderInfo {
                    provider_id: entry.provider_id,
                    provider_name: entry.provider.name,
                    provider_type: entry.provider.provider_type,
                    models: entry.models,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn base_create() -> KeyCreate {
        KeyCreate {
            name: "ci key".to_string(),
            expires_at: None,
            allowed_providers: vec![ProviderSelection {
                provider_id: uuid::Uuid::new_v4(),
                models: vec![],
            }],
        }
    }

    #[test]
    fn create_requires_at_least_one_provider() {
        let mut req = base_create();
        req.allowed_providers.clear();
        assert!(req.validate().is_err());
    }

    #[test]
    fn create_rejects_past_expiry() {
        let mut req = base_create();
        req.expires_at = Some(Utc::now() - Duration::hours(1));
        assert!(req.validate().is_err());

        req.expires_at = Some(Utc::now() + Duration::hours(1));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn create_rejects_oversized_names() {
        let mut req = base_create();
        req.name = "k".repeat(101);
        assert!(req.validate().is_err());
    }

    #[test]
    fn create_response_flattens_metadata_next_to_key() {
        let response = KeyCreateResponse {
            info: KeyResponse {
                id: uuid::Uuid::new_v4(),
                user_id: uuid::Uuid::new_v4(),
                key_prefix: "sk-smoothllm-abc123...f789".to_string(),
                name: "k".to_string(),
                is_active: true,
                last_used_at: None,
                expires_at: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
                allowed_providers: vec![],
            },
            key: "sk-smoothllm-feedface".to_string(),
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["key"], "sk-smoothllm-feedface");
        assert_eq!(json["key_prefix"], "sk-smoothllm-abc123...f789");
    }
}
