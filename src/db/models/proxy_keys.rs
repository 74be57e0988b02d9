//! Database models for proxy keys and their provider allow-lists.

use crate::db::models::providers::ProviderDBResponse;
use crate::types::{KeyId, ProviderId, UserId};
use chrono::{DateTime, Utc};

/// One requested allow-list binding at key creation / update time.
#[derive(Debug, Clone)]
pub struct AllowedProviderCreate {
    pub provider_id: ProviderId,
    /// Empty means every model the provider serves is permitted.
    pub models: Vec<String>,
}

/// Database request for creating a new proxy key. The hash and display
/// prefix are computed by the caller from the generated key material; the
/// plaintext key never reaches the repository.
#[derive(Debug, Clone)]
pub struct ProxyKeyCreateDBRequest {
    pub user_id: UserId,
    pub key_hash: String,
    pub key_prefix: String,
    pub name: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub allowed_providers: Vec<AllowedProviderCreate>,
}

/// Database request for updating a proxy key. `allowed_providers` replaces
/// the whole allow-list when present.
#[derive(Debug, Clone, Default)]
pub struct ProxyKeyUpdateDBRequest {
    pub name: Option<String>,
    pub is_active: Option<bool>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub allowed_providers: Option<Vec<AllowedProviderCreate>>,
}

/// One allow-list entry with its provider row eagerly loaded.
#[derive(Debug, Clone)]
pub struct KeyAllowedProvider {
    pub provider_id: ProviderId,
    pub models: Vec<String>,
    pub provider: ProviderDBResponse,
}

/// Database response for a proxy key. The hash is deliberately absent;
/// nothing downstream of the repository needs it.
#[derive(Debug, Clone)]
pub struct ProxyKeyDBResponse {
    pub id: KeyId,
    pub user_id: UserId,
    pub key_prefix: String,
    pub name: String,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Allow-list entries in insertion order; selection walks this order.
    pub allowed_providers: Vec<KeyAllowedProvider>,
}

impl ProxyKeyDBResponse {
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() > expires_at,
            None => false,
        }
    }

    /// A key admits requests iff it is active and unexpired.
    pub fn is_valid(&self) -> bool {
        self.is_active && !self.is_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn key(is_active: bool, expires_at: Option<DateTime<Utc>>) -> ProxyKeyDBResponse {
        ProxyKeyDBResponse {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            key_prefix: "sk-smoothllm-abc123...f789".to_string(),
            name: "test".to_string(),
            is_active,
            last_used_at: None,
            expires_at,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            allowed_providers: Vec::new(),
        }
    }

    #[test]
    fn validity_requires_active_and_unexpired() {
        assert!(key(true, None).is_valid());
        assert!(key(true, Some(Utc::now() + Duration::hours(1))).is_valid());
        assert!(!key(false, None).is_valid());
        assert!(!key(true, Some(Utc::now() - Duration::seconds(1))).is_valid());
    }
}
