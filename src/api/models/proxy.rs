//! Proxy-surface response models: the synthesized model catalog.

use crate::db::models::proxy_keys::ProxyKeyDBResponse;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ModelEntry {
    /// `<provider_type>/<model>`
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<ModelEntry>,
}

/// Build the model catalog a key may route to: for each active allow-listed
/// provider, either its explicit model list or the kind's default catalog,
/// each id prefixed with the provider type. The provider's default model is
/// always included. Duplicates collapse.
pub fn catalog_for_key(key: &ProxyKeyDBResponse, now: i64) -> ModelsResponse {
    let mut data = Vec::new();
    let mut seen = HashSet::new();

    let mut push = |id: String, owned_by: &str, data: &mut Vec<ModelEntry>| {
        if seen.insert(id.clone()) {
            data.push(ModelEntry {
                id,
                object: "model".to_string(),
                created: now,
                owned_by: owned_by.to_string(),
            });
        }
    };

    for entry in &key.allowed_providers {
        let provider = &entry.provider;
        if !provider.is_active {
            continue;
        }
        let kind = provider.provider_type.as_str();

        if !entry.models.is_empty() {
            for model in &entry.models {
                push(format!("{kind}/{model}"), kind, &mut data);
            }
            continue;
        }

        if !provider.default_model.is_empty() {
            push(format!("{kind}/{}", provider.default_model), kind, &mut data);
        }
        for model in provider.provider_type.default_catalog() {
            push(format!("{kind}/{model}"), kind, &mut data);
        }
    }

    ModelsResponse {
        object: "list".to_string(),
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::providers::ProviderDBResponse;
    use crate::db::models::proxy_keys::KeyAllowedProvider;
    use crate::providers::ProviderKind;
    use chrono::Utc;
    use uuid::Uuid;

    fn provider(kind: ProviderKind, default_model: &str, is_active: bool) -> ProviderDBResponse {
        ProviderDBResponse {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "p".to_string(),
            provider_type: kind,
            base_url: None,
            api_key: String::new(),
            refresh_token: String::new(),
            access_token: String::new(),
            token_expires_at: None,
            oauth_connected: false,
            is_active,
            default_model: default_model.to_string(),
            input_cost_per_million: 0.0,
            output_cost_per_million: 0.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn key(entries: Vec<(ProviderDBResponse, Vec<&str>)>) -> ProxyKeyDBResponse {
        ProxyKeyDBResponse {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            key_prefix: String::new(),
            name: String::new(),
            is_active: true,
            last_used_at: None,
            expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            allowed_providers: entries
                .into_iter()
                .map(|(provider, models)| KeyAllowedProvider {
                    provider_id: provider.id,
                    models: models.into_iter().map(String::from).collect(),
                    provider,
                })
                .collect(),
        }
    }

    #[test]
    fn explicit_models_win_over_defaults() {
        let catalog = catalog_for_key(&key(vec![(provider(ProviderKind::OpenAi, "", true), vec!["gpt-4o-mini"])]), 0);
        let ids: Vec<&str> = catalog.data.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["openai/gpt-4o-mini"]);
    }

    #[test]
    fn unrestricted_entry_exposes_the_default_catalog() {
        let catalog = catalog_for_key(&key(vec![(provider(ProviderKind::Anthropic, "", true), vec![])]), 0);
        assert!(catalog
            .data
            .iter()
            .any(|m| m.id == "anthropic/claude-3-5-sonnet-20241022"));
        assert!(catalog.data.iter().all(|m| m.id.starts_with("anthropic/")));
    }

    #[test]
    fn default_model_is_listed_for_local_kinds() {
        let catalog = catalog_for_key(&key(vec![(provider(ProviderKind::Local, "llama-3.1-8b", true), vec![])]), 0);
        let ids: Vec<&str> = catalog.data.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["local/llama-3.1-8b"]);
    }

    #[test]
    fn inactive_providers_are_skipped_and_dupes_collapse() {
        let catalog = catalog_for_key(
            &key(vec![
                (provider(ProviderKind::OpenAi, "", false), vec!["gpt-4o"]),
                (provider(ProviderKind::OpenAi, "", true), vec!["gpt-4o"]),
                (provider(ProviderKind::OpenAi, "", true), vec!["gpt-4o"]),
            ]),
            0,
        );
        assert_eq!(catalog.data.len(), 1);
        assert_eq!(catalog.data[0].id, "openai/gpt-4o");
    }
}
