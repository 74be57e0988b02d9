//! Model routing: parsing `<provider>/<model>` strings and selecting an
//! allow-listed provider for a request.

use crate::db::models::proxy_keys::{KeyAllowedProvider, ProxyKeyDBResponse};

/// Parsed routing information from a client-supplied model string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRoute {
    /// Lowercased provider hint from a `<provider>/<model>` prefix; empty
    /// when the client sent a bare model name.
    pub provider_hint: String,
    /// The model name to send upstream (may itself contain `/`).
    pub model_name: String,
    /// The original string as received, pre-translation.
    pub raw: String,
}

/// Parse a LiteLLM-style model string. Splits on the first `/` only; the
/// right side passes through untouched.
pub fn parse_model(model: &str, fallback_hint: &str) -> ModelRoute {
    match model.split_once('/') {
        Some((prefix, rest)) => ModelRoute {
            provider_hint: prefix.to_lowercase(),
            model_name: rest.to_string(),
            raw: model.to_string(),
        },
        None => ModelRoute {
            provider_hint: fallback_hint.to_string(),
            model_name: model.to_string(),
            raw: model.to_string(),
        },
    }
}

/// Select the first allow-list entry (insertion order) that admits the
/// requested model:
///
/// 1. the provider is active,
/// 2. the entry's model list is empty, or contains the parsed model name or
///    the raw string (exact, case-sensitive),
/// 3. a provider prefix, when present, matches the provider's type or name
///    (case-insensitive).
pub fn select_provider<'k>(key: &'k ProxyKeyDBResponse, raw_model: &str) -> Option<&'k KeyAllowedProvider> {
    let route = parse_model(raw_model, "");

    key.allowed_providers.iter().find(|entry| {
        if !entry.provider.is_active {
            return false;
        }

        let model_allowed = entry.models.is_empty()
            || entry
                .models
                .iter()
                .any(|m| m == &route.model_name || m == raw_model);
        if !model_allowed {
            return false;
        }

        if !route.provider_hint.is_empty() {
            let type_matches = route
                .provider_hint
                .eq_ignore_ascii_case(entry.provider.provider_type.as_str());
            let name_matches = route.provider_hint.eq_ignore_ascii_case(&entry.provider.name);
            if !type_matches && !name_matches {
                return false;
            }
        }

        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::providers::ProviderDBResponse;
    use crate::providers::ProviderKind;
    use chrono::Utc;
    use uuid::Uuid;

    fn provider(name: &str, kind: ProviderKind, is_active: bool) -> ProviderDBResponse {
        ProviderDBResponse {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: name.to_string(),
            provider_type: kind,
            base_url: None,
            api_key: "sk-upstream".to_string(),
            refresh_token: String::new(),
            access_token: String::new(),
            token_expires_at: None,
            oauth_connected: false,
            is_active,
            default_model: String::new(),
            input_cost_per_million: 0.0,
            output_cost_per_million: 0.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn key_with(entries: Vec<(ProviderDBResponse, Vec<&str>)>) -> ProxyKeyDBResponse {
        ProxyKeyDBResponse {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            key_prefix: "sk-smoothllm-aaaaaa...bbbb".to_string(),
            name: "test".to_string(),
            is_active: true,
            last_used_at: None,
            expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            allowed_providers: entries
                .into_iter()
                .map(|(provider, models)| KeyAllowedProvider {
                    provider_id: provider.id,
                    models: models.into_iter().map(|m| m.to_string()).collect(),
                    provider,
                })
                .collect(),
        }
    }

    #[test]
    fn parse_splits_on_first_slash_only() {
        let route = parse_model("openai/ft:gpt-4o/custom", "");
        assert_eq!(route.provider_hint, "openai");
        assert_eq!(route.model_name, "ft:gpt-4o/custom");
        assert_eq!(route.raw, "openai/ft:gpt-4o/custom");
    }

    #[test]
    fn parse_lowercases_hint() {
        let route = parse_model("Anthropic/claude-3-5-haiku-20241022", "");
        assert_eq!(route.provider_hint, "anthropic");
        assert_eq!(route.model_name, "claude-3-5-haiku-20241022");
    }

    #[test]
    fn parse_uses_fallback_without_prefix() {
        let route = parse_model("gpt-4o", "openai");
        assert_eq!(route.provider_hint, "openai");
        assert_eq!(route.model_name, "gpt-4o");
    }

    #[test]
    fn parse_format_round_trip() {
        let formatted = format!("{}/{}", "anthropic", "claude-3-5-sonnet-20241022");
        let route = parse_model(&formatted, "");
        assert_eq!(route.provider_hint, "anthropic");
        assert_eq!(route.model_name, "claude-3-5-sonnet-20241022");
    }

    #[test]
    fn select_empty_models_admits_anything() {
        let key = key_with(vec![(provider("mine", ProviderKind::OpenAi, true), vec![])]);
        assert!(select_provider(&key, "gpt-4o").is_some());
        assert!(select_provider(&key, "anything-at-all").is_some());
    }

    #[test]
    fn select_rejects_model_outside_list() {
        // Allow-list restricted to gpt-4o-mini; a request for gpt-4o must not
        // route anywhere.
        let key = key_with(vec![(provider("a", ProviderKind::OpenAi, true), vec!["gpt-4o-mini"])]);
        assert!(select_provider(&key, "gpt-4o").is_none());
        assert!(select_provider(&key, "gpt-4o-mini").is_some());
    }

    #[test]
    fn select_matches_raw_or_parsed_model() {
        let key = key_with(vec![(
            provider("a", ProviderKind::Anthropic, true),
            vec!["claude-3-5-sonnet-20241022"],
        )]);
        assert!(select_provider(&key, "anthropic/claude-3-5-sonnet-20241022").is_some());

        // The list may also pin the fully prefixed form.
        let key = key_with(vec![(
            provider("a", ProviderKind::Anthropic, true),
            vec!["anthropic/claude-3-5-sonnet-20241022"],
        )]);
        assert!(select_provider(&key, "anthropic/claude-3-5-sonnet-20241022").is_some());
    }

    #[test]
    fn select_skips_inactive_providers() {
        let key = key_with(vec![
            (provider("down", ProviderKind::OpenAi, false), vec![]),
            (provider("up", ProviderKind::OpenAi, true), vec![]),
        ]);
        let selected = select_provider(&key, "gpt-4o").unwrap();
        assert_eq!(selected.provider.name, "up");
    }

    #[test]
    fn select_honors_provider_hint_by_type_or_name() {
        let key = key_with(vec![
            (provider("primary", ProviderKind::OpenAi, true), vec![]),
            (provider("claude", ProviderKind::Anthropic, true), vec![]),
        ]);

        let by_type = select_provider(&key, "anthropic/claude-3-5-haiku-20241022").unwrap();
        assert_eq!(by_type.provider.name, "claude");

        let by_name = select_provider(&key, "Claude/claude-3-5-haiku-20241022").unwrap();
        assert_eq!(by_name.provider.name, "claude");

        assert!(select_provider(&key, "mistral/mistral-large").is_none());
    }

    #[test]
    fn select_walks_entries_in_insertion_order() {
        let key = key_with(vec![
            (provider("first", ProviderKind::OpenAi, true), vec![]),
            (provider("second", ProviderKind::OpenAi, true), vec![]),
        ]);
        assert_eq!(select_provider(&key, "gpt-4o").unwrap().provider.name, "first");
    }
}
