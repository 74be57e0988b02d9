//! Provider kinds and their capability surface.
//!
//! Everything the rest of the crate needs to know about an upstream flavor
//! hangs off [`ProviderKind`]: default base URL, wire protocol, chat path,
//! probe shape, auth header injection and the fallback model catalog. The
//! dispatcher and probe consult these methods instead of branching on a
//! string discriminator.

pub mod probe;

use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// API version header required by Anthropic upstreams.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// The closed set of supported upstream provider flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "VARCHAR")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    #[sqlx(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    #[sqlx(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "anthropic_max")]
    #[sqlx(rename = "anthropic_max")]
    AnthropicMax,
    #[serde(rename = "vllm")]
    #[sqlx(rename = "vllm")]
    Vllm,
    #[serde(rename = "local")]
    #[sqlx(rename = "local")]
    Local,
    #[serde(rename = "zai")]
    #[sqlx(rename = "zai")]
    Zai,
}

/// Which wire protocol a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    OpenAi,
    Anthropic,
}

/// Credential material the dispatcher injects into an upstream request.
/// Secrets are borrowed from the provider row for the duration of one call
/// and never logged.
pub struct Credentials<'a> {
    pub api_key: &'a str,
    pub access_token: &'a str,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 6] = [
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::AnthropicMax,
        ProviderKind::Vllm,
        ProviderKind::Local,
        ProviderKind::Zai,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::AnthropicMax => "anthropic_max",
            ProviderKind::Vllm => "vllm",
            ProviderKind::Local => "local",
            ProviderKind::Zai => "zai",
        }
    }

    pub fn parse(s: &str) -> Option<ProviderKind> {
        Self::ALL.iter().copied().find(|k| k.as_str() == s)
    }

    /// Whether credentials come from the OAuth token lifecycle rather than a
    /// static API key.
    pub fn is_oauth(&self) -> bool {
        matches!(self, ProviderKind::AnthropicMax)
    }

    pub fn wire_format(&self) -> WireFormat {
        match self {
            ProviderKind::Anthropic | ProviderKind::AnthropicMax => WireFormat::Anthropic,
            _ => WireFormat::OpenAi,
        }
    }

    /// Built-in base URL used when the provider row doesn't carry one.
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            ProviderKind::OpenAi => Some("https://api.openai.com"),
            ProviderKind::Anthropic | ProviderKind::AnthropicMax => Some("https://api.anthropic.com"),
            ProviderKind::Zai => Some("https://api.z.ai/api/paas/v4"),
            ProviderKind::Vllm | ProviderKind::Local => None,
        }
    }

    /// Path appended to the base URL for chat requests.
    pub fn chat_path(&self) -> &'static str {
        match self.wire_format() {
            WireFormat::Anthropic => "/v1/messages",
            WireFormat::OpenAi => match self {
                // zai's base URL already carries the API root
                ProviderKind::Zai => "/chat/completions",
                _ => "/v1/chat/completions",
            },
        }
    }

    /// Path used by the connectivity probe.
    pub fn probe_path(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic | ProviderKind::AnthropicMax => "/v1/messages",
            ProviderKind::Zai => "/models",
            _ => "/v1/models",
        }
    }

    /// Inject upstream credentials into a request. Anthropic flavors also
    /// need the `anthropic-version` header.
    pub fn apply_auth(&self, req: RequestBuilder, creds: &Credentials<'_>) -> RequestBuilder {
        match self {
            ProviderKind::Anthropic => req
                .header("x-api-key", creds.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            ProviderKind::AnthropicMax => req
                .header("Authorization", format!("Bearer {}", creds.access_token))
                .header("anthropic-version", ANTHROPIC_VERSION),
            _ => req.header("Authorization", format!("Bearer {}", creds.api_key)),
        }
    }

    /// Hard-coded fallback model catalog, used by `GET /v1/models` when a
    /// key's allow-list entry doesn't restrict models.
    pub fn default_catalog(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::OpenAi => &["gpt-4o", "gpt-4o-mini", "gpt-4-turbo", "gpt-3.5-turbo"],
            ProviderKind::Anthropic | ProviderKind::AnthropicMax => &[
                "claude-sonnet-4-20250514",
                "claude-opus-4-20250514",
                "claude-3-5-sonnet-20241022",
                "claude-3-5-haiku-20241022",
            ],
            ProviderKind::Vllm | ProviderKind::Local | ProviderKind::Zai => &[],
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_kind() {
        for kind in ProviderKind::ALL {
            assert_eq!(ProviderKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ProviderKind::parse("bedrock"), None);
    }

    #[test]
    fn serde_uses_wire_names() {
        assert_eq!(
            serde_json::to_string(&ProviderKind::AnthropicMax).unwrap(),
            "\"anthropic_max\""
        );
        let parsed: ProviderKind = serde_json::from_str("\"openai\"").unwrap();
        assert_eq!(parsed, ProviderKind::OpenAi);
    }

    #[test]
    fn chat_paths_per_kind() {
        assert_eq!(ProviderKind::OpenAi.chat_path(), "/v1/chat/completions");
        assert_eq!(ProviderKind::Vllm.chat_path(), "/v1/chat/completions");
        assert_eq!(ProviderKind::Zai.chat_path(), "/chat/completions");
        assert_eq!(ProviderKind::Anthropic.chat_path(), "/v1/messages");
        assert_eq!(ProviderKind::AnthropicMax.chat_path(), "/v1/messages");
    }

    #[test]
    fn oauth_only_for_anthropic_max() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.is_oauth(), kind == ProviderKind::AnthropicMax);
        }
    }

    #[test]
    fn local_kinds_have_no_default_base_url() {
        assert!(ProviderKind::Vllm.default_base_url().is_none());
        assert!(ProviderKind::Local.default_base_url().is_none());
        assert_eq!(
            ProviderKind::Anthropic.default_base_url(),
            Some("https://api.anthropic.com")
        );
    }
}
