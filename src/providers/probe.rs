//! Connectivity and auth probes for provider configurations.
//!
//! A probe answers "can this configuration reach and authenticate against
//! its upstream" without proxying a real request. Anthropic has no cheap
//! unauthenticated-safe GET, so its probe POSTs an empty body to
//! `/v1/messages` and treats the resulting 400 as proof the credentials
//! were accepted.

use crate::db::models::providers::ProviderDBResponse;
use crate::providers::{ProviderKind, ANTHROPIC_VERSION};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use std::time::Instant;
use tracing::instrument;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one probe. Failures carry a human-readable reason; the
/// report is produced for every attempt, network errors included.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub success: bool,
    pub status_code: Option<i32>,
    pub latency_ms: i64,
    pub error_message: Option<String>,
}

impl ProbeReport {
    fn ok(status: StatusCode, latency_ms: i64) -> Self {
        Self {
            success: true,
            status_code: Some(status.as_u16() as i32),
            latency_ms,
            error_message: None,
        }
    }

    fn fail(status: Option<StatusCode>, latency_ms: i64, message: String) -> Self {
        Self {
            success: false,
            status_code: status.map(|s| s.as_u16() as i32),
            latency_ms,
            error_message: Some(message),
        }
    }
}

/// Executes connectivity probes against provider endpoints.
pub struct ProviderProbe {
    client: Client,
}

impl ProviderProbe {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    /// Probe a provider configuration. Anthropic-Max connections are
    /// exercised through the OAuth service instead; probing one here only
    /// reports whether the flow has been completed.
    #[instrument(skip(self, provider), fields(kind = %provider.provider_type))]
    pub async fn execute(&self, provider: &ProviderDBResponse) -> ProbeReport {
        let start = Instant::now();
        let elapsed = |start: Instant| start.elapsed().as_millis() as i64;

        if provider.provider_type == ProviderKind::AnthropicMax {
            return if provider.oauth_connected {
                ProbeReport::ok(StatusCode::OK, elapsed(start))
            } else {
                ProbeReport::fail(
                    None,
                    elapsed(start),
                    "OAuth not connected - please connect via OAuth first".to_string(),
                )
            };
        }

        let Some(base_url) = provider.effective_base_url() else {
            return ProbeReport::fail(None, elapsed(start), "no base URL configured for provider".to_string());
        };

        let url = format!("{base_url}{}", provider.provider_type.probe_path());

        let request = match provider.provider_type {
            // No valid body is sent; 400 from the messages endpoint means
            // the API key was accepted.
            ProviderKind::Anthropic => self
                .client
                .post(&url)
                .header("x-api-key", &provider.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("Content-Type", "application/json"),
            _ => self
                .client
                .get(&url)
                .header("Authorization", format!("Bearer {}", provider.api_key))
                .header("Content-Type", "application/json"),
        };

        let response = match request.timeout(PROBE_TIMEOUT).send().await {
            Ok(response) => response,
            Err(e) => return ProbeReport::fail(None, elapsed(start), format!("connection failed: {e}")),
        };

        let status = response.status();
        let latency_ms = elapsed(start);

        match provider.provider_type {
            ProviderKind::Anthropic => {
                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                    ProbeReport::fail(Some(status), latency_ms, "authentication failed: invalid API key".to_string())
                } else if status.is_server_error() {
                    ProbeReport::fail(
                        Some(status),
                        latency_ms,
                        format!("provider server error: status {}", status.as_u16()),
                    )
                } else {
                    ProbeReport::ok(status, latency_ms)
                }
            }
            _ => {
                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                    ProbeReport::fail(Some(status), latency_ms, "authentication failed: invalid API key".to_string())
                } else if status.as_u16() >= 400 {
                    ProbeReport::fail(
                        Some(status),
                        latency_ms,
                        format!("connection test failed: status {}", status.as_u16()),
                    )
                } else {
                    ProbeReport::ok(status, latency_ms)
                }
            }
        }
    }
}

impl Default for ProviderProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(kind: ProviderKind, base_url: Option<&str>) -> ProviderDBResponse {
        ProviderDBResponse {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "probe-me".to_string(),
            provider_type: kind,
            base_url: base_url.map(|s| s.to_string()),
            api_key: "sk-test".to_string(),
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

    #[tokio::test]
    async fn openai_probe_hits_models_with_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"object": "list", "data": []})))
            .expect(1)
            .mount(&server)
            .await;

        let report = ProviderProbe::new()
            .execute(&provider(ProviderKind::OpenAi, Some(&server.uri())))
            .await;
        assert!(report.success);
        assert_eq!(report.status_code, Some(200));
    }

    #[tokio::test]
    async fn unauthorized_probe_reports_invalid_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let report = ProviderProbe::new()
            .execute(&provider(ProviderKind::Vllm, Some(&server.uri())))
            .await;
        assert!(!report.success);
        assert!(report.error_message.unwrap().contains("authentication failed"));
    }

    #[tokio::test]
    async fn anthropic_probe_treats_400_as_auth_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", "2023-06-01"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"type": "invalid_request_error", "message": "messages: field required"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let report = ProviderProbe::new()
            .execute(&provider(ProviderKind::Anthropic, Some(&server.uri())))
            .await;
        assert!(report.success, "400 without a body means the key was accepted");
    }

    #[tokio::test]
    async fn anthropic_probe_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let report = ProviderProbe::new()
            .execute(&provider(ProviderKind::Anthropic, Some(&server.uri())))
            .await;
        assert!(!report.success);
    }

    #[tokio::test]
    async fn server_errors_fail_the_probe() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let report = ProviderProbe::new()
            .execute(&provider(ProviderKind::Anthropic, Some(&server.uri())))
            .await;
        assert!(!report.success);
        assert!(report.error_message.unwrap().contains("provider server error"));
    }

    #[tokio::test]
    async fn zai_probe_uses_bare_models_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(1)
            .mount(&server)
            .await;

        let report = ProviderProbe::new()
            .execute(&provider(ProviderKind::Zai, Some(&server.uri())))
            .await;
        assert!(report.success);
    }

    #[tokio::test]
    async fn missing_base_url_fails_fast() {
        let report = ProviderProbe::new().execute(&provider(ProviderKind::Local, None)).await;
        assert!(!report.success);
        assert!(report.error_message.unwrap().contains("no base URL"));
    }

    #[tokio::test]
    async fn anthropic_max_reports_connection_state() {
        let mut p = provider(ProviderKind::AnthropicMax, None);
        let report = ProviderProbe::new().execute(&p).await;
        assert!(!report.success);

        p.oauth_connected = true;
        let report = ProviderProbe::new().execute(&p).await;
        assert!(report.success);
    }
}
