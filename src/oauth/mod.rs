//! OAuth token lifecycle for Anthropic-Max providers.
//!
//! PKCE (S256) against Anthropic's public OAuth client - the same client id
//! the Claude Code CLI ships, so no client secret exists. Authorization
//! URLs are minted with an in-memory state entry; the callback redeems the
//! state and exchanges the code; proxied requests refresh the access token
//! just in time through [`OAuthService::ensure_valid_token`].

pub mod state;

use crate::db::handlers::Providers;
use crate::db::models::providers::ProviderDBResponse;
use crate::errors::{Error, Result};
use crate::providers::{ProviderKind, ANTHROPIC_VERSION};
use crate::types::UserId;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{Duration as ChronoDuration, Utc};
use rand::{thread_rng, Rng};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use state::{PendingAuthorization, StateStore, STATE_TTL};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Claude Code CLI's public OAuth client (no secret; this is public knowledge).
pub const ANTHROPIC_CLIENT_ID: &str = "9d1c250a-e61b-44d9-88ed-5944d1962f5e";
pub const ANTHROPIC_AUTH_URL: &str = "https://claude.ai/oauth/authorize";
pub const ANTHROPIC_TOKEN_URL: &str = "https://console.anthropic.com/api/oauth/token";
pub const ANTHROPIC_SCOPE: &str = "user:inference user:profile";

/// Token endpoint calls get a shorter leash than proxied requests.
const TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// How often the background sweeper clears expired states.
const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Response from the OAuth token endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
    /// Present on code exchange; refresh responses include it only when the
    /// refresh token was rotated.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

pub struct OAuthService {
    db: PgPool,
    http: reqwest::Client,
    states: StateStore,
    authorize_endpoint: String,
    token_endpoint: String,
}

impl OAuthService {
    pub fn new(db: PgPool) -> Self {
        Self {
            db,
            http: reqwest::Client::new(),
            states: StateStore::new(),
            authorize_endpoint: ANTHROPIC_AUTH_URL.to_string(),
            token_endpoint: ANTHROPIC_TOKEN_URL.to_string(),
        }
    }

    /// Build the authorization URL and park the PKCE verifier under a fresh
    /// state token. The provider must already be owner-verified by the
    /// caller.
    #[instrument(skip(self, provider), fields(provider_id = %provider.id), err)]
    pub fn authorize_url(&self, user_id: UserId, provider: &ProviderDBResponse, redirect_uri: &str) -> Result<String> {
        if provider.provider_type != ProviderKind::AnthropicMax {
            return Err(Error::BadRequest {
                message: "provider is not an Anthropic Max provider".to_string(),
            });
        }

        let code_verifier = generate_code_verifier();
        let code_challenge = code_challenge(&code_verifier);
        let state = generate_state();

        self.states.insert(
            state.clone(),
            PendingAuthorization {
                code_verifier,
                user_id,
                provider_id: provider.id,
                created_at: Utc::now(),
            },
        );

        let mut url = url::Url::parse(&self.authorize_endpoint).map_err(|e| Error::Internal {
            operation: format!("parse authorize endpoint: {e}"),
        })?;
        url.query_pairs_mut()
            .append_pair("client_id", ANTHROPIC_CLIENT_ID)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", ANTHROPIC_SCOPE)
            .append_pair("state", &state)
            .append_pair("code_challenge", &code_challenge)
            .append_pair("code_challenge_method", "S256");

        Ok(url.to_string())
    }

    /// Redeem the callback: consume the state, exchange the code, persist
    /// the grant on the provider row.
    #[instrument(skip_all, err)]
    pub async fn exchange_code(&self, code: &str, state: &str, redirect_uri: &str) -> Result<ProviderDBResponse> {
        let pending = self.states.take(state).ok_or(Error::BadRequest {
            message: "invalid or expired state".to_string(),
        })?;

        if Utc::now() - pending.created_at > STATE_TTL {
            return Err(Error::BadRequest {
                message: "state expired".to_string(),
            });
        }

        let grant = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", ANTHROPIC_CLIENT_ID),
                ("code_verifier", &pending.code_verifier),
            ])
            .await?;

        let expires_at = Utc::now() + ChronoDuration::seconds(grant.expires_in);

        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut repo = Providers::new(&mut conn);
        repo.store_oauth_tokens(pending.provider_id, &grant.access_token, grant.refresh_token.as_deref(), expires_at)
            .await?;

        let provider = repo
            .get_for_user(pending.user_id, pending.provider_id)
            .await?
            .ok_or_else(|| Error::NotFound {
                resource: "Provider".to_string(),
                id: pending.provider_id.to_string(),
            })?;

        Ok(provider)
    }

    /// Exchange the stored refresh token for a fresh access token and
    /// persist it. On failure the existing tokens are left untouched. The
    /// in-memory provider is updated so callers can use it immediately.
    #[instrument(skip_all, fields(provider_id = %provider.id), err)]
    pub async fn refresh_access_token(&self, provider: &mut ProviderDBResponse) -> Result<()> {
        if provider.refresh_token.is_empty() {
            return Err(Error::BadRequest {
                message: "no refresh token available".to_string(),
            });
        }

        let grant = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", &provider.refresh_token),
                ("client_id", ANTHROPIC_CLIENT_ID),
            ])
            .await?;

        let expires_at = Utc::now() + ChronoDuration::seconds(grant.expires_in);

        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        Providers::new(&mut conn)
            .store_oauth_tokens(provider.id, &grant.access_token, grant.refresh_token.as_deref(), expires_at)
            .await?;

        provider.access_token = grant.access_token;
        provider.token_expires_at = Some(expires_at);
        provider.oauth_connected = true;
        if let Some(rotated) = grant.refresh_token {
            provider.refresh_token = rotated;
        }

        Ok(())
    }

    /// Just-in-time refresh before a proxied request. No-op for non-OAuth
    /// providers; refreshes when less than the margin remains and a refresh
    /// token exists. Concurrent calls for the same provider may each
    /// refresh; the last write wins.
    #[instrument(skip_all, fields(provider_id = %provider.id), err)]
    pub async fn ensure_valid_token(&self, provider: &mut ProviderDBResponse) -> Result<()> {
        if !provider.provider_type.is_oauth() {
            return Ok(());
        }
        if !provider.needs_token_refresh() || provider.refresh_token.is_empty() {
            return Ok(());
        }

        self.refresh_access_token(provider).await
    }

    /// Probe the OAuth connection with a minimal 1-token request. 400 means
    /// the bearer token was accepted and the request shape rejected, which
    /// counts as connected.
    #[instrument(skip_all, fields(provider_id = %provider.id), err)]
    pub async fn test_connection(&self, provider: &mut ProviderDBResponse) -> Result<()> {
        if !provider.oauth_connected {
            return Err(Error::BadRequest {
                message: "OAuth not connected - please connect via OAuth first".to_string(),
            });
        }

        self.ensure_valid_token(provider).await?;

        let base_url = provider.effective_base_url().ok_or_else(|| Error::BadRequest {
            message: "no base URL configured for provider".to_string(),
        })?;

        let body = serde_json::json!({
            "model": "claude-3-5-haiku-20241022",
            "max_tokens": 1,
            "messages": [{"role": "user", "content": "Hi"}],
        });

        let response = self
            .http
            .post(format!("{base_url}/v1/messages"))
            .timeout(TOKEN_TIMEOUT)
            .header("Authorization", format!("Bearer {}", provider.access_token))
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::BadRequest {
                message: format!("connection failed: {e}"),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::BadRequest {
                message: "authentication failed: OAuth token is invalid or expired".to_string(),
            });
        }
        if status.is_server_error() {
            return Err(Error::BadRequest {
                message: format!("provider server error: status {}", status.as_u16()),
            });
        }

        Ok(())
    }

    /// Background task: wake every five minutes and drop stale states.
    pub async fn run_state_sweeper(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = interval.tick() => {
                    let removed = self.states.sweep();
                    if removed > 0 {
                        debug!(removed, "swept expired OAuth states");
                    }
                }
            }
        }
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenGrant> {
        let response = self
            .http
            .post(&self.token_endpoint)
            .timeout(TOKEN_TIMEOUT)
            .form(params)
            .send()
            .await
            .map_err(|e| Error::BadRequest {
                message: format!("token request failed: {e}"),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            warn!(status = status.as_u16(), "OAuth token endpoint rejected request");
            return Err(Error::BadRequest {
                message: format!("token request failed: {body}"),
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::BadRequest {
            message: format!("failed to parse token response: {e}"),
        })
    }
}

/// 32 random bytes, base64url without padding.
fn generate_code_verifier() -> String {
    let mut bytes = [0u8; 32];
    thread_rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// S256: base64url-no-pad of the SHA-256 of the verifier's ASCII form.
fn code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// 16 random bytes, base64url without padding.
fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    thread_rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn lazy_pool() -> PgPool {
        sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost:1/none")
            .unwrap()
    }

    fn service_with_token_endpoint(endpoint: &str) -> OAuthService {
        OAuthService {
            db: lazy_pool(),
            http: reqwest::Client::new(),
            states: StateStore::new(),
            authorize_endpoint: ANTHROPIC_AUTH_URL.to_string(),
            token_endpoint: endpoint.to_string(),
        }
    }

    #[test]
    fn code_challenge_matches_rfc7636_vector() {
        // Appendix B of RFC 7636.
        assert_eq!(
            code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn verifier_and_state_are_urlsafe_no_pad() {
        let verifier = generate_code_verifier();
        assert_eq!(verifier.len(), 43); // 32 bytes -> 43 base64url chars
        assert!(!verifier.contains('='));

        let state = generate_state();
        assert_eq!(state.len(), 22); // 16 bytes -> 22 base64url chars
        assert!(!state.contains('='));
    }

    #[tokio::test]
    async fn token_request_posts_form_and_parses_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/oauth/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=R"))
            .and(body_string_contains(format!("client_id={ANTHROPIC_CLIENT_ID}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "T2",
                "token_type": "Bearer",
                "expires_in": 28800,
                "refresh_token": "R2",
                "scope": "user:inference user:profile"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let service = service_with_token_endpoint(&format!("{}/api/oauth/token", server.uri()));
        let grant = service
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", "R"),
                ("client_id", ANTHROPIC_CLIENT_ID),
            ])
            .await
            .unwrap();

        assert_eq!(grant.access_token, "T2");
        assert_eq!(grant.expires_in, 28800);
        assert_eq!(grant.refresh_token.as_deref(), Some("R2"));
    }

    #[tokio::test]
    async fn token_endpoint_rejection_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/oauth/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant"
            })))
            .mount(&server)
            .await;

        let service = service_with_token_endpoint(&format!("{}/api/oauth/token", server.uri()));
        let err = service
            .request_token(&[("grant_type", "refresh_token"), ("refresh_token", "bad")])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("token request failed"));
    }

    #[tokio::test]
    async fn refresh_without_token_is_rejected_without_http() {
        let service = service_with_token_endpoint("http://127.0.0.1:9/token");
        let mut provider = test_provider(ProviderKind::AnthropicMax);
        provider.refresh_token = String::new();

        let err = service.refresh_access_token(&mut provider).await.unwrap_err();
        assert!(err.to_string().contains("no refresh token"));
    }

    #[tokio::test]
    async fn ensure_valid_token_is_noop_for_api_key_providers() {
        let service = service_with_token_endpoint("http://127.0.0.1:9/token");
        let mut provider = test_provider(ProviderKind::OpenAi);

        service.ensure_valid_token(&mut provider).await.unwrap();
        assert!(provider.access_token.is_empty());
    }

    #[tokio::test]
    async fn ensure_valid_token_skips_fresh_tokens() {
        let service = service_with_token_endpoint("http://127.0.0.1:9/token");
        let mut provider = test_provider(ProviderKind::AnthropicMax);
        provider.refresh_token = "R".to_string();
        provider.access_token = "T1".to_string();
        provider.token_expires_at = Some(Utc::now() + ChronoDuration::hours(8));

        // Would hit the unreachable endpoint if it tried to refresh.
        service.ensure_valid_token(&mut provider).await.unwrap();
        assert_eq!(provider.access_token, "T1");
    }

    #[tokio::test]
    async fn authorize_url_carries_pkce_params_and_parks_state() {
        let service = service_with_token_endpoint("http://127.0.0.1:9/token");
        let provider = test_provider(ProviderKind::AnthropicMax);

        let url = service
            .authorize_url(provider.user_id, &provider, "https://gw.example.com/api/v1/oauth/anthropic/callback")
            .unwrap();

        let parsed = url::Url::parse(&url).unwrap();
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs.get("client_id").unwrap(), ANTHROPIC_CLIENT_ID);
        assert_eq!(pairs.get("response_type").unwrap(), "code");
        assert_eq!(pairs.get("scope").unwrap(), ANTHROPIC_SCOPE);
        assert_eq!(pairs.get("code_challenge_method").unwrap(), "S256");

        let state = pairs.get("state").unwrap();
        let pending = service.states.take(state).expect("state should be parked");
        assert_eq!(pending.provider_id, provider.id);
        assert_eq!(code_challenge(&pending.code_verifier), *pairs.get("code_challenge").unwrap());
    }

    #[tokio::test]
    async fn authorize_url_rejects_non_oauth_providers() {
        let service = service_with_token_endpoint("http://127.0.0.1:9/token");
        let provider = test_provider(ProviderKind::Anthropic);

        let err = service
            .authorize_url(provider.user_id, &provider, "https://gw.example.com/cb")
            .unwrap_err();
        assert!(err.to_string().contains("not an Anthropic Max provider"));
    }

    #[tokio::test]
    async fn exchange_rejects_unknown_and_expired_states() {
        let service = service_with_token_endpoint("http://127.0.0.1:9/token");

        let err = service
            .exchange_code("code", "never-issued", "https://gw.example.com/cb")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid or expired state"));

        service.states.insert(
            "stale".to_string(),
            PendingAuthorization {
                code_verifier: "v".to_string(),
                user_id: uuid::Uuid::new_v4(),
                provider_id: uuid::Uuid::new_v4(),
                created_at: Utc::now() - ChronoDuration::minutes(16),
            },
        );
        let err = service
            .exchange_code("code", "stale", "https://gw.example.com/cb")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("state expired"));
        // Consumed either way.
        assert!(service.states.take("stale").is_none());
    }

    fn test_provider(kind: ProviderKind) -> ProviderDBResponse {
        ProviderDBResponse {
            id: uuid::Uuid::new_v4(),
            user_id: uuid::Uuid::new_v4(),
            name: "max".to_string(),
            provider_type: kind,
            base_url: None,
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
}
