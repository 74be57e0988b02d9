//! # smoothllm: Multi-Tenant LLM Proxy Gateway
//!
//! `smoothllm` sits between API consumers and a set of user-configured LLM
//! providers. Tenants mint proxy keys bound to an allow-list of their own
//! providers; clients present those keys against OpenAI- and
//! Anthropic-compatible endpoints and the gateway routes each request to an
//! allow-listed upstream, translating between wire formats where the
//! schemas differ.
//!
//! ## Request Flow
//!
//! A chat request arrives at `/v1/chat/completions` with a bearer proxy
//! key. The key is validated by hashed lookup and its provider allow-list
//! loaded in the same pass. The `model` field (optionally
//! `<provider>/<model>`) selects the first admitting allow-list entry. For
//! Anthropic-Max providers the OAuth access token is refreshed just in
//! time. OpenAI-format bodies headed to Anthropic upstreams are translated;
//! everything else is forwarded with the routing prefix stripped. The
//! upstream response streams back to the client as it arrives, and a usage
//! record (tokens, cost at the provider's rates, latency, status) is
//! written off the response path.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum); persistence
//! is PostgreSQL via sqlx. The management API under `/api/v1/*` expects the
//! hosting executable's identity middleware to authenticate callers and
//! inject an [`auth::AuthUser`]; the proxy surface at `/v1/*` is
//! authenticated solely by proxy key. OAuth PKCE state lives in an
//! in-process map swept by a background task.

pub mod api;
pub mod auth;
pub mod config;
mod crypto;
pub mod db;
pub mod errors;
pub mod oauth;
mod openapi;
pub mod providers;
pub mod proxy;
pub mod telemetry;
mod types;
pub mod usage;

use crate::oauth::OAuthService;
use crate::openapi::ApiDoc;
use crate::providers::probe::ProviderProbe;
use crate::usage::UsageRecorder;
use anyhow::Context;
use axum::{
    http::{self, HeaderValue},
    routing::{get, post},
    Json, Router,
};
use bon::Builder;
pub use config::Config;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{info, instrument, Level};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use types::{KeyId, ProviderId, UsageRecordId, UserId};

/// Application state shared across all request handlers.
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    /// Shared client for proxied upstream requests.
    pub http: reqwest::Client,
    pub oauth: Arc<OAuthService>,
    pub usage: UsageRecorder,
    pub probe: Arc<ProviderProbe>,
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PUT,
            http::Method::DELETE,
            http::Method::OPTIONS,
        ])
        .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION, http::header::ACCEPT]);

    if config.cors.allowed_origins.iter().any(|o| o == "*") {
        Ok(layer.allow_origin(tower_http::cors::Any))
    } else {
        let origins = config
            .cors
            .allowed_origins
            .iter()
            .map(|origin| origin.trim_end_matches('/').parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()
            .context("invalid CORS origin")?;
        Ok(layer.allow_origin(origins))
    }
}

/// Build the application router: management API under `/api/v1`, the proxy
/// surface at the root, OpenAPI docs, CORS and tracing.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    use api::handlers::{keys, oauth as oauth_handlers, providers, proxy, usage};

    let management = Router::new()
        .route("/providers", get(providers::list_providers).post(providers::create_provider))
        .route("/providers/test", post(providers::test_provider_with_credentials))
        .route(
            "/providers/{id}",
            get(providers::get_provider)
                .put(providers::update_provider)
                .delete(providers::delete_provider),
        )
        .route("/providers/{id}/test", post(providers::test_provider_connection))
        .route("/keys", get(keys::list_keys).post(keys::create_key))
        .route(
            "/keys/{id}",
            get(keys::get_key).put(keys::update_key).delete(keys::delete_key),
        )
        .route("/keys/{id}/revoke", post(keys::revoke_key))
        .route("/oauth/anthropic/authorize", get(oauth_handlers::authorize))
        .route("/oauth/anthropic/callback", get(oauth_handlers::callback))
        .route("/oauth/anthropic/disconnect/{id}", post(oauth_handlers::disconnect))
        .route("/oauth/anthropic/test/{id}", post(oauth_handlers::test))
        .route("/usage", get(usage::summary))
        .route("/usage/daily", get(usage::daily))
        .route("/usage/by-key", get(usage::by_key))
        .route("/usage/by-provider", get(usage::by_provider))
        .route("/usage/by-model", get(usage::by_model))
        .route("/usage/recent", get(usage::recent));

    let proxy_surface = Router::new()
        .route("/v1/chat/completions", post(proxy::chat_completions))
        .route("/v1/models", get(proxy::list_models))
        .route("/v1/messages", post(proxy::messages));

    let cors_layer = create_cors_layer(&state.config)?;

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/api/v1", management)
        .merge(proxy_surface)
        .with_state(state)
        .route("/api/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/api/docs", ApiDoc::openapi()))
        .layer(cors_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// Connect, migrate, start background services and serve until ctrl-c.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("failed to connect to database")?;

    db::migrator().run(&pool).await.context("failed to run migrations")?;

    let oauth = Arc::new(OAuthService::new(pool.clone()));
    let state = AppState::builder()
        .db(pool.clone())
        .config(config.clone())
        .http(reqwest::Client::new())
        .oauth(oauth.clone())
        .usage(UsageRecorder::new(pool))
        .probe(Arc::new(ProviderProbe::new()))
        .build();

    let shutdown_token = tokio_util::sync::CancellationToken::new();
    let mut background_tasks = tokio::task::JoinSet::new();
    {
        let oauth = oauth.clone();
        let token = shutdown_token.clone();
        background_tasks.spawn(async move { oauth.run_state_sweeper(token).await });
    }

    let router = build_router(state)?;
    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;
    info!("listening on {}", listener.local_addr()?);

    let server = async { axum::serve(listener, router).await };
    tokio::select! {
        result = server => {
            result.context("server error")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        Some(result) = background_tasks.join_next() => {
            result.context("background task panicked")??;
            anyhow::bail!("background task exited unexpectedly");
        }
    }

    shutdown_token.cancel();
    while background_tasks.join_next().await.is_some() {}

    Ok(())
}
