//! OpenAPI documentation for the management and proxy surfaces.

use crate::api::handlers;
use crate::api::models::{
    keys::{AllowedProviderInfo, KeyCreate, KeyCreateResponse, KeyResponse, KeyUpdate, ProviderSelection},
    providers::{ProviderCreate, ProviderResponse, ProviderUpdate, TestConnectionResponse},
    proxy::{ModelEntry, ModelsResponse},
    usage::{
        DailyUsageResponse, RecentUsageResponse, UsageByKeyResponse, UsageByModelResponse, UsageByProviderResponse,
        UsageRecordResponse, UsageSummaryResponse,
    },
};
use crate::providers::ProviderKind;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "SmoothLLM Gateway",
        description = "Multi-tenant LLM proxy gateway: providers, proxy keys, OAuth and usage"
    ),
    paths(
        handlers::providers::list_providers,
        handlers::providers::create_provider,
        handlers::providers::get_provider,
        handlers::providers::update_provider,
        handlers::providers::delete_provider,
        handlers::providers::test_provider_connection,
        handlers::providers::test_provider_with_credentials,
        handlers::keys::list_keys,
        handlers::keys::create_key,
        handlers::keys::get_key,
        handlers::keys::update_key,
        handlers::keys::revoke_key,
        handlers::keys::delete_key,
        handlers::oauth::authorize,
        handlers::oauth::callback,
        handlers::oauth::disconnect,
        handlers::oauth::test,
        handlers::usage::summary,
        handlers::usage::daily,
        handlers::usage::by_key,
        handlers::usage::by_provider,
        handlers::usage::by_model,
        handlers::usage::recent,
        handlers::proxy::chat_completions,
        handlers::proxy::messages,
        handlers::proxy::list_models,
    ),
    components(schemas(
        ProviderKind,
        ProviderCreate,
        ProviderUpdate,
        ProviderResponse,
        TestConnectionResponse,
        ProviderSelection,
        KeyCreate,
        KeyUpdate,
        KeyResponse,
        KeyCreateResponse,
        AllowedProviderInfo,
        UsageSummaryResponse,
        DailyUsageResponse,
        UsageByKeyResponse,
        UsageByProviderResponse,
        UsageByModelResponse,
        UsageRecordResponse,
        RecentUsageResponse,
        ModelEntry,
        ModelsResponse,
    )),
    tags(
        (name = "providers", description = "Upstream provider configuration"),
        (name = "keys", description = "Proxy key issuance and lifecycle"),
        (name = "oauth", description = "Anthropic Max OAuth flow"),
        (name = "usage", description = "Usage aggregation and history"),
        (name = "proxy", description = "OpenAI/Anthropic compatible proxy"),
    )
)]
pub struct ApiDoc;
