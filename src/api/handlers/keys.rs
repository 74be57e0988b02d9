//! Management handlers for proxy keys.

use crate::api::models::keys::{KeyCreate, KeyCreateResponse, KeyResponse, KeyUpdate, ProviderSelection};
use crate::auth::AuthUser;
use crate::crypto::generate_proxy_key;
use crate::db::handlers::{Providers, ProxyKeys};
use crate::db::models::proxy_keys::{ProxyKeyCreateDBRequest, ProxyKeyUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::types::{KeyId, UserId};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use sqlx::PgConnection;

/// Every referenced provider must exist, belong to the caller, and be
/// active before a key may bind to it.
async fn check_selections(conn: &mut PgConnection, user_id: UserId, selections: &[ProviderSelection]) -> Result<()> {
    let mut repo = Providers::new(conn);
    for selection in selections {
        let provider = repo
            .get_for_user(user_id, selection.provider_id)
            .await?
            .ok_or_else(|| Error::NotFound {
                resource: "Provider".to_string(),
                id: selection.provider_id.to_string(),
            })?;

        if !provider.is_active {
            return Err(Error::Conflict {
                message: format!("provider {} is not active", provider.name),
            });
        }
    }
    Ok(())
}

/// List the caller's proxy keys.
#[utoipa::path(
    get,
    path = "/keys",
    tag = "keys",
    responses(
        (status = 200, description = "List of keys", body = [KeyResponse]),
        (status = 401, description = "Unauthorized"),
    )
)]
pub async fn list_keys(State(state): State<AppState>, user: AuthUser) -> Result<Json<Vec<KeyResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let keys = ProxyKeys::new(&mut conn).list_for_user(user.id).await?;
    Ok(Json(keys.into_iter().map(KeyResponse::from).collect()))
}

/// Create a proxy key.
///
/// The only response that ever carries the full key. The key row and its
/// allow-list land in one transaction.
#[utoipa::path(
    post,
    path = "/keys",
    tag = "keys",
    request_body = KeyCreate,
    responses(
        (status = 201, description = "Key created; contains the full key exactly once", body = KeyCreateResponse),
        (status = 400, description = "Invalid key data"),
        (status = 404, description = "Referenced provider not found"),
        (status = 409, description = "Referenced provider is inactive"),
    )
)]
pub async fn create_key(
    State(state): State<AppState>,
    user: AuthUser,
    Json(data): Json<KeyCreate>,
) -> Result<(StatusCode, Json<KeyCreateResponse>)> {
    data.validate()?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    check_selections(&mut tx, user.id, &data.allowed_providers).await?;

    let generated = generate_proxy_key();
    let db_request = ProxyKeyCreateDBRequest {
        user_id: user.id,
        key_hash: generated.hash,
        key_prefix: generated.display_prefix,
        name: data.name,
        expires_at: data.expires_at,
        allowed_providers: data.allowed_providers.into_iter().map(Into::into).collect(),
    };

    let key = ProxyKeys::new(&mut tx).create(&db_request).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok((
        StatusCode::CREATED,
        Json(KeyCreateResponse {
            info: KeyResponse::from(key),
            key: generated.full_key,
        }),
    ))
}

/// Get one proxy key.
#[utoipa::path(
    get,
    path = "/keys/{id}",
    tag = "keys",
    params(("id" = String, Path, description = "Key ID")),
    responses(
        (status = 200, description = "Key", body = KeyResponse),
        (status = 404, description = "Key not found"),
    )
)]
pub async fn get_key(State(state): State<AppState>, Path(id): Path<KeyId>, user: AuthUser) -> Result<Json<KeyResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let key = ProxyKeys::new(&mut conn)
        .get_for_user(user.id, id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Key".to_string(),
            id: id.to_string(),
        })?;

    Ok(Json(KeyResponse::from(key)))
}

/// Update a proxy key; a present `allowed_providers` replaces the whole
/// allow-list.
#[utoipa::path(
    put,
    path = "/keys/{id}",
    tag = "keys",
    params(("id" = String, Path, description = "Key ID")),
    request_body = KeyUpdate,
    responses(
        (status = 200, description = "Updated key", body = KeyResponse),
        (status = 400, description = "Invalid key data"),
        (status = 404, description = "Key not found"),
    )
)]
pub async fn update_key(
    State(state): State<AppState>,
    Path(id): Path<KeyId>,
    user: AuthUser,
    Json(data): Json<KeyUpdate>,
) -> Result<Json<KeyResponse>> {
    data.validate()?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    if let Some(selections) = &data.allowed_providers {
        check_selections(&mut tx, user.id, selections).await?;
    }

    let db_request = ProxyKeyUpdateDBRequest {
        name: data.name,
        is_active: data.is_active,
        expires_at: data.expires_at.map(Some),
        allowed_providers: data
            .allowed_providers
            .map(|selections| selections.into_iter().map(Into::into).collect()),
    };

    let key = ProxyKeys::new(&mut tx).update_for_user(user.id, id, &db_request).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Json(KeyResponse::from(key)))
}

/// Revoke a key without deleting it.
#[utoipa::path(
    post,
    path = "/keys/{id}/revoke",
    tag = "keys",
    params(("id" = String, Path, description = "Key ID")),
    responses(
        (status = 200, description = "Revoked key", body = KeyResponse),
        (status = 404, description = "Key not found"),
        (status = 409, description = "Key already revoked"),
    )
)]
pub async fn revoke_key(State(state): State<AppState>, Path(id): Path<KeyId>, user: AuthUser) -> Result<Json<KeyResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = ProxyKeys::new(&mut conn);

    let key = repo.get_for_user(user.id, id).await?.ok_or_else(|| Error::NotFound {
        resource: "Key".to_string(),
        id: id.to_string(),
    })?;

    if !key.is_active {
        return Err(Error::Conflict {
            message: "key is already revoked".to_string(),
        });
    }

    let key = repo
        .update_for_user(
            user.id,
            id,
            &ProxyKeyUpdateDBRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await?;

    Ok(Json(KeyResponse::from(key)))
}

/// Soft-delete a key (its allow-list rows go with it).
#[utoipa::path(
    delete,
    path = "/keys/{id}",
    tag = "keys",
    params(("id" = String, Path, description = "Key ID")),
    responses(
        (status = 204, description = "Key deleted"),
        (status = 404, description = "Key not found"),
    )
)]
pub async fn delete_key(State(state): State<AppState>, Path(id): Path<KeyId>, user: AuthUser) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let deleted = ProxyKeys::new(&mut conn).soft_delete_for_user(user.id, id).await?;

    if !deleted {
        return Err(Error::NotFound {
            resource: "Key".to_string(),
            id: id.to_string(),
        });
    }

    Ok(StatusCode::NO_CONTENT)
}
