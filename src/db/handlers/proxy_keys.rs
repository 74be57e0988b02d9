//! Database repository for proxy keys and their allow-lists.

use crate::db::errors::{DbError, Result};
use crate::db::models::providers::ProviderDBResponse;
use crate::db::models::proxy_keys::{
    AllowedProviderCreate, KeyAllowedProvider, ProxyKeyCreateDBRequest, ProxyKeyDBResponse, ProxyKeyUpdateDBRequest,
};
use crate::types::{abbrev_uuid, KeyId, ProviderId, UserId};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection};
use std::collections::HashMap;
use tracing::instrument;

// Key row as stored; the hash stays inside this module.
#[derive(Debug, Clone, FromRow)]
struct ProxyKeyRow {
    pub id: KeyId,
    pub user_id: UserId,
    pub key_prefix: String,
    pub name: String,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct AllowRow {
    pub provider_id: ProviderId,
    pub models: Json<Vec<String>>,
}

pub struct ProxyKeys<'c> {
    db: &'c mut PgConnection,
}

impl<'c> ProxyKeys<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Insert the key row plus its allow-list entries. Run inside a
    /// transaction owned by the caller so the key never exists without its
    /// allow-list.
    #[instrument(skip(self, request), fields(name = %request.name), err)]
    pub async fn create(&mut self, request: &ProxyKeyCreateDBRequest) -> Result<ProxyKeyDBResponse> {
        let row = sqlx::query_as::<_, ProxyKeyRow>(
            r#"
            INSERT INTO proxy_keys (user_id, key_hash, key_prefix, name, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(request.user_id)
        .bind(&request.key_hash)
        .bind(&request.key_prefix)
        .bind(&request.name)
        .bind(request.expires_at)
        .fetch_one(&mut *self.db)
        .await?;

        self.insert_allowed(row.id, &request.allowed_providers).await?;

        let allowed = self.load_allowed(row.id).await?;
        Ok(assemble(row, allowed))
    }

    #[instrument(skip(self), fields(key_id = %abbrev_uuid(&id)), err)]
    pub async fn get_for_user(&mut self, user_id: UserId, id: KeyId) -> Result<Option<ProxyKeyDBResponse>> {
        let row = sqlx::query_as::<_, ProxyKeyRow>(
            "SELECT * FROM proxy_keys WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *self.db)
        .await?;

        match row {
            Some(row) => {
                let allowed = self.load_allowed(row.id).await?;
                Ok(Some(assemble(row, allowed)))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self), err)]
    pub async fn list_for_user(&mut self, user_id: UserId) -> Result<Vec<ProxyKeyDBResponse>> {
        let rows = sqlx::query_as::<_, ProxyKeyRow>(
            "SELECT * FROM proxy_keys WHERE user_id = $1 AND deleted_at IS NULL ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;

        let mut responses = Vec::with_capacity(rows.len());
        for row in rows {
            let allowed = self.load_allowed(row.id).await?;
            responses.push(assemble(row, allowed));
        }
        Ok(responses)
    }

    /// Lookup by SHA-256 digest of the presented key. One row by unique
    /// index; the allow-list comes back eagerly populated for routing.
    #[instrument(skip_all, err)]
    pub async fn find_by_hash(&mut self, key_hash: &str) -> Result<Option<ProxyKeyDBResponse>> {
        let row = sqlx::query_as::<_, ProxyKeyRow>(
            "SELECT * FROM proxy_keys WHERE key_hash = $1 AND deleted_at IS NULL",
        )
        .bind(key_hash)
        .fetch_optional(&mut *self.db)
        .await?;

        match row {
            Some(row) => {
                let allowed = self.load_allowed(row.id).await?;
                Ok(Some(assemble(row, allowed)))
            }
            None => Ok(None),
        }
    }

    /// Advisory last-used stamp. A single unconditional UPDATE so concurrent
    /// validations of the same key never contend on a read-modify-write.
    #[instrument(skip(self), fields(key_id = %abbrev_uuid(&id)), err)]
    pub async fn touch_last_used(&mut self, id: KeyId) -> Result<()> {
        sqlx::query("UPDATE proxy_keys SET last_used_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }

    #[instrument(skip(self, request), fields(key_id = %abbrev_uuid(&id)), err)]
    pub async fn update_for_user(
        &mut self,
        user_id: UserId,
        id: KeyId,
        request: &ProxyKeyUpdateDBRequest,
    ) -> Result<ProxyKeyDBResponse> {
        let row = sqlx::query_as::<_, ProxyKeyRow>(
            r#"
            UPDATE proxy_keys SET
                name = COALESCE($3, name),
                is_active = COALESCE($4, is_active),
                expires_at = CASE WHEN $5 THEN $6 ELSE expires_at END,
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&request.name)
        .bind(request.is_active)
        .bind(request.expires_at.is_some())
        .bind(request.expires_at.clone().flatten())
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        if let Some(allowed) = &request.allowed_providers {
            self.replace_allowed(row.id, allowed).await?;
        }

        let allowed = self.load_allowed(row.id).await?;
        Ok(assemble(row, allowed))
    }

    /// Soft-delete the key and drop its allow-list rows.
    #[instrument(skip(self), fields(key_id = %abbrev_uuid(&id)), err)]
    pub async fn soft_delete_for_user(&mut self, user_id: UserId, id: KeyId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE proxy_keys SET deleted_at = NOW(), updated_at = NOW()
             WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(user_id)
        .execute(&mut *self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM key_allowed_providers WHERE proxy_key_id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(true)
    }

    async fn insert_allowed(&mut self, key_id: KeyId, entries: &[AllowedProviderCreate]) -> Result<()> {
        for (position, entry) in entries.iter().enumerate() {
            sqlx::query(
                "INSERT INTO key_allowed_providers (proxy_key_id, provider_id, models, position)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(key_id)
            .bind(entry.provider_id)
            .bind(Json(&entry.models))
            .bind(position as i32)
            .execute(&mut *self.db)
            .await?;
        }
        Ok(())
    }

    async fn replace_allowed(&mut self, key_id: KeyId, entries: &[AllowedProviderCreate]) -> Result<()> {
        sqlx::query("DELETE FROM key_allowed_providers WHERE proxy_key_id = $1")
            .bind(key_id)
            .execute(&mut *self.db)
            .await?;

        self.insert_allowed(key_id, entries).await
    }

    /// Load the allow-list in insertion order with provider rows attached.
    /// Entries whose provider has been soft-deleted drop out here.
    async fn load_allowed(&mut self, key_id: KeyId) -> Result<Vec<KeyAllowedProvider>> {
        let rows = sqlx::query_as::<_, AllowRow>(
            "SELECT provider_id, models FROM key_allowed_providers
             WHERE proxy_key_id = $1 ORDER BY position, created_at",
        )
        .bind(key_id)
        .fetch_all(&mut *self.db)
        .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<ProviderId> = rows.iter().map(|r| r.provider_id).collect();
        let providers = sqlx::query_as::<_, ProviderDBResponse>(
            "SELECT * FROM providers WHERE id = ANY($1) AND deleted_at IS NULL",
        )
        .bind(&ids)
        .fetch_all(&mut *self.db)
        .await?;

        let by_id: HashMap<ProviderId, ProviderDBResponse> =
            providers.into_iter().map(|p| (p.id, p)).collect();

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                by_id.get(&row.provider_id).cloned().map(|provider| KeyAllowedProvider {
                    provider_id: row.provider_id,
                    models: row.models.0,
                    provider,
                })
            })
            .collect())
    }
}

fn assemble(row: ProxyKeyRow, allowed_providers: Vec<KeyAllowedProvider>) -> ProxyKeyDBResponse {
    ProxyKeyDBResponse {
        id: row.id,
        user_id: row.user_id,
        key_prefix: row.key_prefix,
        name: row.name,
        is_active: row.is_active,
        last_used_at: row.last_used_at,
        expires_at: row.expires_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
        allowed_providers,
    }
}
