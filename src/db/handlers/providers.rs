//! Database repository for provider configurations.

use crate::db::errors::{DbError, Result};
use crate::db::models::providers::{ProviderCreateDBRequest, ProviderDBResponse, ProviderUpdateDBRequest};
use crate::types::{abbrev_uuid, ProviderId, UserId};
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;

pub struct Providers<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Providers<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(name = %request.name, kind = %request.provider_type), err)]
    pub async fn create(&mut self, request: &ProviderCreateDBRequest) -> Result<ProviderDBResponse> {
        let provider = sqlx::query_as::<_, ProviderDBResponse>(
            r#"
            INSERT INTO providers
                (user_id, name, provider_type, base_url, api_key, refresh_token,
                 is_active, default_model, input_cost_per_million, output_cost_per_million)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(request.user_id)
        .bind(&request.name)
        .bind(request.provider_type)
        .bind(&request.base_url)
        .bind(&request.api_key)
        .bind(&request.refresh_token)
        .bind(request.is_active)
        .bind(&request.default_model)
        .bind(request.input_cost_per_million)
        .bind(request.output_cost_per_million)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(provider)
    }

    #[instrument(skip(self), fields(provider_id = %abbrev_uuid(&id)), err)]
    pub async fn get_for_user(&mut self, user_id: UserId, id: ProviderId) -> Result<Option<ProviderDBResponse>> {
        let provider = sqlx::query_as::<_, ProviderDBResponse>(
            "SELECT * FROM providers WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(provider)
    }

    #[instrument(skip(self), err)]
    pub async fn list_for_user(&mut self, user_id: UserId) -> Result<Vec<ProviderDBResponse>> {
        let providers = sqlx::query_as::<_, ProviderDBResponse>(
            "SELECT * FROM providers WHERE user_id = $1 AND deleted_at IS NULL ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(providers)
    }

    #[instrument(skip(self, request), fields(provider_id = %abbrev_uuid(&id)), err)]
    pub async fn update_for_user(
        &mut self,
        user_id: UserId,
        id: ProviderId,
        request: &ProviderUpdateDBRequest,
    ) -> Result<ProviderDBResponse> {
        let provider = sqlx::query_as::<_, ProviderDBResponse>(
            r#"
            UPDATE providers SET
                name = COALESCE($3, name),
                base_url = COALESCE($4, base_url),
                api_key = COALESCE($5, api_key),
                refresh_token = COALESCE($6, refresh_token),
                is_active = COALESCE($7, is_active),
                default_model = COALESCE($8, default_model),
                input_cost_per_million = COALESCE($9, input_cost_per_million),
                output_cost_per_million = COALESCE($10, output_cost_per_million),
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&request.name)
        .bind(&request.base_url)
        .bind(&request.api_key)
        .bind(&request.refresh_token)
        .bind(request.is_active)
        .bind(&request.default_model)
        .bind(request.input_cost_per_million)
        .bind(request.output_cost_per_million)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(provider)
    }

    /// Soft delete. Allow-list entries pointing at this provider stop
    /// resolving (loads filter on `deleted_at`); usage rows remain.
    #[instrument(skip(self), fields(provider_id = %abbrev_uuid(&id)), err)]
    pub async fn soft_delete_for_user(&mut self, user_id: UserId, id: ProviderId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE providers SET deleted_at = NOW(), updated_at = NOW()
             WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(user_id)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Hard delete, used only to roll back an OAuth-bootstrap create whose
    /// refresh token turned out to be invalid.
    #[instrument(skip(self), fields(provider_id = %abbrev_uuid(&id)), err)]
    pub async fn hard_delete(&mut self, id: ProviderId) -> Result<()> {
        sqlx::query("DELETE FROM providers WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }

    /// Persist a fresh token grant. The refresh token is only replaced when
    /// the token endpoint rotated it.
    #[instrument(skip(self, access_token, refresh_token), fields(provider_id = %abbrev_uuid(&id)), err)]
    pub async fn store_oauth_tokens(
        &mut self,
        id: ProviderId,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE providers SET
                access_token = $2,
                refresh_token = COALESCE($3, refresh_token),
                token_expires_at = $4,
                oauth_connected = TRUE,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .execute(&mut *self.db)
        .await?;

        Ok(())
    }

    /// Clear all OAuth material and the connected flag.
    #[instrument(skip(self), fields(provider_id = %abbrev_uuid(&id)), err)]
    pub async fn clear_oauth(&mut self, id: ProviderId) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE providers SET
                access_token = '',
                refresh_token = '',
                token_expires_at = NULL,
                oauth_connected = FALSE,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&mut *self.db)
        .await?;

        Ok(())
    }
}
