//! API credential repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Sqlite, Transaction};

use backlogus_core::{ApiCredential, CredentialRepository, Error, Result};

const CREDENTIAL_COLUMNS: &str = "id, user_id, provider, api_key, client_id, client_secret, \
                                  access_token, refresh_token, token_expires_at, is_active, \
                                  created_at, updated_at";

/// SQLite implementation of CredentialRepository.
#[derive(Clone)]
pub struct SqliteCredentialRepository {
    pool: Pool<Sqlite>,
}

impl SqliteCredentialRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialRepository for SqliteCredentialRepository {
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<ApiCredential>> {
        sqlx::query_as::<_, ApiCredential>(&format!(
            "SELECT {} FROM api_credentials WHERE user_id = ? ORDER BY provider",
            CREDENTIAL_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    async fn upsert(&self, user_id: i64, credential: &ApiCredential) -> Result<i64> {
        let now = Utc::now();
        sqlx::query_scalar(
            "INSERT INTO api_credentials
                 (user_id, provider, api_key, client_id, client_secret, access_token,
                  refresh_token, token_expires_at, is_active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id, provider) DO UPDATE SET
                 api_key = excluded.api_key,
                 client_id = excluded.client_id,
                 client_secret = excluded.client_secret,
                 access_token = excluded.access_token,
                 refresh_token = excluded.refresh_token,
                 token_expires_at = excluded.token_expires_at,
                 is_active = excluded.is_active,
                 updated_at = excluded.updated_at
             RETURNING id",
        )
        .bind(user_id)
        .bind(&credential.provider)
        .bind(&credential.api_key)
        .bind(&credential.client_id)
        .bind(&credential.client_secret)
        .bind(&credential.access_token)
        .bind(&credential.refresh_token)
        .bind(credential.token_expires_at)
        .bind(credential.is_active)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)
    }
}

/// Transaction-aware variants used by the backup snapshot and restore.
impl SqliteCredentialRepository {
    pub async fn list_for_user_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        user_id: i64,
    ) -> Result<Vec<ApiCredential>> {
        sqlx::query_as::<_, ApiCredential>(&format!(
            "SELECT {} FROM api_credentials WHERE user_id = ? ORDER BY provider",
            CREDENTIAL_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::Database)
    }

    /// Delete every credential owned by `user_id`. Returns the number removed.
    pub async fn delete_for_user_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        user_id: i64,
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM api_credentials WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    /// Insert an archived credential under `user_id`.
    ///
    /// The archived surrogate ID and owner are discarded; storage assigns a fresh ID.
    /// Archived timestamps are kept.
    pub async fn insert_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        user_id: i64,
        credential: &ApiCredential,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO api_credentials
                 (user_id, provider, api_key, client_id, client_secret, access_token,
                  refresh_token, token_expires_at, is_active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(&credential.provider)
        .bind(&credential.api_key)
        .bind(&credential.client_id)
        .bind(&credential.client_secret)
        .bind(&credential.access_token)
        .bind(&credential.refresh_token)
        .bind(credential.token_expires_at)
        .bind(credential.is_active)
        .bind(credential.created_at)
        .bind(credential.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(result.last_insert_rowid())
    }
}
