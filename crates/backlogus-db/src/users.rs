//! User repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Sqlite, Transaction};

use backlogus_core::{
    CreateUserRequest, Error, ProfileUpdate, Result, UserProfile, UserRepository,
};

const PROFILE_COLUMNS: &str = "id, email, first_name, last_name, avatar_url, timezone, \
                               theme_preference, created_at, updated_at";

/// SQLite implementation of UserRepository.
#[derive(Clone)]
pub struct SqliteUserRepository {
    pool: Pool<Sqlite>,
}

impl SqliteUserRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create(&self, req: CreateUserRequest) -> Result<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO users (email, password_hash, first_name, last_name, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&req.email)
        .bind(&req.password_hash)
        .bind(&req.first_name)
        .bind(&req.last_name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.last_insert_rowid())
    }

    async fn get_profile(&self, user_id: i64) -> Result<UserProfile> {
        sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound(format!("User {} not found", user_id)))
    }

    async fn update_profile(&self, user_id: i64, update: &ProfileUpdate) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        self.update_profile_tx(&mut tx, user_id, update).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn exists(&self, user_id: i64) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(found.is_some())
    }
}

/// Transaction-aware variants used by the backup snapshot and restore.
impl SqliteUserRepository {
    pub async fn get_profile_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        user_id: i64,
    ) -> Result<UserProfile> {
        sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound(format!("User {} not found", user_id)))
    }

    /// Overwrite the mutable profile fields. Email and password hash are never written here.
    pub async fn update_profile_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        user_id: i64,
        update: &ProfileUpdate,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE users
             SET first_name = ?, last_name = ?, avatar_url = ?, timezone = ?,
                 theme_preference = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.avatar_url)
        .bind(&update.timezone)
        .bind(&update.theme_preference)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }
}
