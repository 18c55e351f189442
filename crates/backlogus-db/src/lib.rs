//! # backlogus-db
//!
//! SQLite data layer for BackLogus.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for users, credentials, catalogs and libraries
//! - The backup repository (user snapshot and transactional restore)
//! - A filesystem image cache
//!
//! ## Example
//!
//! ```rust,ignore
//! use backlogus_db::{Database, RestoreBudget};
//!
//! let db = Database::connect("sqlite://backlogus.db").await?;
//! db.migrate().await?;
//!
//! let snapshot = db.backup.snapshot(user_id).await?;
//! ```

pub mod backup;
pub mod catalog;
pub mod credentials;
pub mod image_cache;
pub mod library;
pub mod pool;
pub mod users;

// Test fixtures for integration tests (temp-file databases, fakes)
#[cfg(feature = "test-fixtures")]
pub mod test_fixtures;

// Re-export core types
pub use backlogus_core::*;

pub use backup::{RestoreBudget, SqliteBackupRepository};
pub use catalog::{CatalogRecord, CatalogUpsert, SqliteCatalogRepository};
pub use credentials::SqliteCredentialRepository;
pub use image_cache::FilesystemImageCache;
pub use library::SqliteLibraryRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use users::SqliteUserRepository;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Sqlite>,
    /// User accounts and profiles.
    pub users: SqliteUserRepository,
    /// Third-party API credentials.
    pub credentials: SqliteCredentialRepository,
    /// Shared catalog rows.
    pub catalog: SqliteCatalogRepository,
    /// Per-user library entries.
    pub library: SqliteLibraryRepository,
    /// Whole-user snapshot and restore.
    pub backup: SqliteBackupRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Sqlite>) -> Self {
        Self {
            users: SqliteUserRepository::new(pool.clone()),
            credentials: SqliteCredentialRepository::new(pool.clone()),
            catalog: SqliteCatalogRepository::new(pool.clone()),
            library: SqliteLibraryRepository::new(pool.clone()),
            backup: SqliteBackupRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Sqlite> {
        &self.pool
    }
}
