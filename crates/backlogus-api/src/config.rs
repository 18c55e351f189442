//! Server configuration loaded from environment variables.

use std::time::Duration;

use backlogus_db::{PoolConfig, RestoreBudget};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://backlogus.db";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_IMAGE_CACHE_DIR: &str = "./cache/images";
pub const DEFAULT_MAX_UPLOAD_MB: usize = 500;
pub const DEFAULT_IMPORT_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_TX_BASE_SECS: u64 = 60;
pub const DEFAULT_TX_PER_ITEM_MS: u64 = 50;
pub const DEFAULT_IMAGE_RESTORE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_DB_BUSY_TIMEOUT_SECS: u64 = 30;

/// Runtime configuration for the API server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub image_cache_dir: String,
    /// Upper bound on an import upload, in bytes.
    pub max_upload_bytes: usize,
    /// Request timeout for the import route.
    pub import_timeout: Duration,
    pub restore_budget: RestoreBudget,
    /// How long the post-commit image restore may hold the response.
    pub image_restore_timeout: Duration,
    pub db_max_connections: u32,
    pub db_busy_timeout: Duration,
    /// Empty means CORS is not enabled.
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ServerConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Invalid numbers fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Self {
            database_url: string("DATABASE_URL", DEFAULT_DATABASE_URL),
            host: string("HOST", DEFAULT_HOST),
            port: parse_or(&lookup, "PORT", DEFAULT_PORT),
            image_cache_dir: string("IMAGE_CACHE_DIR", DEFAULT_IMAGE_CACHE_DIR),
            max_upload_bytes: parse_or(&lookup, "BACKUP_MAX_UPLOAD_MB", DEFAULT_MAX_UPLOAD_MB)
                .saturating_mul(1024 * 1024),
            import_timeout: Duration::from_secs(parse_or(
                &lookup,
                "BACKUP_IMPORT_TIMEOUT_SECS",
                DEFAULT_IMPORT_TIMEOUT_SECS,
            )),
            restore_budget: RestoreBudget::new(
                Duration::from_secs(parse_or(&lookup, "BACKUP_TX_BASE_SECS", DEFAULT_TX_BASE_SECS)),
                Duration::from_millis(parse_or(
                    &lookup,
                    "BACKUP_TX_PER_ITEM_MS",
                    DEFAULT_TX_PER_ITEM_MS,
                )),
            ),
            image_restore_timeout: Duration::from_secs(parse_or(
                &lookup,
                "IMAGE_RESTORE_TIMEOUT_SECS",
                DEFAULT_IMAGE_RESTORE_TIMEOUT_SECS,
            )),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            db_busy_timeout: Duration::from_secs(parse_or(
                &lookup,
                "DB_BUSY_TIMEOUT_SECS",
                DEFAULT_DB_BUSY_TIMEOUT_SECS,
            )),
            cors_allowed_origins: lookup("CORS_ALLOWED_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Pool settings derived from this configuration.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new()
            .max_connections(self.db_max_connections)
            .busy_timeout(self.db_busy_timeout)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "Invalid configuration value, using default");
                default
            }
        },
        None => default,
    }
}
