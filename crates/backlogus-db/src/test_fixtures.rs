//! Test fixtures for database integration tests.
//!
//! Provides a migrated temp-file SQLite database, builders for users and
//! library contents, and in-memory image cache fakes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use backlogus_db::test_fixtures::{TestDatabase, TestDataBuilder};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let test_db = TestDatabase::new().await;
//!     let data = TestDataBuilder::new(&test_db.db, "a@example.com")
//!         .with_game(100, LibraryStatus::Completed, Some("loved it"))
//!         .build()
//!         .await;
//!     // ...
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::types::Json;
use tempfile::TempDir;

use crate::{
    ApiCredential, Book, CachedImage, CatalogRecord, CreateUserRequest, CredentialRepository,
    Database, Error, Game, ImageCache, LibraryEntry, LibraryStatus, MediaKind, Movie, PoolConfig,
    Result, Show, UserRepository,
};

/// Migrated SQLite database in a temporary directory, removed on drop.
pub struct TestDatabase {
    pub db: Database,
    pub pool: sqlx::SqlitePool,
    dir: TempDir,
}

impl TestDatabase {
    /// Create and migrate a fresh database.
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let url = format!("sqlite://{}", dir.path().join("test.db").display());

        let config = PoolConfig::new()
            .max_connections(4)
            .busy_timeout(Duration::from_secs(5));
        let db = Database::connect_with_config(&url, config)
            .await
            .expect("Failed to create test database pool");
        db.migrate().await.expect("Failed to run migrations");

        Self {
            pool: db.pool.clone(),
            db,
            dir,
        }
    }

    /// Directory holding the database file; free for other temp files.
    pub fn dir(&self) -> &std::path::Path {
        self.dir.path()
    }
}

// =============================================================================
// SAMPLE ROWS
// =============================================================================

pub fn sample_game(igdb_id: i64) -> Game {
    let now = Utc::now();
    Game {
        id: 0,
        igdb_id,
        name: format!("Game {}", igdb_id),
        cover_url: Some(format!(
            "https://images.igdb.com/igdb/image/upload/t_cover_big/co{}.jpg",
            igdb_id
        )),
        banner_url: None,
        release_date: NaiveDate::from_ymd_opt(2019, 5, 28),
        genres: Json(vec!["Adventure".to_string(), "Puzzle".to_string()]),
        platforms: Json(vec!["PC".to_string()]),
        summary: Some("An exploration game.".to_string()),
        developer: Some("Mobius Digital".to_string()),
        publisher: Some("Annapurna".to_string()),
        screenshots: Json(vec![]),
        rating: Some(92.5),
        created_at: now,
        updated_at: now,
    }
}

pub fn sample_movie(tmdb_id: i64) -> Movie {
    let now = Utc::now();
    Movie {
        id: 0,
        tmdb_id,
        name: format!("Movie {}", tmdb_id),
        original_title: None,
        summary: Some("A film.".to_string()),
        cover_url: Some(format!("https://image.tmdb.org/t/p/w500/m{}.jpg", tmdb_id)),
        backdrop_url: None,
        release_date: NaiveDate::from_ymd_opt(1999, 3, 31),
        genres: Json(vec!["Science Fiction".to_string()]),
        director: Some("Someone".to_string()),
        cast: Json(vec!["Actor A".to_string(), "Actor B".to_string()]),
        runtime: Some(136),
        rating: Some(8.2),
        created_at: now,
        updated_at: now,
    }
}

pub fn sample_show(tmdb_id: i64) -> Show {
    let now = Utc::now();
    Show {
        id: 0,
        tmdb_id,
        name: format!("Show {}", tmdb_id),
        original_name: None,
        summary: None,
        cover_url: Some(format!("https://image.tmdb.org/t/p/w500/s{}.png", tmdb_id)),
        backdrop_url: None,
        first_air_date: NaiveDate::from_ymd_opt(2008, 1, 20),
        last_air_date: NaiveDate::from_ymd_opt(2013, 9, 29),
        genres: Json(vec!["Drama".to_string()]),
        networks: Json(vec!["AMC".to_string()]),
        cast: Json(vec![]),
        seasons: Some(5),
        episodes: Some(62),
        rating: Some(9.5),
        created_at: now,
        updated_at: now,
    }
}

pub fn sample_book(hardcover_id: i64) -> Book {
    let now = Utc::now();
    Book {
        id: 0,
        hardcover_id,
        title: format!("Book {}", hardcover_id),
        subtitle: None,
        description: None,
        cover_url: None,
        release_date: None,
        pages: Some(412),
        authors: Json(vec!["Author".to_string()]),
        genres: Json(vec![]),
        series_name: Some("Series".to_string()),
        series_position: Some(1.0),
        average_rating: Some(4.1),
        created_at: now,
        updated_at: now,
    }
}

pub fn sample_entry(status: LibraryStatus, notes: Option<&str>) -> LibraryEntry {
    let now = Utc::now();
    LibraryEntry {
        id: 0,
        user_id: 0,
        catalog_item_id: 0,
        status,
        rating: Some(4.0),
        quick_review: None,
        notes: notes.map(str::to_string),
        platform: None,
        current_season: None,
        current_episode: None,
        current_page: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn sample_credential(provider: &str) -> ApiCredential {
    let now = Utc::now();
    ApiCredential {
        id: 0,
        user_id: 0,
        provider: provider.to_string(),
        api_key: Some(format!("{}-key", provider)),
        client_id: Some(format!("{}-client", provider)),
        client_secret: Some(format!("{}-secret", provider)),
        access_token: None,
        refresh_token: None,
        token_expires_at: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

// =============================================================================
// DATA BUILDER
// =============================================================================

enum PendingItem {
    Game(Game),
    Movie(Movie),
    Show(Show),
    Book(Book),
}

/// Builder for a user with library contents.
pub struct TestDataBuilder<'a> {
    db: &'a Database,
    email: String,
    items: Vec<(PendingItem, LibraryEntry)>,
    credentials: Vec<ApiCredential>,
}

/// IDs created by [`TestDataBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct TestData {
    pub user_id: i64,
    /// (kind, catalog surrogate ID, library entry ID) in insertion order.
    pub entries: Vec<(MediaKind, i64, i64)>,
}

impl TestData {
    pub fn catalog_ids(&self, kind: MediaKind) -> Vec<i64> {
        self.entries
            .iter()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, catalog_id, _)| *catalog_id)
            .collect()
    }
}

impl<'a> TestDataBuilder<'a> {
    pub fn new(db: &'a Database, email: &str) -> Self {
        Self {
            db,
            email: email.to_string(),
            items: Vec::new(),
            credentials: Vec::new(),
        }
    }

    pub fn with_game(mut self, igdb_id: i64, status: LibraryStatus, notes: Option<&str>) -> Self {
        let mut entry = sample_entry(status, notes);
        entry.platform = Some("PC".to_string());
        self.items
            .push((PendingItem::Game(sample_game(igdb_id)), entry));
        self
    }

    pub fn with_movie(mut self, tmdb_id: i64, status: LibraryStatus, notes: Option<&str>) -> Self {
        self.items.push((
            PendingItem::Movie(sample_movie(tmdb_id)),
            sample_entry(status, notes),
        ));
        self
    }

    pub fn with_show(mut self, tmdb_id: i64, status: LibraryStatus, notes: Option<&str>) -> Self {
        let mut entry = sample_entry(status, notes);
        entry.current_season = Some(2);
        entry.current_episode = Some(5);
        self.items
            .push((PendingItem::Show(sample_show(tmdb_id)), entry));
        self
    }

    pub fn with_book(mut self, hardcover_id: i64, status: LibraryStatus, notes: Option<&str>) -> Self {
        let mut entry = sample_entry(status, notes);
        entry.current_page = Some(120);
        self.items
            .push((PendingItem::Book(sample_book(hardcover_id)), entry));
        self
    }

    pub fn with_credential(mut self, provider: &str) -> Self {
        self.credentials.push(sample_credential(provider));
        self
    }

    pub async fn build(self) -> TestData {
        let user_id = self
            .db
            .users
            .create(CreateUserRequest {
                email: self.email.clone(),
                password_hash: "$argon2id$v=19$test".to_string(),
                first_name: Some("Test".to_string()),
                last_name: Some("User".to_string()),
            })
            .await
            .expect("Failed to create test user");

        for credential in &self.credentials {
            self.db
                .credentials
                .upsert(user_id, credential)
                .await
                .expect("Failed to create test credential");
        }

        let mut entries = Vec::new();
        for (item, entry) in &self.items {
            let (kind, catalog_id) = match item {
                PendingItem::Game(c) => (MediaKind::Game, self.insert_catalog(c).await),
                PendingItem::Movie(c) => (MediaKind::Movie, self.insert_catalog(c).await),
                PendingItem::Show(c) => (MediaKind::Show, self.insert_catalog(c).await),
                PendingItem::Book(c) => (MediaKind::Book, self.insert_catalog(c).await),
            };
            let entry_id = self
                .db
                .library
                .add(kind, user_id, catalog_id, entry)
                .await
                .expect("Failed to create library entry");
            entries.push((kind, catalog_id, entry_id));
        }

        TestData { user_id, entries }
    }

    async fn insert_catalog<C: CatalogRecord>(&self, item: &C) -> i64 {
        self.db
            .catalog
            .upsert_by_provider_id(item)
            .await
            .expect("Failed to create catalog row")
            .id
    }
}

// =============================================================================
// IMAGE CACHE FAKES
// =============================================================================

/// In-memory [`ImageCache`].
#[derive(Default)]
pub struct MemoryImageCache {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    restore_delay: Option<Duration>,
}

impl MemoryImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_images(images: &[(&str, &[u8])]) -> Self {
        let cache = Self::default();
        if let Ok(mut files) = cache.files.lock() {
            for (name, bytes) in images {
                files.insert(name.to_string(), bytes.to_vec());
            }
        }
        cache
    }

    /// Make `restore` sleep before writing, to exercise time budgets.
    pub fn with_restore_delay(mut self, delay: Duration) -> Self {
        self.restore_delay = Some(delay);
        self
    }

    pub fn filenames(&self) -> Vec<String> {
        self.files
            .lock()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ImageCache for MemoryImageCache {
    async fn cache(&self, url: &str) -> Result<Option<String>> {
        let Some(name) = backlogus_core::filename_for_url(url) else {
            return Ok(None);
        };
        let mut files = self
            .files
            .lock()
            .map_err(|_| Error::Internal("image cache lock poisoned".to_string()))?;
        files.entry(name.clone()).or_insert_with(|| url.as_bytes().to_vec());
        Ok(Some(name))
    }

    async fn get_all(&self) -> Result<Vec<CachedImage>> {
        let files = self
            .files
            .lock()
            .map_err(|_| Error::Internal("image cache lock poisoned".to_string()))?;
        Ok(files
            .iter()
            .map(|(filename, bytes)| CachedImage {
                filename: filename.clone(),
                bytes: bytes.clone(),
            })
            .collect())
    }

    async fn restore(&self, images: &[CachedImage]) -> Result<usize> {
        if let Some(delay) = self.restore_delay {
            tokio::time::sleep(delay).await;
        }
        let mut files = self
            .files
            .lock()
            .map_err(|_| Error::Internal("image cache lock poisoned".to_string()))?;
        for image in images {
            files.insert(image.filename.clone(), image.bytes.clone());
        }
        Ok(images.len())
    }
}

/// [`ImageCache`] whose every operation fails.
#[derive(Default)]
pub struct FailingImageCache;

#[async_trait]
impl ImageCache for FailingImageCache {
    async fn cache(&self, _url: &str) -> Result<Option<String>> {
        Err(Error::Request("image host unreachable".to_string()))
    }

    async fn get_all(&self) -> Result<Vec<CachedImage>> {
        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "cache directory unreadable",
        )))
    }

    async fn restore(&self, _images: &[CachedImage]) -> Result<usize> {
        Err(Error::ImageRestore("disk full".to_string()))
    }
}
