//! Core data models for BackLogus.
//!
//! Catalog rows (games, movies, shows, books) are provider-sourced and shared
//! across users. Library entries are the per-user join rows that point at them.
//! Every surrogate `id` is local to one deployment's store; only provider IDs
//! survive an export/import boundary.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use crate::{Error, Result};

// =============================================================================
// MEDIA KINDS
// =============================================================================

/// The four media kinds tracked by a library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Game,
    Movie,
    Show,
    Book,
}

impl MediaKind {
    pub const ALL: [MediaKind; 4] = [
        MediaKind::Game,
        MediaKind::Movie,
        MediaKind::Show,
        MediaKind::Book,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Game => "game",
            MediaKind::Movie => "movie",
            MediaKind::Show => "show",
            MediaKind::Book => "book",
        }
    }

    /// Plural key used in archive documents (`games`, `movies`, ...).
    pub fn plural(&self) -> &'static str {
        match self {
            MediaKind::Game => "games",
            MediaKind::Movie => "movies",
            MediaKind::Show => "shows",
            MediaKind::Book => "books",
        }
    }

    /// Shared catalog table.
    pub fn catalog_table(&self) -> &'static str {
        self.plural()
    }

    /// Per-user library table.
    pub fn library_table(&self) -> &'static str {
        match self {
            MediaKind::Game => "user_games",
            MediaKind::Movie => "user_movies",
            MediaKind::Show => "user_shows",
            MediaKind::Book => "user_books",
        }
    }

    /// Foreign-key column in the library table.
    pub fn catalog_fk(&self) -> &'static str {
        match self {
            MediaKind::Game => "game_id",
            MediaKind::Movie => "movie_id",
            MediaKind::Show => "show_id",
            MediaKind::Book => "book_id",
        }
    }

    /// Unique external provider ID column in the catalog table.
    pub fn provider_column(&self) -> &'static str {
        match self {
            MediaKind::Game => "igdb_id",
            MediaKind::Movie | MediaKind::Show => "tmdb_id",
            MediaKind::Book => "hardcover_id",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value per media kind, used for summary counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    pub games: usize,
    pub movies: usize,
    pub shows: usize,
    pub books: usize,
}

impl KindCounts {
    pub fn get(&self, kind: MediaKind) -> usize {
        match kind {
            MediaKind::Game => self.games,
            MediaKind::Movie => self.movies,
            MediaKind::Show => self.shows,
            MediaKind::Book => self.books,
        }
    }

    pub fn get_mut(&mut self, kind: MediaKind) -> &mut usize {
        match kind {
            MediaKind::Game => &mut self.games,
            MediaKind::Movie => &mut self.movies,
            MediaKind::Show => &mut self.shows,
            MediaKind::Book => &mut self.books,
        }
    }

    pub fn total(&self) -> usize {
        self.games + self.movies + self.shows + self.books
    }
}

// =============================================================================
// USER TYPES
// =============================================================================

/// User profile as exported. The password hash is never part of this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub id: i64,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    pub timezone: Option<String>,
    pub theme_preference: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Mutable profile fields restored from an archive. Email is deliberately absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    pub timezone: Option<String>,
    pub theme_preference: Option<String>,
}

impl From<&UserProfile> for ProfileUpdate {
    fn from(p: &UserProfile) -> Self {
        Self {
            first_name: p.first_name.clone(),
            last_name: p.last_name.clone(),
            avatar_url: p.avatar_url.clone(),
            timezone: p.timezone.clone(),
            theme_preference: p.theme_preference.clone(),
        }
    }
}

/// Request to register a new account.
#[derive(Debug, Clone)]
pub struct CreateUserRequest {
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Per-user, per-provider secret bundle. Exported verbatim, secrets included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ApiCredential {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub user_id: i64,
    pub provider: String,
    pub api_key: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

// =============================================================================
// CATALOG TYPES
// =============================================================================

/// Shared game metadata keyed by IGDB ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: i64,
    pub igdb_id: i64,
    pub name: String,
    pub cover_url: Option<String>,
    pub banner_url: Option<String>,
    pub release_date: Option<NaiveDate>,
    #[serde(default)]
    pub genres: Json<Vec<String>>,
    #[serde(default)]
    pub platforms: Json<Vec<String>>,
    pub summary: Option<String>,
    pub developer: Option<String>,
    pub publisher: Option<String>,
    #[serde(default)]
    pub screenshots: Json<Vec<String>>,
    pub rating: Option<f64>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Shared movie metadata keyed by TMDB ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    pub id: i64,
    pub tmdb_id: i64,
    pub name: String,
    pub original_title: Option<String>,
    pub summary: Option<String>,
    pub cover_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub release_date: Option<NaiveDate>,
    #[serde(default)]
    pub genres: Json<Vec<String>>,
    pub director: Option<String>,
    #[serde(default)]
    pub cast: Json<Vec<String>>,
    pub runtime: Option<i64>,
    pub rating: Option<f64>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Shared TV show metadata keyed by TMDB ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Show {
    pub id: i64,
    pub tmdb_id: i64,
    pub name: String,
    pub original_name: Option<String>,
    pub summary: Option<String>,
    pub cover_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub first_air_date: Option<NaiveDate>,
    pub last_air_date: Option<NaiveDate>,
    #[serde(default)]
    pub genres: Json<Vec<String>>,
    #[serde(default)]
    pub networks: Json<Vec<String>>,
    #[serde(default)]
    pub cast: Json<Vec<String>>,
    pub seasons: Option<i64>,
    pub episodes: Option<i64>,
    pub rating: Option<f64>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Shared book metadata keyed by Hardcover ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: i64,
    pub hardcover_id: i64,
    pub title: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub pages: Option<i64>,
    #[serde(default)]
    pub authors: Json<Vec<String>>,
    #[serde(default)]
    pub genres: Json<Vec<String>>,
    pub series_name: Option<String>,
    pub series_position: Option<f64>,
    pub average_rating: Option<f64>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Behavior shared by all catalog row types.
pub trait CatalogItem {
    const KIND: MediaKind;

    /// Store-local surrogate ID.
    fn id(&self) -> i64;

    /// External provider ID, the de-duplication key.
    fn provider_id(&self) -> i64;
}

impl CatalogItem for Game {
    const KIND: MediaKind = MediaKind::Game;

    fn id(&self) -> i64 {
        self.id
    }

    fn provider_id(&self) -> i64 {
        self.igdb_id
    }
}

impl CatalogItem for Movie {
    const KIND: MediaKind = MediaKind::Movie;

    fn id(&self) -> i64 {
        self.id
    }

    fn provider_id(&self) -> i64 {
        self.tmdb_id
    }
}

impl CatalogItem for Show {
    const KIND: MediaKind = MediaKind::Show;

    fn id(&self) -> i64 {
        self.id
    }

    fn provider_id(&self) -> i64 {
        self.tmdb_id
    }
}

impl CatalogItem for Book {
    const KIND: MediaKind = MediaKind::Book;

    fn id(&self) -> i64 {
        self.id
    }

    fn provider_id(&self) -> i64 {
        self.hardcover_id
    }
}

// =============================================================================
// LIBRARY TYPES
// =============================================================================

/// Consumption status of a library entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LibraryStatus {
    Backlog,
    Active,
    Paused,
    Completed,
    Dropped,
}

impl LibraryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryStatus::Backlog => "BACKLOG",
            LibraryStatus::Active => "ACTIVE",
            LibraryStatus::Paused => "PAUSED",
            LibraryStatus::Completed => "COMPLETED",
            LibraryStatus::Dropped => "DROPPED",
        }
    }
}

impl FromStr for LibraryStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "BACKLOG" => Ok(LibraryStatus::Backlog),
            "ACTIVE" => Ok(LibraryStatus::Active),
            "PAUSED" => Ok(LibraryStatus::Paused),
            "COMPLETED" => Ok(LibraryStatus::Completed),
            "DROPPED" => Ok(LibraryStatus::Dropped),
            other => Err(Error::InvalidInput(format!(
                "Unknown library status: {}",
                other
            ))),
        }
    }
}

/// One-tap review attached to a library entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuickReview {
    Positive,
    Neutral,
    Negative,
}

impl QuickReview {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuickReview::Positive => "POSITIVE",
            QuickReview::Neutral => "NEUTRAL",
            QuickReview::Negative => "NEGATIVE",
        }
    }
}

impl FromStr for QuickReview {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "POSITIVE" => Ok(QuickReview::Positive),
            "NEUTRAL" => Ok(QuickReview::Neutral),
            "NEGATIVE" => Ok(QuickReview::Negative),
            other => Err(Error::InvalidInput(format!("Unknown quick review: {}", other))),
        }
    }
}

/// A user's personal record for one catalog item.
///
/// The same shape is used for all four kinds; kind-specific progress fields
/// are `None` where they do not apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryEntry {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub user_id: i64,
    #[serde(alias = "gameId", alias = "movieId", alias = "showId", alias = "bookId")]
    pub catalog_item_id: i64,
    pub status: LibraryStatus,
    pub rating: Option<f64>,
    #[serde(default)]
    pub quick_review: Option<QuickReview>,
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_season: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_episode: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_page: Option<i64>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// A library entry joined with the catalog row it references.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryItem<C> {
    pub entry: LibraryEntry,
    pub catalog: C,
}
