//! In-memory shapes of a backup archive.
//!
//! The serde layout of these types is the interoperable archive contract:
//! field names are camelCase and integers are plain JSON numbers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    ApiCredential, Book, CatalogItem, Game, KindCounts, LibraryEntry, LibraryItem, MediaKind,
    Movie, Show, UserProfile,
};

/// Largest integer a double-precision JSON reader represents exactly (2^53 - 1).
pub const MAX_SAFE_JSON_INTEGER: i64 = 9_007_199_254_740_991;

pub const USER_DATA_PATH: &str = "user-data/profile-and-credentials.json";
pub const DUMP_PATH: &str = "database/dump.json";
pub const IMAGES_PREFIX: &str = "images/";
pub const README_PATH: &str = "README.md";

// =============================================================================
// ARCHIVE DOCUMENTS
// =============================================================================

/// Row totals recorded in the manifest, flattened into `metadata`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManifestCounts {
    pub total_games: usize,
    pub total_movies: usize,
    pub total_shows: usize,
    pub total_books: usize,
    pub total_user_games: usize,
    pub total_user_movies: usize,
    pub total_user_shows: usize,
    pub total_user_books: usize,
}

/// The `metadata` block of `database/dump.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupManifest {
    pub export_date: DateTime<Utc>,
    #[serde(alias = "schemaVersion")]
    pub version: String,
    pub user_id: i64,
    #[serde(flatten)]
    pub counts: ManifestCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryEntries {
    pub games: Vec<LibraryEntry>,
    pub movies: Vec<LibraryEntry>,
    pub shows: Vec<LibraryEntry>,
    pub books: Vec<LibraryEntry>,
}

impl LibraryEntries {
    pub fn get(&self, kind: MediaKind) -> &[LibraryEntry] {
        match kind {
            MediaKind::Game => &self.games,
            MediaKind::Movie => &self.movies,
            MediaKind::Show => &self.shows,
            MediaKind::Book => &self.books,
        }
    }

    pub fn len(&self) -> usize {
        MediaKind::ALL.iter().map(|k| self.get(*k).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogItems {
    pub games: Vec<Game>,
    pub movies: Vec<Movie>,
    pub shows: Vec<Show>,
    pub books: Vec<Book>,
}

impl CatalogItems {
    pub fn len(&self) -> usize {
        self.games.len() + self.movies.len() + self.shows.len() + self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Provider IDs a double-based JSON reader would not represent exactly.
    pub fn unsafe_provider_ids(&self) -> Vec<(MediaKind, i64)> {
        fn scan<C: CatalogItem>(items: &[C], out: &mut Vec<(MediaKind, i64)>) {
            out.extend(
                items
                    .iter()
                    .map(CatalogItem::provider_id)
                    .filter(|id| id.unsigned_abs() > MAX_SAFE_JSON_INTEGER as u64)
                    .map(|id| (C::KIND, id)),
            );
        }

        let mut out = Vec::new();
        scan(&self.games, &mut out);
        scan(&self.movies, &mut out);
        scan(&self.shows, &mut out);
        scan(&self.books, &mut out);
        out
    }
}

/// `database/dump.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseDump {
    #[serde(default)]
    pub library_entries: LibraryEntries,
    #[serde(default)]
    pub catalog_items: CatalogItems,
    pub metadata: BackupManifest,
}

/// `user-data/profile-and-credentials.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDataDocument {
    pub profile: UserProfile,
    #[serde(default)]
    pub api_credentials: Vec<ApiCredential>,
}

/// A cached image file, keyed by its URL-derived filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedImage {
    pub filename: String,
    pub bytes: Vec<u8>,
}

// =============================================================================
// EXPORT / IMPORT BUNDLES
// =============================================================================

/// Point-in-time snapshot of one user's data, as read from the store.
#[derive(Debug, Clone)]
pub struct UserSnapshot {
    pub profile: UserProfile,
    pub credentials: Vec<ApiCredential>,
    pub games: Vec<LibraryItem<Game>>,
    pub movies: Vec<LibraryItem<Movie>>,
    pub shows: Vec<LibraryItem<Show>>,
    pub books: Vec<LibraryItem<Book>>,
}

/// Everything the codec writes into one archive.
#[derive(Debug, Clone)]
pub struct ExportBundle {
    pub user_data: UserDataDocument,
    pub dump: DatabaseDump,
    pub images: Vec<CachedImage>,
}

impl ExportBundle {
    /// Assemble a bundle from a store snapshot plus the cached images.
    pub fn from_snapshot(
        snapshot: UserSnapshot,
        images: Vec<CachedImage>,
        export_date: DateTime<Utc>,
    ) -> Self {
        let user_id = snapshot.profile.id;

        let (library_games, catalog_games) = split_items(snapshot.games);
        let (library_movies, catalog_movies) = split_items(snapshot.movies);
        let (library_shows, catalog_shows) = split_items(snapshot.shows);
        let (library_books, catalog_books) = split_items(snapshot.books);

        let library_entries = LibraryEntries {
            games: library_games,
            movies: library_movies,
            shows: library_shows,
            books: library_books,
        };
        let catalog_items = CatalogItems {
            games: catalog_games,
            movies: catalog_movies,
            shows: catalog_shows,
            books: catalog_books,
        };

        let counts = ManifestCounts {
            total_games: catalog_items.games.len(),
            total_movies: catalog_items.movies.len(),
            total_shows: catalog_items.shows.len(),
            total_books: catalog_items.books.len(),
            total_user_games: library_entries.games.len(),
            total_user_movies: library_entries.movies.len(),
            total_user_shows: library_entries.shows.len(),
            total_user_books: library_entries.books.len(),
        };

        ExportBundle {
            user_data: UserDataDocument {
                profile: snapshot.profile,
                api_credentials: snapshot.credentials,
            },
            dump: DatabaseDump {
                library_entries,
                catalog_items,
                metadata: BackupManifest {
                    export_date,
                    version: super::CURRENT_ARCHIVE_VERSION.to_string(),
                    user_id,
                    counts,
                },
            },
            images,
        }
    }
}

/// Split joined rows into library entries and the distinct catalog rows they reference.
fn split_items<C: CatalogItem + Clone>(items: Vec<LibraryItem<C>>) -> (Vec<LibraryEntry>, Vec<C>) {
    let mut catalog: BTreeMap<i64, C> = BTreeMap::new();
    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        catalog.entry(item.catalog.id()).or_insert(item.catalog);
        entries.push(item.entry);
    }
    (entries, catalog.into_values().collect())
}

/// A fully decoded archive, ready for validation and import.
#[derive(Debug, Clone)]
pub struct DecodedArchive {
    pub user_data: UserDataDocument,
    pub dump: DatabaseDump,
    pub images: Vec<CachedImage>,
}

impl DecodedArchive {
    /// Rows the restore transaction will touch, used to size its time budget.
    pub fn row_count(&self) -> usize {
        self.user_data.api_credentials.len()
            + self.dump.catalog_items.len()
            + self.dump.library_entries.len()
    }
}

/// Counts reported after a successful import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub profile: bool,
    pub api_credentials: usize,
    pub catalog_created: KindCounts,
    pub catalog_reused: KindCounts,
    pub library_entries: KindCounts,
    pub skipped_entries: KindCounts,
    pub images: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LibraryStatus;
    use sqlx::types::Json;

    fn game(id: i64, igdb_id: i64) -> Game {
        Game {
            id,
            igdb_id,
            name: format!("Game {}", igdb_id),
            cover_url: None,
            banner_url: None,
            release_date: None,
            genres: Json(vec![]),
            platforms: Json(vec![]),
            summary: None,
            developer: None,
            publisher: None,
            screenshots: Json(vec![]),
            rating: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn entry(id: i64, catalog_item_id: i64) -> LibraryEntry {
        LibraryEntry {
            id,
            user_id: 1,
            catalog_item_id,
            status: LibraryStatus::Backlog,
            rating: None,
            quick_review: None,
            notes: None,
            platform: None,
            current_season: None,
            current_episode: None,
            current_page: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn profile() -> UserProfile {
        UserProfile {
            id: 1,
            email: "owner@example.com".to_string(),
            first_name: Some("Ada".to_string()),
            last_name: None,
            avatar_url: None,
            timezone: None,
            theme_preference: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_from_snapshot_counts_match_arrays() {
        let snapshot = UserSnapshot {
            profile: profile(),
            credentials: vec![],
            games: vec![
                LibraryItem { entry: entry(1, 10), catalog: game(10, 100) },
                LibraryItem { entry: entry(2, 20), catalog: game(20, 200) },
            ],
            movies: vec![],
            shows: vec![],
            books: vec![],
        };

        let bundle = ExportBundle::from_snapshot(snapshot, vec![], Utc::now());
        let meta = &bundle.dump.metadata;
        assert_eq!(meta.version, crate::backup::CURRENT_ARCHIVE_VERSION);
        assert_eq!(meta.user_id, 1);
        assert_eq!(meta.counts.total_games, 2);
        assert_eq!(meta.counts.total_user_games, 2);
        assert_eq!(bundle.dump.catalog_items.games.len(), 2);
        assert_eq!(bundle.dump.library_entries.games.len(), 2);
    }

    #[test]
    fn test_manifest_flattens_counts_and_accepts_schema_version() {
        let json = r#"{
            "exportDate": "2026-01-02T03:04:05Z",
            "schemaVersion": "2.0.0",
            "userId": 4,
            "totalGames": 3,
            "totalUserGames": 3
        }"#;
        let manifest: BackupManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.version, "2.0.0");
        assert_eq!(manifest.counts.total_games, 3);
        assert_eq!(manifest.counts.total_books, 0);

        let out = serde_json::to_value(&manifest).unwrap();
        assert_eq!(out["version"], "2.0.0");
        assert_eq!(out["totalUserGames"], 3);
    }

    #[test]
    fn test_unsafe_provider_ids_flags_large_values() {
        let items = CatalogItems {
            games: vec![game(1, 100), game(2, MAX_SAFE_JSON_INTEGER + 1)],
            ..Default::default()
        };
        assert_eq!(
            items.unsafe_provider_ids(),
            vec![(MediaKind::Game, MAX_SAFE_JSON_INTEGER + 1)]
        );
    }

    #[test]
    fn test_large_provider_id_survives_serde_exactly() {
        let original = game(1, i64::MAX);
        let json = serde_json::to_string(&original).unwrap();
        let back: Game = serde_json::from_str(&json).unwrap();
        assert_eq!(back.igdb_id, i64::MAX);
    }

    #[test]
    fn test_import_summary_serializes_camel_case() {
        let mut summary = ImportSummary {
            profile: true,
            api_credentials: 2,
            ..Default::default()
        };
        summary.skipped_entries.games = 1;
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["apiCredentials"], 2);
        assert_eq!(value["skippedEntries"]["games"], 1);
        assert_eq!(value["catalogCreated"]["books"], 0);
    }
}
