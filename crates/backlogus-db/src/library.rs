//! Per-user library repository (user_games, user_movies, user_shows, user_books).

use std::collections::HashMap;

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite, Transaction};

use backlogus_core::{
    CatalogItem, Error, LibraryEntry, LibraryItem, LibraryStatus, MediaKind, QuickReview, Result,
};

use crate::catalog::{CatalogRecord, SqliteCatalogRepository};

/// Kind-specific progress columns present in each library table.
fn progress_columns(kind: MediaKind) -> &'static [&'static str] {
    match kind {
        MediaKind::Game => &["platform"],
        MediaKind::Movie => &[],
        MediaKind::Show => &["current_season", "current_episode"],
        MediaKind::Book => &["current_page"],
    }
}

const ALL_PROGRESS_COLUMNS: [&str; 4] = [
    "platform",
    "current_season",
    "current_episode",
    "current_page",
];

fn select_columns(kind: MediaKind) -> String {
    let present = progress_columns(kind);
    let progress: Vec<String> = ALL_PROGRESS_COLUMNS
        .iter()
        .map(|col| {
            if present.contains(col) {
                col.to_string()
            } else {
                format!("NULL AS {}", col)
            }
        })
        .collect();

    format!(
        "id, user_id, {} AS catalog_item_id, status, rating, quick_review, notes, {}, \
         created_at, updated_at",
        kind.catalog_fk(),
        progress.join(", ")
    )
}

fn row_to_entry(row: &SqliteRow) -> Result<LibraryEntry> {
    let status: String = row.try_get("status").map_err(Error::Database)?;
    let quick_review: Option<String> = row.try_get("quick_review").map_err(Error::Database)?;

    Ok(LibraryEntry {
        id: row.try_get("id").map_err(Error::Database)?,
        user_id: row.try_get("user_id").map_err(Error::Database)?,
        catalog_item_id: row.try_get("catalog_item_id").map_err(Error::Database)?,
        status: status.parse::<LibraryStatus>()?,
        rating: row.try_get("rating").map_err(Error::Database)?,
        quick_review: quick_review
            .as_deref()
            .map(str::parse::<QuickReview>)
            .transpose()?,
        notes: row.try_get("notes").map_err(Error::Database)?,
        platform: row.try_get("platform").map_err(Error::Database)?,
        current_season: row.try_get("current_season").map_err(Error::Database)?,
        current_episode: row.try_get("current_episode").map_err(Error::Database)?,
        current_page: row.try_get("current_page").map_err(Error::Database)?,
        created_at: row.try_get("created_at").map_err(Error::Database)?,
        updated_at: row.try_get("updated_at").map_err(Error::Database)?,
    })
}

/// SQLite repository for library entries of all four kinds.
#[derive(Clone)]
pub struct SqliteLibraryRepository {
    pool: Pool<Sqlite>,
    catalog: SqliteCatalogRepository,
}

impl SqliteLibraryRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self {
            catalog: SqliteCatalogRepository::new(pool.clone()),
            pool,
        }
    }

    /// All entries of one kind owned by a user, oldest first.
    pub async fn list_for_user(&self, kind: MediaKind, user_id: i64) -> Result<Vec<LibraryEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE user_id = ? ORDER BY id",
            select_columns(kind),
            kind.library_table()
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(row_to_entry).collect()
    }

    /// All entries of one kind owned by a user, each joined with its catalog row.
    pub async fn list_items_for_user<C: CatalogRecord>(
        &self,
        user_id: i64,
    ) -> Result<Vec<LibraryItem<C>>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let items = self.list_items_for_user_tx::<C>(&mut tx, user_id).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(items)
    }

    /// Number of entries of one kind owned by a user.
    pub async fn count_for_user(&self, kind: MediaKind, user_id: i64) -> Result<i64> {
        sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE user_id = ?",
            kind.library_table()
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)
    }

    /// Add a catalog item to a user's library with fresh timestamps.
    pub async fn add(
        &self,
        kind: MediaKind,
        user_id: i64,
        catalog_item_id: i64,
        entry: &LibraryEntry,
    ) -> Result<i64> {
        let now = Utc::now();
        let stamped = LibraryEntry {
            created_at: now,
            updated_at: now,
            ..entry.clone()
        };
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let id = self
            .insert_tx(&mut tx, kind, user_id, catalog_item_id, &stamped)
            .await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(id)
    }
}

/// Transaction-aware variants used by the backup snapshot and restore.
impl SqliteLibraryRepository {
    pub async fn list_for_user_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        kind: MediaKind,
        user_id: i64,
    ) -> Result<Vec<LibraryEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE user_id = ? ORDER BY id",
            select_columns(kind),
            kind.library_table()
        ))
        .bind(user_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(row_to_entry).collect()
    }

    /// Entries and their catalog rows, read under the caller's transaction so
    /// both queries see the same state.
    pub async fn list_items_for_user_tx<C: CatalogRecord>(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        user_id: i64,
    ) -> Result<Vec<LibraryItem<C>>> {
        let entries = self.list_for_user_tx(tx, C::KIND, user_id).await?;
        let catalog: HashMap<i64, C> = self
            .catalog
            .list_for_user_tx::<C>(tx, user_id)
            .await?
            .into_iter()
            .map(|c| (c.id(), c))
            .collect();

        entries
            .into_iter()
            .map(|entry| {
                let item = catalog.get(&entry.catalog_item_id).cloned().ok_or_else(|| {
                    Error::Internal(format!(
                        "{} library entry {} references missing catalog row {}",
                        C::KIND,
                        entry.id,
                        entry.catalog_item_id
                    ))
                })?;
                Ok(LibraryItem {
                    entry,
                    catalog: item,
                })
            })
            .collect()
    }

    /// Delete every entry of one kind owned by `user_id`. Catalog rows are untouched.
    pub async fn delete_for_user_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        kind: MediaKind,
        user_id: i64,
    ) -> Result<u64> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE user_id = ?",
            kind.library_table()
        ))
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    /// Insert an entry for `user_id` pointing at `catalog_item_id`.
    ///
    /// The entry's own `id`, `user_id` and `catalog_item_id` are ignored; its
    /// timestamps are kept. Progress fields that do not apply to `kind` are dropped.
    pub async fn insert_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        kind: MediaKind,
        user_id: i64,
        catalog_item_id: i64,
        entry: &LibraryEntry,
    ) -> Result<i64> {
        let progress = progress_columns(kind);
        let mut columns = vec![
            "user_id",
            kind.catalog_fk(),
            "status",
            "rating",
            "quick_review",
            "notes",
        ];
        columns.extend_from_slice(progress);
        columns.extend_from_slice(&["created_at", "updated_at"]);
        let placeholders = vec!["?"; columns.len()].join(", ");

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            kind.library_table(),
            columns.join(", "),
            placeholders
        );

        let mut query = sqlx::query(&sql)
            .bind(user_id)
            .bind(catalog_item_id)
            .bind(entry.status.as_str())
            .bind(entry.rating)
            .bind(entry.quick_review.map(|q| q.as_str()))
            .bind(&entry.notes);

        query = match kind {
            MediaKind::Game => query.bind(&entry.platform),
            MediaKind::Movie => query,
            MediaKind::Show => query
                .bind(entry.current_season)
                .bind(entry.current_episode),
            MediaKind::Book => query.bind(entry.current_page),
        };

        let result = query
            .bind(entry.created_at)
            .bind(entry.updated_at)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;

        Ok(result.last_insert_rowid())
    }
}
