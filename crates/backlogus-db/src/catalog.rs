//! Shared catalog repository (games, movies, shows, books).
//!
//! Catalog rows are de-duplicated by provider ID and may be referenced by
//! many users' libraries, so nothing here deletes them.

use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{FromRow, Pool, Sqlite, Transaction};
use tracing::debug;

use backlogus_core::{Book, CatalogItem, Error, Game, Movie, Result, Show};

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Storage mapping for one catalog kind.
pub trait CatalogRecord:
    CatalogItem + for<'r> FromRow<'r, SqliteRow> + Send + Sync + Unpin + Clone
{
    /// Columns written on insert, in bind order. `id` is assigned by storage.
    const INSERT_COLUMNS: &'static [&'static str];

    /// Bind [`Self::INSERT_COLUMNS`] in order.
    fn bind_insert<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q>;

    /// `SELECT` list matching the struct's fields.
    fn select_columns() -> String {
        let mut cols = vec!["id"];
        cols.extend_from_slice(Self::INSERT_COLUMNS);
        cols.join(", ")
    }
}

impl CatalogRecord for Game {
    const INSERT_COLUMNS: &'static [&'static str] = &[
        "igdb_id",
        "name",
        "cover_url",
        "banner_url",
        "release_date",
        "genres",
        "platforms",
        "summary",
        "developer",
        "publisher",
        "screenshots",
        "rating",
        "created_at",
        "updated_at",
    ];

    fn bind_insert<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.igdb_id)
            .bind(&self.name)
            .bind(&self.cover_url)
            .bind(&self.banner_url)
            .bind(self.release_date)
            .bind(&self.genres)
            .bind(&self.platforms)
            .bind(&self.summary)
            .bind(&self.developer)
            .bind(&self.publisher)
            .bind(&self.screenshots)
            .bind(self.rating)
            .bind(self.created_at)
            .bind(self.updated_at)
    }
}

impl CatalogRecord for Movie {
    const INSERT_COLUMNS: &'static [&'static str] = &[
        "tmdb_id",
        "name",
        "original_title",
        "summary",
        "cover_url",
        "backdrop_url",
        "release_date",
        "genres",
        "director",
        "\"cast\"",
        "runtime",
        "rating",
        "created_at",
        "updated_at",
    ];

    fn bind_insert<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.tmdb_id)
            .bind(&self.name)
            .bind(&self.original_title)
            .bind(&self.summary)
            .bind(&self.cover_url)
            .bind(&self.backdrop_url)
            .bind(self.release_date)
            .bind(&self.genres)
            .bind(&self.director)
            .bind(&self.cast)
            .bind(self.runtime)
            .bind(self.rating)
            .bind(self.created_at)
            .bind(self.updated_at)
    }
}

impl CatalogRecord for Show {
    const INSERT_COLUMNS: &'static [&'static str] = &[
        "tmdb_id",
        "name",
        "original_name",
        "summary",
        "cover_url",
        "backdrop_url",
        "first_air_date",
        "last_air_date",
        "genres",
        "networks",
        "\"cast\"",
        "seasons",
        "episodes",
        "rating",
        "created_at",
        "updated_at",
    ];

    fn bind_insert<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.tmdb_id)
            .bind(&self.name)
            .bind(&self.original_name)
            .bind(&self.summary)
            .bind(&self.cover_url)
            .bind(&self.backdrop_url)
            .bind(self.first_air_date)
            .bind(self.last_air_date)
            .bind(&self.genres)
            .bind(&self.networks)
            .bind(&self.cast)
            .bind(self.seasons)
            .bind(self.episodes)
            .bind(self.rating)
            .bind(self.created_at)
            .bind(self.updated_at)
    }
}

impl CatalogRecord for Book {
    const INSERT_COLUMNS: &'static [&'static str] = &[
        "hardcover_id",
        "title",
        "subtitle",
        "description",
        "cover_url",
        "release_date",
        "pages",
        "authors",
        "genres",
        "series_name",
        "series_position",
        "average_rating",
        "created_at",
        "updated_at",
    ];

    fn bind_insert<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.hardcover_id)
            .bind(&self.title)
            .bind(&self.subtitle)
            .bind(&self.description)
            .bind(&self.cover_url)
            .bind(self.release_date)
            .bind(self.pages)
            .bind(&self.authors)
            .bind(&self.genres)
            .bind(&self.series_name)
            .bind(self.series_position)
            .bind(self.average_rating)
            .bind(self.created_at)
            .bind(self.updated_at)
    }
}

/// Outcome of [`SqliteCatalogRepository::upsert_by_provider_id_tx`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogUpsert {
    /// Surrogate ID of the row now holding this provider ID.
    pub id: i64,
    /// `true` if the row was inserted, `false` if an existing row was reused.
    pub created: bool,
}

/// SQLite repository for the shared catalog tables.
#[derive(Clone)]
pub struct SqliteCatalogRepository {
    pool: Pool<Sqlite>,
}

impl SqliteCatalogRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Insert a catalog row, or return the existing one with the same provider ID.
    ///
    /// Existing rows are never overwritten. Used when adding items from a
    /// metadata provider search.
    pub async fn upsert_by_provider_id<C: CatalogRecord>(&self, item: &C) -> Result<CatalogUpsert> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let outcome = self.upsert_by_provider_id_tx(&mut tx, item).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(outcome)
    }

    /// Fetch a catalog row by its provider ID.
    pub async fn find_by_provider_id<C: CatalogRecord>(&self, provider_id: i64) -> Result<Option<C>> {
        let kind = C::KIND;
        sqlx::query_as::<_, C>(&format!(
            "SELECT {} FROM {} WHERE {} = ?",
            C::select_columns(),
            kind.catalog_table(),
            kind.provider_column()
        ))
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }

    /// Count rows in a catalog table.
    pub async fn count<C: CatalogRecord>(&self) -> Result<i64> {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", C::KIND.catalog_table()))
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }
}

/// Transaction-aware variants used by the backup snapshot and restore.
impl SqliteCatalogRepository {
    /// Catalog rows referenced by a user's library, in surrogate ID order.
    pub async fn list_for_user_tx<C: CatalogRecord>(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        user_id: i64,
    ) -> Result<Vec<C>> {
        let kind = C::KIND;
        sqlx::query_as::<_, C>(&format!(
            "SELECT {cols} FROM {table} WHERE id IN \
             (SELECT {fk} FROM {library} WHERE user_id = ?) ORDER BY id",
            cols = C::select_columns(),
            table = kind.catalog_table(),
            fk = kind.catalog_fk(),
            library = kind.library_table(),
        ))
        .bind(user_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::Database)
    }

    /// Insert-if-absent keyed on the provider ID, then re-read the winning row.
    ///
    /// The unique index on the provider column makes concurrent imports of the
    /// same item converge on one row: a losing insert is a no-op and the
    /// follow-up read returns the existing ID.
    pub async fn upsert_by_provider_id_tx<C: CatalogRecord>(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        item: &C,
    ) -> Result<CatalogUpsert> {
        let kind = C::KIND;
        let placeholders = vec!["?"; C::INSERT_COLUMNS.len()].join(", ");
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) DO NOTHING",
            kind.catalog_table(),
            C::INSERT_COLUMNS.join(", "),
            placeholders,
            kind.provider_column()
        );

        let result = item
            .bind_insert(sqlx::query(&insert))
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        let created = result.rows_affected() > 0;

        let id: i64 = sqlx::query_scalar(&format!(
            "SELECT id FROM {} WHERE {} = ?",
            kind.catalog_table(),
            kind.provider_column()
        ))
        .bind(item.provider_id())
        .fetch_one(&mut **tx)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "catalog",
            kind = %kind,
            provider_id = item.provider_id(),
            archived_id = item.id(),
            id,
            created,
            "Catalog row resolved"
        );

        Ok(CatalogUpsert { id, created })
    }
}
