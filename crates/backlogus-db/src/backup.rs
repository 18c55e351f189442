//! Backup repository: user snapshots and transactional restore.
//!
//! Restore replaces one user's library and credentials inside a single
//! transaction. Catalog rows are shared and are only ever added, never
//! deleted or overwritten; archived surrogate IDs are remapped to the IDs of
//! the rows that hold the same provider IDs in this store.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use sqlx::{Pool, Sqlite, Transaction};
use tracing::{debug, info, warn};

use backlogus_core::{
    Book, DecodedArchive, Error, Game, ImportStep, ImportSummary, LibraryEntry, MediaKind, Movie,
    ProfileUpdate, Result, Show, UserRepository, UserSnapshot,
};

use crate::catalog::{CatalogRecord, SqliteCatalogRepository};
use crate::credentials::SqliteCredentialRepository;
use crate::library::SqliteLibraryRepository;
use crate::users::SqliteUserRepository;

/// Default fixed part of the restore time budget.
pub const DEFAULT_RESTORE_BASE_SECS: u64 = 60;

/// Default per-row addition to the restore time budget.
pub const DEFAULT_RESTORE_PER_ITEM_MS: u64 = 50;

/// Time budget for a restore transaction, scaled by the number of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreBudget {
    pub base: Duration,
    pub per_item: Duration,
}

impl Default for RestoreBudget {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(DEFAULT_RESTORE_BASE_SECS),
            per_item: Duration::from_millis(DEFAULT_RESTORE_PER_ITEM_MS),
        }
    }
}

impl RestoreBudget {
    pub fn new(base: Duration, per_item: Duration) -> Self {
        Self { base, per_item }
    }

    /// Total budget for `rows` archived rows.
    pub fn for_rows(&self, rows: usize) -> Duration {
        let rows = u32::try_from(rows).unwrap_or(u32::MAX);
        self.base.saturating_add(self.per_item.saturating_mul(rows))
    }
}

/// Archived surrogate ID -> surrogate ID in this store, per kind.
type IdMap = HashMap<i64, i64>;

fn at(step: ImportStep) -> impl Fn(Error) -> Error {
    move |e| Error::import_failed(step, e)
}

/// SQLite repository for whole-user backup and restore.
#[derive(Clone)]
pub struct SqliteBackupRepository {
    pool: Pool<Sqlite>,
    users: SqliteUserRepository,
    credentials: SqliteCredentialRepository,
    catalog: SqliteCatalogRepository,
    library: SqliteLibraryRepository,
}

impl SqliteBackupRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self {
            users: SqliteUserRepository::new(pool.clone()),
            credentials: SqliteCredentialRepository::new(pool.clone()),
            catalog: SqliteCatalogRepository::new(pool.clone()),
            library: SqliteLibraryRepository::new(pool.clone()),
            pool,
        }
    }

    /// Read one user's profile, credentials and full library.
    ///
    /// Fails with `NotFound` for unknown users. Every read runs inside one
    /// transaction, so the snapshot reflects a single database state even
    /// while other requests write.
    pub async fn snapshot(&self, user_id: i64) -> Result<UserSnapshot> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let profile = self.users.get_profile_tx(&mut tx, user_id).await?;
        let credentials = self.credentials.list_for_user_tx(&mut tx, user_id).await?;
        let games = self.library.list_items_for_user_tx::<Game>(&mut tx, user_id).await?;
        let movies = self.library.list_items_for_user_tx::<Movie>(&mut tx, user_id).await?;
        let shows = self.library.list_items_for_user_tx::<Show>(&mut tx, user_id).await?;
        let books = self.library.list_items_for_user_tx::<Book>(&mut tx, user_id).await?;

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "backup",
            component = "backup_repository",
            op = "snapshot",
            user_id,
            credentials = credentials.len(),
            games = games.len(),
            movies = movies.len(),
            shows = shows.len(),
            books = books.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "User snapshot read"
        );

        Ok(UserSnapshot {
            profile,
            credentials,
            games,
            movies,
            shows,
            books,
        })
    }

    /// Replace `user_id`'s library and credentials with the archive's contents.
    ///
    /// All database work happens in one transaction bounded by `budget`. Any
    /// failure, including running out of time, rolls back completely and is
    /// returned as [`Error::ImportFailed`] naming the step. Images are not
    /// handled here.
    pub async fn restore(
        &self,
        user_id: i64,
        archive: &DecodedArchive,
        budget: RestoreBudget,
    ) -> Result<ImportSummary> {
        if !self.users.exists(user_id).await? {
            return Err(Error::NotFound(format!("User {} not found", user_id)));
        }

        let rows = archive.row_count();
        let limit = budget.for_rows(rows);
        let start = Instant::now();

        info!(
            subsystem = "backup",
            component = "backup_repository",
            op = "restore_start",
            user_id,
            rows,
            budget_ms = limit.as_millis() as u64,
            "Starting transactional restore"
        );

        // Dropping the in-flight transaction on timeout rolls it back.
        let summary = match tokio::time::timeout(limit, self.restore_in_tx(user_id, archive)).await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::import_failed(
                    ImportStep::Timeout,
                    Error::Internal(format!(
                        "restore of {} rows exceeded its {} ms budget",
                        rows,
                        limit.as_millis()
                    )),
                ))
            }
        };

        info!(
            subsystem = "backup",
            component = "backup_repository",
            op = "restore_commit",
            user_id,
            credentials = summary.api_credentials,
            library_entries = summary.library_entries.total(),
            catalog_created = summary.catalog_created.total(),
            catalog_reused = summary.catalog_reused.total(),
            skipped_entries = summary.skipped_entries.total(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Restore committed"
        );
        Ok(summary)
    }

    async fn restore_in_tx(&self, user_id: i64, archive: &DecodedArchive) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();
        let dump = &archive.dump;

        let mut tx = self.pool.begin().await.map_err(|e| Error::import_failed(ImportStep::Begin, e))?;

        // Wipe: the user's own join rows and credentials only
        for kind in MediaKind::ALL {
            let removed = self
                .library
                .delete_for_user_tx(&mut tx, kind, user_id)
                .await
                .map_err(at(ImportStep::Wipe))?;
            debug!(subsystem = "backup", kind = %kind, removed, "Library entries wiped");
        }
        self.credentials
            .delete_for_user_tx(&mut tx, user_id)
            .await
            .map_err(at(ImportStep::Wipe))?;

        // Profile: email and password hash are never touched
        let update = ProfileUpdate::from(&archive.user_data.profile);
        self.users
            .update_profile_tx(&mut tx, user_id, &update)
            .await
            .map_err(at(ImportStep::RestoreProfile))?;
        summary.profile = true;

        for credential in &archive.user_data.api_credentials {
            self.credentials
                .insert_tx(&mut tx, user_id, credential)
                .await
                .map_err(at(ImportStep::RestoreCredentials))?;
            summary.api_credentials += 1;
        }

        let games = self
            .restore_catalog_tx(&mut tx, &dump.catalog_items.games, &mut summary)
            .await?;
        let movies = self
            .restore_catalog_tx(&mut tx, &dump.catalog_items.movies, &mut summary)
            .await?;
        let shows = self
            .restore_catalog_tx(&mut tx, &dump.catalog_items.shows, &mut summary)
            .await?;
        let books = self
            .restore_catalog_tx(&mut tx, &dump.catalog_items.books, &mut summary)
            .await?;

        for (kind, ids) in [
            (MediaKind::Game, &games),
            (MediaKind::Movie, &movies),
            (MediaKind::Show, &shows),
            (MediaKind::Book, &books),
        ] {
            self.restore_library_tx(
                &mut tx,
                kind,
                user_id,
                dump.library_entries.get(kind),
                ids,
                &mut summary,
            )
            .await?;
        }

        tx.commit().await.map_err(|e| Error::import_failed(ImportStep::Commit, e))?;
        Ok(summary)
    }

    /// Upsert archived catalog rows by provider ID and build the ID remap.
    async fn restore_catalog_tx<C: CatalogRecord>(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        items: &[C],
        summary: &mut ImportSummary,
    ) -> Result<IdMap> {
        let mut ids = IdMap::with_capacity(items.len());
        for item in items {
            let outcome = self
                .catalog
                .upsert_by_provider_id_tx(tx, item)
                .await
                .map_err(at(ImportStep::RestoreCatalog))?;
            if outcome.created {
                *summary.catalog_created.get_mut(C::KIND) += 1;
            } else {
                *summary.catalog_reused.get_mut(C::KIND) += 1;
            }
            ids.insert(item.id(), outcome.id);
        }
        Ok(ids)
    }

    /// Recreate library entries against remapped catalog IDs.
    ///
    /// Entries whose catalog row is absent from the archive, or that would
    /// duplicate an entry already restored for the same catalog row, are
    /// skipped and counted.
    async fn restore_library_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        kind: MediaKind,
        user_id: i64,
        entries: &[LibraryEntry],
        ids: &IdMap,
        summary: &mut ImportSummary,
    ) -> Result<()> {
        let mut seen: HashSet<i64> = HashSet::with_capacity(entries.len());
        for entry in entries {
            let Some(&catalog_id) = ids.get(&entry.catalog_item_id) else {
                warn!(
                    subsystem = "backup",
                    component = "backup_repository",
                    kind = %kind,
                    archived_entry_id = entry.id,
                    archived_catalog_id = entry.catalog_item_id,
                    "Skipping library entry whose catalog item is missing from the archive"
                );
                *summary.skipped_entries.get_mut(kind) += 1;
                continue;
            };

            if !seen.insert(catalog_id) {
                warn!(
                    subsystem = "backup",
                    component = "backup_repository",
                    kind = %kind,
                    archived_entry_id = entry.id,
                    catalog_id,
                    "Skipping duplicate library entry for the same catalog item"
                );
                *summary.skipped_entries.get_mut(kind) += 1;
                continue;
            }

            self.library
                .insert_tx(tx, kind, user_id, catalog_id, entry)
                .await
                .map_err(at(ImportStep::RestoreLibrary))?;
            *summary.library_entries.get_mut(kind) += 1;
        }
        Ok(())
    }
}
