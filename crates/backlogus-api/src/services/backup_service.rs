//! Backup export and import orchestration.
//!
//! Export reads a snapshot, gathers cached images and encodes the archive.
//! Import decodes and version-checks the archive, runs the transactional
//! restore and then restores images on a best-effort basis.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{error, info, warn};

use backlogus_core::{
    check_archive_compatibility, read_archive, write_archive, CompatibilityResult,
    DecodedArchive, Error, ExportBundle, ImageCache, ImportSummary, Result,
};
use backlogus_db::{Database, RestoreBudget};

/// Service for whole-user backup export and import.
pub struct BackupService {
    db: Database,
    images: Arc<dyn ImageCache>,
    budget: RestoreBudget,
    image_restore_timeout: Duration,
}

impl BackupService {
    pub fn new(
        db: Database,
        images: Arc<dyn ImageCache>,
        budget: RestoreBudget,
        image_restore_timeout: Duration,
    ) -> Self {
        Self {
            db,
            images,
            budget,
            image_restore_timeout,
        }
    }

    /// Produce the zip archive for `user_id`.
    pub async fn export(&self, user_id: i64) -> Result<Vec<u8>> {
        let start = Instant::now();
        let result = self.export_inner(user_id).await;
        match &result {
            Ok(bytes) => info!(
                subsystem = "backup",
                component = "backup_service",
                op = "export",
                user_id,
                size_bytes = bytes.len(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Backup exported"
            ),
            Err(e) => error!(
                subsystem = "backup",
                component = "backup_service",
                op = "export",
                user_id,
                error = %e,
                "Backup export failed"
            ),
        }
        result
    }

    async fn export_inner(&self, user_id: i64) -> Result<Vec<u8>> {
        let (snapshot, images) = tokio::join!(self.db.backup.snapshot(user_id), self.images.get_all());
        let snapshot = snapshot?;

        // The database is the backup; images can be fetched again from their source URLs.
        let images = images.unwrap_or_else(|e| {
            warn!(
                subsystem = "backup",
                component = "backup_service",
                user_id,
                error = %e,
                "Could not read image cache, exporting without images"
            );
            Vec::new()
        });

        let bundle = ExportBundle::from_snapshot(snapshot, images, Utc::now());
        for (kind, provider_id) in bundle.dump.catalog_items.unsafe_provider_ids() {
            warn!(
                subsystem = "backup",
                component = "backup_service",
                kind = %kind,
                provider_id,
                "Provider ID exceeds 2^53 - 1; readers using IEEE-754 numbers will lose precision"
            );
        }

        tokio::task::spawn_blocking(move || write_archive(&bundle))
            .await
            .map_err(|e| Error::Internal(format!("Archive writer task failed: {}", e)))?
    }

    /// Decode `bytes` and replace `user_id`'s library with its contents.
    pub async fn import(&self, user_id: i64, bytes: Vec<u8>) -> Result<ImportSummary> {
        let start = Instant::now();
        let result = self.import_inner(user_id, bytes).await;
        match &result {
            Ok(summary) => info!(
                subsystem = "backup",
                component = "backup_service",
                op = "import",
                user_id,
                library_entries = summary.library_entries.total(),
                skipped_entries = summary.skipped_entries.total(),
                images = summary.images,
                duration_ms = start.elapsed().as_millis() as u64,
                "Backup imported"
            ),
            Err(e) => error!(
                subsystem = "backup",
                component = "backup_service",
                op = "import",
                user_id,
                error = %e,
                "Backup import failed"
            ),
        }
        result
    }

    async fn import_inner(&self, user_id: i64, bytes: Vec<u8>) -> Result<ImportSummary> {
        let archive = tokio::task::spawn_blocking(move || read_archive(&bytes))
            .await
            .map_err(|e| Error::Internal(format!("Archive reader task failed: {}", e)))??;

        check_version(&archive)?;

        let mut summary = self.db.backup.restore(user_id, &archive, self.budget).await?;
        summary.images = self.restore_images(user_id, &archive).await;
        Ok(summary)
    }

    /// Push archived images into the cache. Never fails the import.
    async fn restore_images(&self, user_id: i64, archive: &DecodedArchive) -> usize {
        if archive.images.is_empty() {
            return 0;
        }

        match tokio::time::timeout(self.image_restore_timeout, self.images.restore(&archive.images))
            .await
        {
            Ok(Ok(written)) => written,
            Ok(Err(e)) => {
                warn!(
                    subsystem = "backup",
                    component = "backup_service",
                    user_id,
                    images = archive.images.len(),
                    error = %e,
                    "Image restore failed; images will be re-fetched on demand"
                );
                0
            }
            Err(_) => {
                warn!(
                    subsystem = "backup",
                    component = "backup_service",
                    user_id,
                    images = archive.images.len(),
                    timeout_ms = self.image_restore_timeout.as_millis() as u64,
                    "Image restore timed out; images will be re-fetched on demand"
                );
                0
            }
        }
    }
}

/// Reject archives from an incompatible format version.
fn check_version(archive: &DecodedArchive) -> Result<()> {
    let version = &archive.dump.metadata.version;
    match check_archive_compatibility(version).into_result()? {
        CompatibilityResult::NewerMinor { warnings, .. } => {
            for warning in warnings {
                warn!(
                    subsystem = "backup",
                    component = "backup_service",
                    archive_version = %version,
                    "{}",
                    warning
                );
            }
        }
        CompatibilityResult::SameMajor { archive_version } => {
            info!(
                subsystem = "backup",
                component = "backup_service",
                archive_version = %archive_version,
                "Importing archive written by another revision of the format"
            );
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use backlogus_db::test_fixtures::{
        FailingImageCache, MemoryImageCache, TestDataBuilder, TestDatabase,
    };
    use backlogus_db::LibraryStatus;

    fn service(db: &Database, images: Arc<dyn ImageCache>) -> BackupService {
        BackupService::new(
            db.clone(),
            images,
            RestoreBudget::default(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_export_then_import_restores_images() {
        let test_db = TestDatabase::new().await;
        let data = TestDataBuilder::new(&test_db.db, "a@example.com")
            .with_game(100, LibraryStatus::Completed, Some("done"))
            .build()
            .await;

        let source = Arc::new(MemoryImageCache::with_images(&[("co100.jpg", b"jpeg".as_slice())]));
        let bytes = service(&test_db.db, source).export(data.user_id).await.unwrap();

        let target = Arc::new(MemoryImageCache::new());
        let summary = service(&test_db.db, target.clone())
            .import(data.user_id, bytes)
            .await
            .unwrap();

        assert_eq!(summary.library_entries.games, 1);
        assert_eq!(summary.images, 1);
        assert_eq!(target.filenames(), vec!["co100.jpg"]);
    }

    #[tokio::test]
    async fn test_export_survives_unreadable_image_cache() {
        let test_db = TestDatabase::new().await;
        let data = TestDataBuilder::new(&test_db.db, "a@example.com")
            .with_movie(55, LibraryStatus::Backlog, None)
            .build()
            .await;

        let bytes = service(&test_db.db, Arc::new(FailingImageCache))
            .export(data.user_id)
            .await
            .unwrap();
        let archive = read_archive(&bytes).unwrap();
        assert!(archive.images.is_empty());
        assert_eq!(archive.dump.library_entries.movies.len(), 1);
    }

    #[tokio::test]
    async fn test_image_restore_failure_does_not_fail_import() {
        let test_db = TestDatabase::new().await;
        let data = TestDataBuilder::new(&test_db.db, "a@example.com")
            .with_game(100, LibraryStatus::Active, None)
            .build()
            .await;
        let source = Arc::new(MemoryImageCache::with_images(&[("co100.jpg", b"jpeg".as_slice())]));
        let bytes = service(&test_db.db, source).export(data.user_id).await.unwrap();

        let summary = service(&test_db.db, Arc::new(FailingImageCache))
            .import(data.user_id, bytes)
            .await
            .unwrap();
        assert_eq!(summary.library_entries.games, 1);
        assert_eq!(summary.images, 0);
    }

    #[tokio::test]
    async fn test_slow_image_restore_is_abandoned() {
        let test_db = TestDatabase::new().await;
        let data = TestDataBuilder::new(&test_db.db, "a@example.com").build().await;
        let source = Arc::new(MemoryImageCache::with_images(&[("co1.jpg", b"x".as_slice())]));
        let bytes = service(&test_db.db, source).export(data.user_id).await.unwrap();

        let slow = Arc::new(MemoryImageCache::new().with_restore_delay(Duration::from_secs(10)));
        let service = BackupService::new(
            test_db.db.clone(),
            slow.clone(),
            RestoreBudget::default(),
            Duration::from_millis(20),
        );
        let summary = service.import(data.user_id, bytes).await.unwrap();
        assert_eq!(summary.images, 0);
        assert!(slow.filenames().is_empty());
    }

    #[tokio::test]
    async fn test_incompatible_major_version_is_rejected_before_restore() {
        let test_db = TestDatabase::new().await;
        let data = TestDataBuilder::new(&test_db.db, "a@example.com")
            .with_game(100, LibraryStatus::Completed, Some("keep"))
            .build()
            .await;

        let snapshot = test_db.db.backup.snapshot(data.user_id).await.unwrap();
        let mut bundle = ExportBundle::from_snapshot(snapshot, Vec::new(), Utc::now());
        bundle.dump.metadata.version = "3.0.0".to_string();
        bundle.dump.library_entries.games.clear();
        let bytes = write_archive(&bundle).unwrap();

        let err = service(&test_db.db, Arc::new(MemoryImageCache::new()))
            .import(data.user_id, bytes)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(
            test_db
                .db
                .library
                .count_for_user(backlogus_db::MediaKind::Game, data.user_id)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_newer_minor_version_is_imported() {
        let test_db = TestDatabase::new().await;
        let data = TestDataBuilder::new(&test_db.db, "a@example.com")
            .with_book(427, LibraryStatus::Paused, None)
            .build()
            .await;

        let snapshot = test_db.db.backup.snapshot(data.user_id).await.unwrap();
        let mut bundle = ExportBundle::from_snapshot(snapshot, Vec::new(), Utc::now());
        bundle.dump.metadata.version = "2.4.0".to_string();
        let bytes = write_archive(&bundle).unwrap();

        let summary = service(&test_db.db, Arc::new(MemoryImageCache::new()))
            .import(data.user_id, bytes)
            .await
            .unwrap();
        assert_eq!(summary.library_entries.books, 1);
    }

    #[tokio::test]
    async fn test_export_unknown_user_is_not_found() {
        let test_db = TestDatabase::new().await;
        let err = service(&test_db.db, Arc::new(MemoryImageCache::new()))
            .export(999)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
