//! Filesystem-backed image cache.
//!
//! Images are stored flat under one directory, named by
//! [`filename_for_url`]. The directory is shared by every user of the
//! deployment.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use backlogus_core::file_safety::{filename_for_url, is_image_filename, sanitize_image_filename};
use backlogus_core::{CachedImage, Error, ImageCache, Result};

/// Default number of retries after the first download attempt.
pub const DEFAULT_DOWNLOAD_RETRIES: u32 = 2;

/// Default per-request download timeout.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 15;

const USER_AGENT: &str = concat!("BackLogus/", env!("CARGO_PKG_VERSION"), " (Image Cache)");

/// Image cache that stores files in a local directory.
pub struct FilesystemImageCache {
    base_path: PathBuf,
    client: reqwest::Client,
    retries: u32,
    base_backoff: Duration,
}

impl FilesystemImageCache {
    /// Create a cache rooted at `base_path`. The directory is created on first write.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();

        Self {
            base_path: base_path.into(),
            client,
            retries: DEFAULT_DOWNLOAD_RETRIES,
            base_backoff: Duration::from_secs(1),
        }
    }

    /// Override the retry policy.
    pub fn with_retries(mut self, retries: u32, base_backoff: Duration) -> Self {
        self.retries = retries;
        self.base_backoff = base_backoff;
        self
    }

    /// Local path for a cached filename.
    pub fn local_path(&self, filename: &str) -> PathBuf {
        self.base_path.join(filename)
    }

    /// Ensure the cache directory exists.
    pub async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.base_path).await?;
        Ok(())
    }

    /// Atomic write: temp file + rename, permissions 0644.
    ///
    /// The temp name has a fixed length so any name that fits the target fits
    /// the temp file too.
    async fn write_file(&self, filename: &str, data: &[u8]) -> Result<()> {
        let full_path = self.local_path(filename);
        let temp_path = self
            .base_path
            .join(format!(".{}.tmp", Uuid::new_v4().simple()));

        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            warn!(temp_path = %temp_path.display(), error = %e, "image_cache: File::create failed");
            e
        })?;
        if let Err(e) = file.write_all(data).await {
            drop(file);
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&temp_path, &full_path).await {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "image_cache: rename failed");
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        Ok(())
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Request(format!("HTTP {} for {}", response.status(), url)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Request(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[async_trait]
impl ImageCache for FilesystemImageCache {
    async fn cache(&self, url: &str) -> Result<Option<String>> {
        let Some(filename) = filename_for_url(url) else {
            return Ok(None);
        };

        if fs::try_exists(self.local_path(&filename)).await? {
            return Ok(Some(filename));
        }
        self.ensure_dir().await?;

        for attempt in 0..=self.retries {
            match self.download(url).await {
                Ok(data) => {
                    self.write_file(&filename, &data).await?;
                    debug!(
                        subsystem = "images",
                        component = "image_cache",
                        op = "cache",
                        filename = %filename,
                        size = data.len(),
                        attempt,
                        "Image cached"
                    );
                    return Ok(Some(filename));
                }
                Err(e) if attempt < self.retries => {
                    let delay = self.backoff(attempt);
                    debug!(
                        subsystem = "images",
                        component = "image_cache",
                        url = %url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Image download failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(
                        subsystem = "images",
                        component = "image_cache",
                        url = %url,
                        attempts = attempt + 1,
                        error = %e,
                        "Failed to cache image"
                    );
                }
            }
        }

        Ok(None)
    }

    async fn get_all(&self) -> Result<Vec<CachedImage>> {
        let mut dir = match fs::read_dir(&self.base_path).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut images = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let Ok(filename) = entry.file_name().into_string() else {
                continue;
            };
            if filename.starts_with('.') || !is_image_filename(&filename) {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let bytes = fs::read(entry.path()).await?;
            images.push(CachedImage { filename, bytes });
        }

        images.sort_by(|a, b| a.filename.cmp(&b.filename));
        debug!(
            subsystem = "images",
            component = "image_cache",
            op = "get_all",
            count = images.len(),
            "Listed cached images"
        );
        Ok(images)
    }

    async fn restore(&self, images: &[CachedImage]) -> Result<usize> {
        if images.is_empty() {
            return Ok(0);
        }
        self.ensure_dir().await?;

        let mut written = 0;
        let mut failed = 0;
        for image in images {
            let Some(filename) = sanitize_image_filename(&image.filename)
                .filter(|name| is_image_filename(name))
            else {
                warn!(
                    subsystem = "images",
                    component = "image_cache",
                    filename = %image.filename,
                    "Skipping image with unusable filename"
                );
                continue;
            };
            if let Err(e) = self.write_file(&filename, &image.bytes).await {
                warn!(
                    subsystem = "images",
                    component = "image_cache",
                    filename = %filename,
                    error = %e,
                    "Failed to restore image"
                );
                failed += 1;
                continue;
            }
            written += 1;
        }

        info!(
            subsystem = "images",
            component = "image_cache",
            op = "restore",
            written,
            failed,
            "Restored cached images"
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(name: &str, bytes: &[u8]) -> CachedImage {
        CachedImage {
            filename: name.to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_get_all_on_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FilesystemImageCache::new(dir.path().join("does-not-exist"));
        assert!(cache.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restore_then_get_all() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FilesystemImageCache::new(dir.path());

        let written = cache
            .restore(&[image("b.png", b"png"), image("a.jpg", b"jpg")])
            .await
            .unwrap();
        assert_eq!(written, 2);

        let all = cache.get_all().await.unwrap();
        assert_eq!(all, vec![image("a.jpg", b"jpg"), image("b.png", b"png")]);
    }

    #[tokio::test]
    async fn test_restore_keeps_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FilesystemImageCache::new(dir.path());
        cache.restore(&[image("other-user.jpg", b"1")]).await.unwrap();

        cache.restore(&[image("mine.jpg", b"2")]).await.unwrap();

        let names: Vec<_> = cache
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.filename)
            .collect();
        assert_eq!(names, vec!["mine.jpg", "other-user.jpg"]);
    }

    #[tokio::test]
    async fn test_restore_confines_traversal_to_cache_dir() {
        let root = tempfile::tempdir().unwrap();
        let cache_dir = root.path().join("cache");
        let cache = FilesystemImageCache::new(&cache_dir);

        cache
            .restore(&[image("../escaped.jpg", b"x"), image("..", b"y")])
            .await
            .unwrap();

        assert!(!root.path().join("escaped.jpg").exists());
        assert!(cache_dir.join("escaped.jpg").exists());
    }

    #[tokio::test]
    async fn test_restore_accepts_names_up_to_the_sanitized_limit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FilesystemImageCache::new(dir.path());
        let long = format!("{}.jpg", "a".repeat(240));

        let written = cache
            .restore(&[image(&long, b"long"), image("ok.jpg", b"ok")])
            .await
            .unwrap();

        assert_eq!(written, 2);
        assert!(dir.path().join(&long).exists());
        assert!(dir.path().join("ok.jpg").exists());
    }

    #[tokio::test]
    async fn test_restore_continues_past_a_failed_write() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("blocked.jpg")).unwrap();
        let cache = FilesystemImageCache::new(dir.path());

        let written = cache
            .restore(&[
                image("blocked.jpg", b"x"),
                image("ok.jpg", b"ok"),
                image("readme.txt", b"not an image"),
            ])
            .await
            .unwrap();

        assert_eq!(written, 1);
        assert_eq!(std::fs::read(dir.path().join("ok.jpg")).unwrap(), b"ok");
        assert!(!dir.path().join("readme.txt").exists());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_get_all_ignores_non_images_and_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"t").unwrap();
        std::fs::write(dir.path().join(".x.jpg.tmp"), b"t").unwrap();
        std::fs::write(dir.path().join("ok.webp"), b"w").unwrap();

        let cache = FilesystemImageCache::new(dir.path());
        let all = cache.get_all().await.unwrap();
        assert_eq!(all, vec![image("ok.webp", b"w")]);
    }

    #[tokio::test]
    async fn test_cache_returns_existing_file_without_download() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("co1.jpg"), b"cached").unwrap();
        let cache = FilesystemImageCache::new(dir.path());

        let name = cache
            .cache("https://images.example.invalid/t_cover/co1.jpg")
            .await
            .unwrap();
        assert_eq!(name.as_deref(), Some("co1.jpg"));
    }

    #[tokio::test]
    async fn test_cache_gives_up_on_unreachable_host() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FilesystemImageCache::new(dir.path())
            .with_retries(1, Duration::from_millis(1));

        let name = cache.cache("http://127.0.0.1:9/missing.png").await.unwrap();
        assert_eq!(name, None);
        assert!(!dir.path().join("missing.png").exists());
    }

    #[test]
    fn test_backoff_doubles() {
        let cache = FilesystemImageCache::new("/tmp/unused")
            .with_retries(3, Duration::from_millis(100));
        assert_eq!(cache.backoff(0), Duration::from_millis(100));
        assert_eq!(cache.backoff(2), Duration::from_millis(400));
    }
}
