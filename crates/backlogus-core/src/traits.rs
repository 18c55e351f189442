//! Core traits for BackLogus abstractions.
//!
//! Concrete implementations live in `backlogus-db`; tests substitute fakes.

use async_trait::async_trait;

use crate::backup::CachedImage;
use crate::error::Result;
use crate::models::*;

// =============================================================================
// USER REPOSITORY TRAITS
// =============================================================================

/// Repository for user accounts.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a user and return its ID.
    async fn create(&self, req: CreateUserRequest) -> Result<i64>;

    /// Fetch a profile. Fails with `NotFound` for unknown users.
    async fn get_profile(&self, user_id: i64) -> Result<UserProfile>;

    /// Update the mutable profile fields. Email and password are untouched.
    async fn update_profile(&self, user_id: i64, update: &ProfileUpdate) -> Result<()>;

    /// Check if a user exists.
    async fn exists(&self, user_id: i64) -> Result<bool>;
}

/// Repository for third-party API credentials.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// All credentials owned by a user, ordered by provider.
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<ApiCredential>>;

    /// Insert or replace the credential for (user, provider).
    async fn upsert(&self, user_id: i64, credential: &ApiCredential) -> Result<i64>;
}

// =============================================================================
// IMAGE CACHE
// =============================================================================

/// Content cache for catalog images, keyed by URL-derived filename.
///
/// Constructed once at startup and shared through application state.
#[async_trait]
pub trait ImageCache: Send + Sync {
    /// Download `url` into the cache if absent. Returns the cached filename,
    /// or `None` when the image could not be fetched.
    async fn cache(&self, url: &str) -> Result<Option<String>>;

    /// Every cached image file with its bytes.
    async fn get_all(&self) -> Result<Vec<CachedImage>>;

    /// Write images into the cache, returning how many were written.
    async fn restore(&self, images: &[CachedImage]) -> Result<usize>;
}
