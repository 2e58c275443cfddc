/// Durable storage for versioned artifact bundles
///
/// This module provides a pluggable storage seam for trained bundles. The
/// serving side only reads; the training pipeline writes. Object-storage sync
/// happens outside the process, so the filesystem backend is the only one
/// shipped here.
use crate::{error::AppResult, models::ArtifactBundle};

pub mod fs;

pub use fs::FsArtifactStorage;

/// Trait for artifact bundle storage backends
///
/// Implementations must report a missing version as `ArtifactNotFound`,
/// unreadable or inconsistent content as `CorruptArtifact`, and transport or
/// I/O failures as `StorageUnavailable`.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ArtifactStorage: Send + Sync {
    /// Reads and validates the bundle published under `version`
    async fn load(&self, version: &str) -> AppResult<ArtifactBundle>;

    /// Publishes a bundle under its own version. Published versions are immutable.
    async fn save(&self, bundle: &ArtifactBundle) -> AppResult<()>;

    /// Lists published versions in ascending order
    async fn list_versions(&self) -> AppResult<Vec<String>>;
}
