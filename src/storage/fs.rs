use std::{
    io::ErrorKind as IoErrorKind,
    path::{Path, PathBuf},
};
use uuid::Uuid;

use super::ArtifactStorage;
use crate::{
    config::validate_version,
    error::{AppError, AppResult},
    models::{
        ArtifactBundle, BundleMetadata, FeatureMatrix, Movie, ScalerParams, SimilarityMatrix,
        SimilarityMethod, SCHEMA_VERSION,
    },
};

pub const METADATA_FILE: &str = "metadata.json";
pub const MOVIES_FILE: &str = "movies.json";
pub const FEATURES_FILE: &str = "features.bin";
pub const SCALER_FILE: &str = "scaler.json";

pub fn similarity_file(method: SimilarityMethod) -> String {
    format!("similarity_{}.bin", method)
}

/// Bundle storage rooted at a local directory, one sub-directory per version
#[derive(Debug, Clone)]
pub struct FsArtifactStorage {
    root: PathBuf,
}

/// Raw file contents of one bundle, decoded off the async runtime
struct RawBundle {
    metadata: BundleMetadata,
    movies: Vec<u8>,
    features: Vec<u8>,
    cosine: Vec<u8>,
    jaccard: Vec<u8>,
    scaler: Vec<u8>,
}

impl FsArtifactStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.root.join(version)
    }

    /// Reads one file of a bundle whose directory is known to exist
    async fn read_part(dir: &Path, name: &str) -> AppResult<Vec<u8>> {
        let path = dir.join(name);
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            IoErrorKind::NotFound => {
                AppError::CorruptArtifact(format!("missing bundle file {}", path.display()))
            }
            _ => io_error(&path, e),
        })
    }

    async fn write_parts(dir: &Path, bundle: &ArtifactBundle) -> AppResult<()> {
        let metadata = serde_json::to_vec_pretty(&bundle.metadata).map_err(encode_error)?;
        let movies = serde_json::to_vec(&bundle.movies).map_err(encode_error)?;
        let scaler = serde_json::to_vec_pretty(&bundle.scaler).map_err(encode_error)?;
        let features = bincode::serialize(&bundle.features).map_err(encode_error)?;

        write(dir, MOVIES_FILE, &movies).await?;
        write(dir, FEATURES_FILE, &features).await?;
        write(dir, SCALER_FILE, &scaler).await?;
        for method in SimilarityMethod::ALL {
            let matrix = bincode::serialize(bundle.similarity(method)).map_err(encode_error)?;
            write(dir, &similarity_file(method), &matrix).await?;
        }
        // metadata last: a directory without it is never a complete bundle
        write(dir, METADATA_FILE, &metadata).await
    }
}

#[async_trait::async_trait]
impl ArtifactStorage for FsArtifactStorage {
    #[tracing::instrument(skip(self), fields(root = %self.root.display()))]
    async fn load(&self, version: &str) -> AppResult<ArtifactBundle> {
        validate_version(version)
            .map_err(|_| AppError::ArtifactNotFound(format!("invalid version '{}'", version)))?;

        let dir = self.version_dir(version);
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(AppError::ArtifactNotFound(format!(
                    "{} is not a bundle directory",
                    dir.display()
                )))
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                return Err(AppError::ArtifactNotFound(format!(
                    "no bundle for version '{}' under {}",
                    version,
                    self.root.display()
                )))
            }
            Err(e) => return Err(io_error(&dir, e)),
        }

        let metadata = decode_metadata(&Self::read_part(&dir, METADATA_FILE).await?)?;
        if metadata.model_version != version {
            return Err(AppError::CorruptArtifact(format!(
                "directory '{}' holds model version '{}'",
                version, metadata.model_version
            )));
        }

        let raw = RawBundle {
            metadata,
            movies: Self::read_part(&dir, MOVIES_FILE).await?,
            features: Self::read_part(&dir, FEATURES_FILE).await?,
            cosine: Self::read_part(&dir, &similarity_file(SimilarityMethod::Cosine)).await?,
            jaccard: Self::read_part(&dir, &similarity_file(SimilarityMethod::Jaccard)).await?,
            scaler: Self::read_part(&dir, SCALER_FILE).await?,
        };

        let bundle = tokio::task::spawn_blocking(move || decode_bundle(raw))
            .await
            .map_err(|e| AppError::Internal(format!("bundle decode task failed: {}", e)))??;

        tracing::info!(
            version,
            movies = bundle.movie_count(),
            built_at = %bundle.metadata.built_at,
            "Loaded artifact bundle"
        );

        Ok(bundle)
    }

    #[tracing::instrument(skip(self, bundle), fields(version = %bundle.version()))]
    async fn save(&self, bundle: &ArtifactBundle) -> AppResult<()> {
        let version = bundle.version();
        validate_version(version)?;
        bundle.validate()?;

        let dir = self.version_dir(version);
        if tokio::fs::try_exists(&dir).await.map_err(|e| io_error(&dir, e))? {
            return Err(AppError::InvalidInput(format!(
                "model version '{}' is already published",
                version
            )));
        }

        let staging = self
            .root
            .join(format!(".{}.staging-{}", version, Uuid::new_v4()));
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| io_error(&staging, e))?;

        let published = match Self::write_parts(&staging, bundle).await {
            Ok(()) => tokio::fs::rename(&staging, &dir)
                .await
                .map_err(|e| io_error(&dir, e)),
            Err(e) => Err(e),
        };

        if let Err(e) = published {
            if let Err(cleanup) = tokio::fs::remove_dir_all(&staging).await {
                tracing::warn!(error = %cleanup, path = %staging.display(), "Failed to remove staging directory");
            }
            return Err(e);
        }

        tracing::info!(path = %dir.display(), "Published artifact bundle");
        Ok(())
    }

    async fn list_versions(&self) -> AppResult<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.root, e)),
        };

        let mut versions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.root, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let has_metadata = tokio::fs::try_exists(entry.path().join(METADATA_FILE))
                .await
                .unwrap_or(false);
            if has_metadata {
                versions.push(name);
            }
        }

        versions.sort();
        Ok(versions)
    }
}

async fn write(dir: &Path, name: &str, bytes: &[u8]) -> AppResult<()> {
    let path = dir.join(name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| io_error(&path, e))
}

fn io_error(path: &Path, e: std::io::Error) -> AppError {
    AppError::StorageUnavailable(format!("{}: {}", path.display(), e))
}

fn encode_error(e: impl std::fmt::Display) -> AppError {
    AppError::Internal(format!("Bundle serialization error: {}", e))
}

fn corrupt(part: &str, e: impl std::fmt::Display) -> AppError {
    AppError::CorruptArtifact(format!("unreadable {}: {}", part, e))
}

/// Parses the metadata document, separating schema upgrades from corruption
fn decode_metadata(bytes: &[u8]) -> AppResult<BundleMetadata> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| corrupt(METADATA_FILE, e))?;

    let schema = value
        .get("schema_version")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| AppError::CorruptArtifact("metadata has no schema_version".to_string()))?;

    if schema != u64::from(SCHEMA_VERSION) {
        return Err(AppError::CorruptArtifact(format!(
            "unsupported schema version {} (this build reads version {})",
            schema, SCHEMA_VERSION
        )));
    }

    serde_json::from_value(value).map_err(|e| corrupt(METADATA_FILE, e))
}

fn decode_bundle(raw: RawBundle) -> AppResult<ArtifactBundle> {
    let movies: Vec<Movie> =
        serde_json::from_slice(&raw.movies).map_err(|e| corrupt(MOVIES_FILE, e))?;
    let scaler: ScalerParams =
        serde_json::from_slice(&raw.scaler).map_err(|e| corrupt(SCALER_FILE, e))?;
    let features: FeatureMatrix =
        bincode::deserialize(&raw.features).map_err(|e| corrupt(FEATURES_FILE, e))?;
    let cosine: SimilarityMatrix =
        bincode::deserialize(&raw.cosine).map_err(|e| corrupt("cosine matrix", e))?;
    let jaccard: SimilarityMatrix =
        bincode::deserialize(&raw.jaccard).map_err(|e| corrupt("jaccard matrix", e))?;

    let bundle = ArtifactBundle {
        metadata: raw.metadata,
        movies,
        features,
        cosine,
        jaccard,
        scaler,
    };
    bundle.validate()?;
    Ok(bundle)
}
