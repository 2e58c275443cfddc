//! Lazy, versioned, load-once access to artifact bundles.
//!
//! Each version has one slot. While a load is in flight the slot holds a
//! shared future that every concurrent caller awaits, so storage is read at
//! most once per version. A successful load replaces the future with the
//! bundle; a failed load empties the slot so the next call retries.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

use crate::{
    config::validate_version,
    error::{AppError, AppResult},
    models::ArtifactBundle,
    storage::ArtifactStorage,
};

type LoadFuture = Shared<BoxFuture<'static, AppResult<Arc<ArtifactBundle>>>>;

enum Slot {
    Loading(LoadFuture),
    Ready(Arc<ArtifactBundle>),
}

struct ActiveModel {
    bundle: Arc<ArtifactBundle>,
    loaded_at: DateTime<Utc>,
}

/// Loaded-model summary reported by the health endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatus {
    pub loaded: bool,
    pub active_version: Option<String>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub movie_count: Option<usize>,
    pub default_version: String,
}

pub struct ModelStore {
    storage: Arc<dyn ArtifactStorage>,
    default_version: String,
    slots: Mutex<HashMap<String, Slot>>,
    active: RwLock<Option<ActiveModel>>,
    loads: Arc<AtomicU64>,
}

impl ModelStore {
    pub fn new(storage: Arc<dyn ArtifactStorage>, default_version: impl Into<String>) -> Self {
        Self {
            storage,
            default_version: default_version.into(),
            slots: Mutex::new(HashMap::new()),
            active: RwLock::new(None),
            loads: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn default_version(&self) -> &str {
        &self.default_version
    }

    /// Returns the bundle for `version`, loading it on first use
    pub async fn get(&self, version: &str) -> AppResult<Arc<ArtifactBundle>> {
        validate_version(version)?;

        let load = {
            let mut slots = self.slots.lock();
            match slots.get(version) {
                Some(Slot::Ready(bundle)) => return Ok(Arc::clone(bundle)),
                Some(Slot::Loading(pending)) => pending.clone(),
                None => {
                    let pending = self.start_load(version);
                    slots.insert(version.to_string(), Slot::Loading(pending.clone()));
                    pending
                }
            }
        };

        let result = load.clone().await;
        self.settle(version, &load, &result);
        result
    }

    /// Loads (or reuses) a version and makes it the active bundle.
    ///
    /// Other resident versions are dropped.
    pub async fn activate(&self, version: &str) -> AppResult<Arc<ArtifactBundle>> {
        let bundle = self.get(version).await?;

        let previous = {
            let mut active = self.active.write();
            let previous = active.as_ref().map(|m| m.bundle.version().to_string());
            if !matches!(active.as_ref(), Some(m) if Arc::ptr_eq(&m.bundle, &bundle)) {
                *active = Some(ActiveModel {
                    bundle: Arc::clone(&bundle),
                    loaded_at: Utc::now(),
                });
            }
            previous
        };

        self.slots.lock().retain(|v, _| v == version);

        tracing::info!(
            version,
            previous = previous.as_deref().unwrap_or("none"),
            movies = bundle.movie_count(),
            "Model activated"
        );

        Ok(bundle)
    }

    /// The active bundle, or `ModelUnavailable` if none has been activated
    pub fn active(&self) -> AppResult<Arc<ArtifactBundle>> {
        self.active
            .read()
            .as_ref()
            .map(|m| Arc::clone(&m.bundle))
            .ok_or_else(|| AppError::ModelUnavailable("No model is loaded".to_string()))
    }

    /// The active bundle, activating the default version on first use
    pub async fn active_or_load(&self) -> AppResult<Arc<ArtifactBundle>> {
        if let Ok(bundle) = self.active() {
            return Ok(bundle);
        }

        let bundle = self.get(&self.default_version).await?;

        let mut active = self.active.write();
        // An explicit activation may have won the race
        if let Some(current) = active.as_ref() {
            return Ok(Arc::clone(&current.bundle));
        }
        *active = Some(ActiveModel {
            bundle: Arc::clone(&bundle),
            loaded_at: Utc::now(),
        });
        tracing::info!(
            version = %self.default_version,
            movies = bundle.movie_count(),
            "Default model activated"
        );

        Ok(bundle)
    }

    /// Drops a resident version. Returns whether anything was removed.
    pub fn invalidate(&self, version: &str) -> bool {
        let removed_slot = self.slots.lock().remove(version).is_some();

        let mut active = self.active.write();
        let was_active = matches!(active.as_ref(), Some(m) if m.bundle.version() == version);
        if was_active {
            *active = None;
        }

        if removed_slot || was_active {
            tracing::info!(version, was_active, "Model invalidated");
        }
        removed_slot || was_active
    }

    pub fn status(&self) -> ModelStatus {
        let active = self.active.read();
        match active.as_ref() {
            Some(model) => ModelStatus {
                loaded: true,
                active_version: Some(model.bundle.version().to_string()),
                loaded_at: Some(model.loaded_at),
                movie_count: Some(model.bundle.movie_count()),
                default_version: self.default_version.clone(),
            },
            None => ModelStatus {
                loaded: false,
                active_version: None,
                loaded_at: None,
                movie_count: None,
                default_version: self.default_version.clone(),
            },
        }
    }

    /// Number of reads issued to the underlying storage
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    fn start_load(&self, version: &str) -> LoadFuture {
        let storage = Arc::clone(&self.storage);
        let loads = Arc::clone(&self.loads);
        let version = version.to_string();

        async move {
            loads.fetch_add(1, Ordering::Relaxed);
            let start = Instant::now();
            tracing::info!(%version, "Loading model bundle");

            match storage.load(&version).await {
                Ok(bundle) => {
                    tracing::info!(
                        %version,
                        movies = bundle.movie_count(),
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Model bundle loaded"
                    );
                    Ok(Arc::new(bundle))
                }
                Err(e) => {
                    tracing::warn!(%version, error = %e, "Model bundle failed to load");
                    Err(e)
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Replaces the in-flight slot with its outcome, unless it was already
    /// settled or invalidated by someone else
    fn settle(&self, version: &str, load: &LoadFuture, result: &AppResult<Arc<ArtifactBundle>>) {
        let mut slots = self.slots.lock();
        let is_current =
            matches!(slots.get(version), Some(Slot::Loading(pending)) if pending.ptr_eq(load));
        if !is_current {
            return;
        }

        match result {
            Ok(bundle) => {
                slots.insert(version.to_string(), Slot::Ready(Arc::clone(bundle)));
            }
            Err(_) => {
                slots.remove(version);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{storage::MockArtifactStorage, test_support::sample_bundle};
    use std::{sync::atomic::AtomicUsize, time::Duration};
    use tokio_test::{assert_err, assert_ok};

    /// Storage that takes a while to answer and counts its reads
    struct SlowStorage {
        reads: AtomicUsize,
        fail: bool,
    }

    impl SlowStorage {
        fn new(fail: bool) -> Self {
            Self {
                reads: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait::async_trait]
    impl ArtifactStorage for SlowStorage {
        async fn load(&self, version: &str) -> AppResult<ArtifactBundle> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.fail {
                Err(AppError::StorageUnavailable("disk offline".to_string()))
            } else {
                Ok(sample_bundle(version))
            }
        }

        async fn save(&self, _bundle: &ArtifactBundle) -> AppResult<()> {
            Ok(())
        }

        async fn list_versions(&self) -> AppResult<Vec<String>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_loads_each_version_once() {
        let mut storage = MockArtifactStorage::new();
        storage
            .expect_load()
            .times(1)
            .returning(|version| Ok(sample_bundle(version)));
        let store = ModelStore::new(Arc::new(storage), "v1");

        let first = assert_ok!(store.get("v1").await);
        let second = assert_ok!(store.get("v1").await);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.load_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_loads_share_one_read() {
        let storage = Arc::new(SlowStorage::new(false));
        let store = Arc::new(ModelStore::new(storage.clone(), "v1"));

        let results = futures::future::join_all((0..16).map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.get("v1").await })
        }))
        .await;

        let bundles: Vec<Arc<ArtifactBundle>> = results
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        assert_eq!(storage.reads.load(Ordering::SeqCst), 1);
        assert_eq!(store.load_count(), 1);
        assert!(bundles.iter().all(|b| Arc::ptr_eq(b, &bundles[0])));
    }

    #[tokio::test]
    async fn test_concurrent_waiters_share_failure_and_next_call_retries() {
        let storage = Arc::new(SlowStorage::new(true));
        let store = Arc::new(ModelStore::new(storage.clone(), "v1"));

        let results = futures::future::join_all((0..8).map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.get("v1").await })
        }))
        .await;

        for joined in results {
            assert_eq!(
                joined.unwrap().unwrap_err(),
                AppError::StorageUnavailable("disk offline".to_string())
            );
        }
        assert_eq!(storage.reads.load(Ordering::SeqCst), 1);

        assert_err!(store.get("v1").await);
        assert_eq!(storage.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_load_is_not_cached() {
        let mut storage = MockArtifactStorage::new();
        let mut calls = 0;
        storage.expect_load().times(2).returning(move |version| {
            calls += 1;
            if calls == 1 {
                Err(AppError::CorruptArtifact("truncated features.bin".to_string()))
            } else {
                Ok(sample_bundle(version))
            }
        });
        let store = ModelStore::new(Arc::new(storage), "v1");

        let err = store.get("v1").await.unwrap_err();
        assert!(matches!(err, AppError::CorruptArtifact(_)));

        let bundle = store.get("v1").await.unwrap();
        assert_eq!(bundle.version(), "v1");
        assert_eq!(store.load_count(), 2);
    }

    #[tokio::test]
    async fn test_active_requires_activation() {
        let store = ModelStore::new(Arc::new(MockArtifactStorage::new()), "v1");

        assert!(matches!(store.active(), Err(AppError::ModelUnavailable(_))));
        assert!(!store.status().loaded);
    }

    #[tokio::test]
    async fn test_active_or_load_activates_default_version() {
        let mut storage = MockArtifactStorage::new();
        storage
            .expect_load()
            .times(1)
            .returning(|version| Ok(sample_bundle(version)));
        let store = ModelStore::new(Arc::new(storage), "v1");

        let bundle = store.active_or_load().await.unwrap();
        let again = store.active_or_load().await.unwrap();

        assert!(Arc::ptr_eq(&bundle, &again));
        let status = store.status();
        assert!(status.loaded);
        assert_eq!(status.active_version.as_deref(), Some("v1"));
        assert_eq!(status.movie_count, Some(bundle.movie_count()));
        assert!(status.loaded_at.is_some());
    }

    #[tokio::test]
    async fn test_activate_swaps_and_evicts_previous_version() {
        let mut storage = MockArtifactStorage::new();
        storage
            .expect_load()
            .times(3)
            .returning(|version| Ok(sample_bundle(version)));
        let store = ModelStore::new(Arc::new(storage), "v1");

        store.activate("v1").await.unwrap();
        store.activate("v2").await.unwrap();
        assert_eq!(store.active().unwrap().version(), "v2");

        // v1 was evicted by the swap, so it is read again
        store.get("v1").await.unwrap();
        assert_eq!(store.load_count(), 3);
    }

    #[tokio::test]
    async fn test_invalidate_clears_active_slot() {
        let mut storage = MockArtifactStorage::new();
        storage
            .expect_load()
            .times(2)
            .returning(|version| Ok(sample_bundle(version)));
        let store = ModelStore::new(Arc::new(storage), "v1");

        store.activate("v1").await.unwrap();
        assert!(store.invalidate("v1"));
        assert!(!store.invalidate("v1"));
        assert!(store.active().is_err());

        store.activate("v1").await.unwrap();
        assert_eq!(store.load_count(), 2);
    }

    #[tokio::test]
    async fn test_rejects_path_like_versions_without_reading() {
        let store = ModelStore::new(Arc::new(MockArtifactStorage::new()), "v1");

        let err = store.get("../secrets").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(store.load_count(), 0);
    }
}
