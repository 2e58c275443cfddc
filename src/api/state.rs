use std::sync::Arc;

use crate::{
    config::EngineConfig,
    services::{MetricsTracker, ModelStore, RecommendationService},
    storage::ArtifactStorage,
};

/// Shared application state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ModelStore>,
    pub service: Arc<RecommendationService>,
    pub metrics: Arc<MetricsTracker>,
}

impl AppState {
    pub fn new(storage: Arc<dyn ArtifactStorage>, config: &EngineConfig) -> Self {
        let store = Arc::new(ModelStore::new(storage, config.model_version()));
        let service = Arc::new(RecommendationService::new(Arc::clone(&store), config));
        Self {
            store,
            service,
            metrics: Arc::new(MetricsTracker::new()),
        }
    }
}
