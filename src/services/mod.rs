pub mod cache;
pub mod macros;
pub mod metrics;
pub mod model_store;
pub mod recommendations;

pub use cache::{CacheKey, CacheStats, ResultCache};
pub use metrics::{MetricsSnapshot, MetricsTracker};
pub use model_store::{ModelStatus, ModelStore};
pub use recommendations::RecommendationService;
