//! Orchestrates the regex detector, semantic detector, policy engine, and
//! two-tier cache behind a single [`DetectorPipeline::validate`] call.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use breaker::CircuitBreakerRegistry;
//! use cache::{CacheManager, InMemoryKvStore};
//! use index::{AnnConfig, InMemoryVectorIndex};
//! use patterns::{PatternDocument, RegexDetector};
//! use policy::{PolicyDocument, PolicyEngine};
//! use pipeline::{DetectorPipeline, PipelineConfig};
//! use semantic::{SemanticDetector, StubEmbedder};
//!
//! # async fn run() {
//! let config = PipelineConfig::default();
//! let patterns = PatternDocument::default();
//! let policy_doc: PolicyDocument = serde_yaml::from_str(
//!     "settings:\n  default_policy: default\npolicies:\n  default:\n    name: Default\n",
//! )
//! .unwrap();
//!
//! let breakers = CircuitBreakerRegistry::new(config.breaker);
//! let embedder = Arc::new(StubEmbedder::new(config.semantic.clone()));
//! let index = Arc::new(InMemoryVectorIndex::new(config.semantic.dimension(), AnnConfig::default()));
//! let semantic = SemanticDetector::new(embedder, index, breakers.get_or_create("vector_index"), config.semantic.clone());
//! let cache = CacheManager::new(InMemoryKvStore::new(), config.cache, breakers.get_or_create("l2_cache"));
//!
//! let pipeline = DetectorPipeline::new(
//!     RegexDetector::new(&patterns),
//!     semantic,
//!     PolicyEngine::new(&policy_doc),
//!     cache,
//!     breakers,
//!     config.deadline,
//!     true,
//! );
//!
//! let result = pipeline.validate("hello", None, None, None).await;
//! assert!(result.is_safe);
//! # }
//! ```

mod config;
mod error;
mod observability;
mod pipeline;

pub use config::{ConfigLoadError, PipelineConfig};
pub use error::PipelineError;
pub use observability::{
    set_pipeline_logger, set_pipeline_metrics, KeyValueLogger, PipelineEventLogger, PipelineMetrics,
    ValidationEvent,
};
pub use pipeline::{BatchItem, DetectorPipeline};
