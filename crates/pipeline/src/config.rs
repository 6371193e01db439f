//! YAML configuration loading for a [`crate::DetectorPipeline`].
//!
//! Mirrors the pattern and policy document shapes consumed by the
//! `patterns` and `policy` crates, plus the tuning knobs (semantic tier,
//! cache sizing, circuit breaker thresholds, validation deadline) that are
//! specific to the pipeline itself.
//!
//! ```yaml
//! semantic:
//!   tier: fast
//!   sim_threshold: 0.85
//! cache:
//!   l1_capacity: 1000
//!   l1_ttl_secs: 300
//!   l2_ttl_secs: 3600
//! breaker:
//!   failure_threshold: 5
//!   reset_timeout_secs: 60
//!   success_threshold: 2
//! deadline_ms: 500
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use breaker::CircuitBreakerConfig;
use cache::CacheConfig;
use semantic::SemanticConfig;

/// Errors raised while loading the pipeline's own tuning configuration.
/// Pattern and policy documents raise their own crate-specific error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("failed to parse config yaml: {0}")]
    YamlParse(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SemanticYaml {
    #[serde(default = "default_tier")]
    tier: String,
    #[serde(default = "default_model_name")]
    model_name: String,
    #[serde(default)]
    api_url: Option<String>,
    #[serde(default)]
    api_auth_header: Option<String>,
    #[serde(default = "default_api_timeout")]
    api_timeout_secs: u64,
    #[serde(default = "true_value")]
    normalize: bool,
    #[serde(default = "default_sim_threshold")]
    sim_threshold: f32,
}

impl Default for SemanticYaml {
    fn default() -> Self {
        Self {
            tier: default_tier(),
            model_name: default_model_name(),
            api_url: None,
            api_auth_header: None,
            api_timeout_secs: default_api_timeout(),
            normalize: true,
            sim_threshold: default_sim_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheYaml {
    #[serde(default = "default_l1_capacity")]
    l1_capacity: usize,
    #[serde(default = "default_l1_ttl")]
    l1_ttl_secs: u64,
    #[serde(default = "default_l2_ttl")]
    l2_ttl_secs: u64,
}

impl Default for CacheYaml {
    fn default() -> Self {
        Self {
            l1_capacity: default_l1_capacity(),
            l1_ttl_secs: default_l1_ttl(),
            l2_ttl_secs: default_l2_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BreakerYaml {
    #[serde(default = "default_failure_threshold")]
    failure_threshold: u32,
    #[serde(default = "default_reset_timeout")]
    reset_timeout_secs: u64,
    #[serde(default = "default_success_threshold")]
    success_threshold: u32,
}

impl Default for BreakerYaml {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout(),
            success_threshold: default_success_threshold(),
        }
    }
}

/// Raw, deserializable pipeline tuning document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfigDocument {
    #[serde(default)]
    semantic: SemanticYaml,
    #[serde(default)]
    cache: CacheYaml,
    #[serde(default)]
    breaker: BreakerYaml,
    #[serde(default = "default_deadline_ms")]
    deadline_ms: u64,
}

impl Default for PipelineConfigDocument {
    fn default() -> Self {
        Self {
            semantic: SemanticYaml::default(),
            cache: CacheYaml::default(),
            breaker: BreakerYaml::default(),
            deadline_ms: default_deadline_ms(),
        }
    }
}

/// Resolved pipeline tuning configuration, ready to build collaborators from.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub semantic: SemanticConfig,
    pub cache: CacheConfig,
    pub breaker: CircuitBreakerConfig,
    pub deadline: Duration,
}

impl PipelineConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigLoadError> {
        let doc: PipelineConfigDocument = serde_yaml::from_str(yaml)?;
        Self::from_document(doc)
    }

    pub fn from_yaml_path(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigLoadError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    fn from_document(doc: PipelineConfigDocument) -> Result<Self, ConfigLoadError> {
        let valid_tiers = ["fast", "balanced", "accurate"];
        if !valid_tiers.contains(&doc.semantic.tier.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "semantic.tier must be one of: {valid_tiers:?}"
            )));
        }
        if !(0.0..=1.0).contains(&doc.semantic.sim_threshold) {
            return Err(ConfigLoadError::Validation(
                "semantic.sim_threshold must be within [0, 1]".to_string(),
            ));
        }

        Ok(Self {
            semantic: SemanticConfig {
                tier: doc.semantic.tier,
                model_name: doc.semantic.model_name,
                api_url: doc.semantic.api_url,
                api_auth_header: doc.semantic.api_auth_header,
                api_timeout_secs: doc.semantic.api_timeout_secs,
                normalize: doc.semantic.normalize,
                sim_threshold: doc.semantic.sim_threshold,
            },
            cache: CacheConfig {
                l1_capacity: doc.cache.l1_capacity,
                l1_ttl: Duration::from_secs(doc.cache.l1_ttl_secs),
                l2_ttl: Duration::from_secs(doc.cache.l2_ttl_secs),
            },
            breaker: CircuitBreakerConfig::default()
                .with_failure_threshold(doc.breaker.failure_threshold)
                .with_reset_timeout(Duration::from_secs(doc.breaker.reset_timeout_secs))
                .with_success_threshold(doc.breaker.success_threshold),
            deadline: Duration::from_millis(doc.deadline_ms),
        })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_document(PipelineConfigDocument::default()).expect("defaults are always valid")
    }
}

fn default_tier() -> String {
    "balanced".to_string()
}
fn default_model_name() -> String {
    "bge-small-en-v1.5".to_string()
}
fn default_api_timeout() -> u64 {
    10
}
fn true_value() -> bool {
    true
}
fn default_sim_threshold() -> f32 {
    0.85
}
fn default_l1_capacity() -> usize {
    1000
}
fn default_l1_ttl() -> u64 {
    300
}
fn default_l2_ttl() -> u64 {
    3600
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_reset_timeout() -> u64 {
    60
}
fn default_success_threshold() -> u32 {
    2
}
fn default_deadline_ms() -> u64 {
    500
}
