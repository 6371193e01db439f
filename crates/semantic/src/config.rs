use serde::{Deserialize, Serialize};

/// Runtime configuration for an [`crate::Embedder`].
///
/// # Example
/// ```no_run
/// use semantic::{SemanticConfig, StubEmbedder};
///
/// let cfg = SemanticConfig {
///     tier: "fast".into(),
///     normalize: true,
///     ..Default::default()
/// };
/// let _embedder = StubEmbedder::new(cfg);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SemanticConfig {
    /// Model tier: `"fast"` (384-d), `"balanced"` (768-d, default) or `"accurate"` (1024-d).
    pub tier: String,
    /// Friendly label surfaced alongside every embedding, for observability.
    pub model_name: String,
    /// Remote HTTP embedding endpoint, used by [`crate::HttpEmbedder`].
    pub api_url: Option<String>,
    /// Authorization header value (e.g. `"Bearer hf_xxx"`).
    pub api_auth_header: Option<String>,
    /// Overall request timeout.
    pub api_timeout_secs: u64,
    /// L2-normalize the resulting vector (recommended so cosine and dot product agree).
    pub normalize: bool,
    /// Similarity threshold above which a semantic match becomes a detection.
    pub sim_threshold: f32,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            tier: "balanced".into(),
            model_name: "bge-small-en-v1.5".into(),
            api_url: None,
            api_auth_header: None,
            api_timeout_secs: 10,
            normalize: true,
            sim_threshold: 0.85,
        }
    }
}

impl SemanticConfig {
    /// Dimensionality implied by [`Self::tier`].
    pub fn dimension(&self) -> usize {
        match self.tier.as_str() {
            "fast" => 384,
            "accurate" => 1024,
            _ => 768,
        }
    }
}
