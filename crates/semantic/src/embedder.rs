use std::sync::Arc;

use async_trait::async_trait;
use breaker::{CircuitBreaker, CircuitBreakerError};

use crate::config::SemanticConfig;
use crate::error::EmbeddingError;
use crate::stub::make_stub_vector;

/// Produces a fixed-dimension, ideally unit-norm vector for a piece of text.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Vector length this embedder produces.
    fn dimension(&self) -> usize;
}

/// Deterministic, hash-derived embedder. Used for the `"fast"` tier and as
/// the default test double; never fails.
pub struct StubEmbedder {
    config: SemanticConfig,
}

impl StubEmbedder {
    pub fn new(config: SemanticConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(make_stub_vector(text, &self.config))
    }

    fn dimension(&self) -> usize {
        self.config.dimension()
    }
}

/// Embedder backed by a remote HTTP endpoint, guarded by a shared circuit
/// breaker so a flapping model server degrades gracefully instead of
/// stalling every prompt.
pub struct HttpEmbedder {
    config: SemanticConfig,
    client: reqwest::Client,
    breaker: Arc<CircuitBreaker>,
}

impl HttpEmbedder {
    pub fn new(config: SemanticConfig, breaker: Arc<CircuitBreaker>) -> Result<Self, EmbeddingError> {
        if config.api_url.is_none() {
            return Err(EmbeddingError::InvalidConfig(
                "api_url must be set for HttpEmbedder".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::InvalidConfig(e.to_string()))?;
        Ok(Self { config, client, breaker })
    }

    async fn request_embedding(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = self.config.api_url.as_ref().expect("checked in new()");
        let mut request = self.client.post(url).json(&serde_json::json!({ "inputs": text }));
        if let Some(auth) = &self.config.api_auth_header {
            request = request.header("Authorization", auth);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(EmbeddingError::Request(format!("status {}", response.status())));
        }
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
        parse_embedding(&value)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let result = self
            .breaker
            .call_if(|| self.request_embedding(text), is_dependency_failure)
            .await;
        match result {
            Ok(mut vector) => {
                if self.config.normalize {
                    crate::normalize::l2_normalize_in_place(&mut vector);
                }
                Ok(vector)
            }
            Err(CircuitBreakerError::Open(name)) => Err(EmbeddingError::CircuitOpen(name)),
            Err(CircuitBreakerError::Inner(err)) => Err(err),
        }
    }

    fn dimension(&self) -> usize {
        self.config.dimension()
    }
}

/// Only connectivity failures indicate the remote endpoint itself is
/// unhealthy. A malformed-but-reachable response is a local parsing
/// problem and shouldn't trip the breaker.
fn is_dependency_failure(err: &EmbeddingError) -> bool {
    matches!(err, EmbeddingError::Request(_))
}

/// Accepts either a bare `[f32, ...]` array or the HuggingFace-style nested
/// `[[f32, ...]]` single-document batch response.
fn parse_embedding(value: &serde_json::Value) -> Result<Vec<f32>, EmbeddingError> {
    if let Some(arr) = value.as_array() {
        if let Some(first) = arr.first() {
            if first.is_array() {
                return parse_float_array(first);
            }
        }
        return parse_float_array(value);
    }
    Err(EmbeddingError::InvalidResponse("expected a json array".to_string()))
}

fn parse_float_array(value: &serde_json::Value) -> Result<Vec<f32>, EmbeddingError> {
    value
        .as_array()
        .ok_or_else(|| EmbeddingError::InvalidResponse("expected a json array of numbers".to_string()))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| EmbeddingError::InvalidResponse("non-numeric embedding element".to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_embedder_reports_configured_dimension() {
        let embedder = StubEmbedder::new(SemanticConfig {
            tier: "fast".into(),
            ..Default::default()
        });
        assert_eq!(embedder.dimension(), 384);
        let v = embedder.embed("hello").await.unwrap();
        assert_eq!(v.len(), 384);
    }

    #[tokio::test]
    async fn embed_batch_default_impl_preserves_order() {
        let embedder = StubEmbedder::new(SemanticConfig::default());
        let batch = embedder
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_ne!(batch[0], batch[1]);
    }

    #[test]
    fn parse_embedding_flat_array() {
        let v = serde_json::json!([0.1, 0.2, 0.3]);
        assert_eq!(parse_embedding(&v).unwrap(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn parse_embedding_nested_array() {
        let v = serde_json::json!([[0.1, 0.2]]);
        assert_eq!(parse_embedding(&v).unwrap(), vec![0.1, 0.2]);
    }

    #[test]
    fn parse_embedding_rejects_non_array() {
        let v = serde_json::json!({"error": "bad"});
        assert!(parse_embedding(&v).is_err());
    }

    #[test]
    fn http_embedder_requires_api_url() {
        let breaker = Arc::new(CircuitBreaker::new("test-http", breaker::CircuitBreakerConfig::default()));
        let result = HttpEmbedder::new(SemanticConfig::default(), breaker);
        assert!(result.is_err());
    }

    #[test]
    fn invalid_response_does_not_count_as_a_dependency_failure() {
        assert!(!is_dependency_failure(&EmbeddingError::InvalidResponse("bad json".to_string())));
        assert!(!is_dependency_failure(&EmbeddingError::InvalidConfig("missing url".to_string())));
    }

    #[test]
    fn request_error_counts_as_a_dependency_failure() {
        assert!(is_dependency_failure(&EmbeddingError::Request("timed out".to_string())));
    }

    #[tokio::test]
    async fn malformed_response_does_not_trip_breaker() {
        let cfg = breaker::CircuitBreakerConfig::default().with_failure_threshold(1);
        let cb = CircuitBreaker::new("test-http", cfg);
        let result: Result<Vec<f32>, CircuitBreakerError<EmbeddingError>> = cb
            .call_if(
                || async { Err(EmbeddingError::InvalidResponse("bad json".to_string())) },
                is_dependency_failure,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(cb.current_state(), breaker::CircuitState::Closed);
    }
}
