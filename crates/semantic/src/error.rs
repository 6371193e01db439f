use thiserror::Error;

/// Errors surfaced by an [`crate::Embedder`] implementation.
#[derive(Debug, Error, Clone)]
pub enum EmbeddingError {
    /// Configuration is inconsistent (e.g. an http embedder with no url).
    #[error("invalid embedder config: {0}")]
    InvalidConfig(String),
    /// The remote embedding endpoint is unreachable or returned an error.
    #[error("embedding request failed: {0}")]
    Request(String),
    /// The remote endpoint's response could not be parsed into a vector.
    #[error("could not parse embedding response: {0}")]
    InvalidResponse(String),
    /// The remote dependency's circuit breaker is open.
    #[error("embedder circuit breaker is open for '{0}'")]
    CircuitOpen(String),
}
