//! Embedding generation and semantic-similarity detection.
//!
//! An [`Embedder`] turns text into a fixed-dimension vector; a
//! [`SemanticDetector`] embeds a prompt and matches it against a corpus of
//! known-bad examples held in a [`index::VectorIndex`].
//!
//! Two embedder modes ship here:
//!
//! - **Stub** - deterministic, hash-derived vectors. Used for the `"fast"`
//!   tier and for every test in this workspace.
//! - **HTTP** - calls a remote embedding endpoint behind a circuit breaker
//!   so a flapping model server degrades to "no semantic detections" rather
//!   than stalling the whole pipeline.
//!
//! ```
//! use semantic::{SemanticConfig, StubEmbedder};
//! use semantic::Embedder as _;
//!
//! # async fn run() {
//! let embedder = StubEmbedder::new(SemanticConfig { tier: "fast".into(), ..Default::default() });
//! let vector = embedder.embed("hello").await.unwrap();
//! assert_eq!(vector.len(), 384);
//! # }
//! ```

mod config;
mod detector;
mod embedder;
mod error;
mod normalize;
mod stub;

pub use config::SemanticConfig;
pub use detector::SemanticDetector;
pub use embedder::{Embedder, HttpEmbedder, StubEmbedder};
pub use error::EmbeddingError;
