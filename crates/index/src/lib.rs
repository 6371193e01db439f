//! Vector index adapter over the semantic corpus: cosine-similarity KNN
//! backed by an HNSW graph with an automatic linear-scan fallback for small
//! corpora.
//!
//! The index is used as an external service boundary: it does not implement
//! its own ANN algorithm, it wraps [`hnsw_rs`] and exposes the narrower
//! [`VectorIndex`] contract the detection pipeline actually needs.

mod ann;

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use types::Severity;

pub use ann::{AnnConfig, AnnError, cosine_distance};

/// A single entry in the semantic corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub pattern_id: String,
    pub text: String,
    pub category: String,
    pub severity: Severity,
    #[serde(default)]
    pub metadata: JsonValue,
}

/// A search hit: the matched entry's id, its similarity to the query, and
/// its stored metadata.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub pattern_id: String,
    pub similarity: f32,
    pub category: String,
    pub severity: Severity,
    pub metadata: JsonValue,
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

impl From<AnnError> for IndexError {
    fn from(value: AnnError) -> Self {
        match value {
            AnnError::DimensionMismatch { expected, got } => IndexError::DimensionMismatch { expected, got },
            AnnError::NotBuilt => IndexError::DimensionMismatch { expected: 0, got: 0 },
        }
    }
}

/// Backend-agnostic contract the semantic detector depends on. The shipped
/// [`InMemoryVectorIndex`] is a real, usable implementation, not just a test
/// double; a remote vector database adapter would implement the same trait.
pub trait VectorIndex: Send + Sync {
    fn upsert(&self, entry: CorpusEntry, vector: Vec<f32>) -> Result<(), IndexError>;
    fn delete(&self, pattern_id: &str) -> Result<(), IndexError>;
    fn knn(&self, vector: &[f32], k: usize, category_filter: Option<&str>) -> Result<Vec<VectorHit>, IndexError>;
    fn count(&self) -> usize;
}

struct Entries {
    ann: ann::AnnIndex,
    meta: HashMap<String, CorpusEntry>,
}

/// In-process [`VectorIndex`] implementation. Rebuilds its HNSW graph lazily
/// the first time a search runs after a mutation; callers doing bulk loads
/// can call [`InMemoryVectorIndex::build`] explicitly to avoid paying that
/// cost on the first query.
pub struct InMemoryVectorIndex {
    dimension: usize,
    state: RwLock<Entries>,
}

impl InMemoryVectorIndex {
    pub fn new(dimension: usize, config: AnnConfig) -> Self {
        Self {
            dimension,
            state: RwLock::new(Entries {
                ann: ann::AnnIndex::new(dimension, config),
                meta: HashMap::new(),
            }),
        }
    }

    pub fn build(&self) {
        self.state.write().unwrap().ann.build();
    }
}

impl VectorIndex for InMemoryVectorIndex {
    fn upsert(&self, entry: CorpusEntry, vector: Vec<f32>) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        let mut state = self.state.write().unwrap();
        state.ann.upsert(&entry.pattern_id, vector)?;
        state.meta.insert(entry.pattern_id.clone(), entry);
        Ok(())
    }

    fn delete(&self, pattern_id: &str) -> Result<(), IndexError> {
        let mut state = self.state.write().unwrap();
        state.ann.delete(pattern_id);
        state.meta.remove(pattern_id);
        Ok(())
    }

    fn knn(&self, vector: &[f32], k: usize, category_filter: Option<&str>) -> Result<Vec<VectorHit>, IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        let mut state = self.state.write().unwrap();
        if !state.ann.is_built() {
            state.ann.build();
        }

        // Oversample when filtering by category so the fallback rebuild doesn't
        // starve the caller of `k` matches after exclusions.
        let fetch_k = if category_filter.is_some() { (k * 4).max(k) } else { k };
        let raw = state.ann.search(vector, fetch_k)?;

        let mut hits = Vec::with_capacity(raw.len());
        for result in raw {
            let Some(id) = state.ann.get_id(result.index) else { continue };
            let Some(entry) = state.meta.get(id) else { continue };
            if let Some(filter) = category_filter {
                if entry.category != filter {
                    continue;
                }
            }
            hits.push(VectorHit {
                pattern_id: entry.pattern_id.clone(),
                similarity: 1.0 - result.distance,
                category: entry.category.clone(),
                severity: entry.severity,
                metadata: entry.metadata.clone(),
            });
            if hits.len() == k {
                break;
            }
        }
        Ok(hits)
    }

    fn count(&self) -> usize {
        self.state.read().unwrap().meta.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, category: &str) -> CorpusEntry {
        CorpusEntry {
            pattern_id: id.to_string(),
            text: id.to_string(),
            category: category.to_string(),
            severity: Severity::High,
            metadata: JsonValue::Null,
        }
    }

    #[test]
    fn upsert_then_knn_finds_closest_match() {
        let index = InMemoryVectorIndex::new(2, AnnConfig::default());
        index.upsert(entry("a", "pii"), vec![1.0, 0.0]).unwrap();
        index.upsert(entry("b", "pii"), vec![0.0, 1.0]).unwrap();
        let hits = index.knn(&[0.9, 0.1], 1, None).unwrap();
        assert_eq!(hits[0].pattern_id, "a");
        assert!(hits[0].similarity > 0.8);
    }

    #[test]
    fn category_filter_excludes_other_categories() {
        let index = InMemoryVectorIndex::new(2, AnnConfig::default());
        index.upsert(entry("a", "pii"), vec![1.0, 0.0]).unwrap();
        index.upsert(entry("b", "jailbreak"), vec![0.99, 0.01]).unwrap();
        let hits = index.knn(&[1.0, 0.0], 5, Some("jailbreak")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].pattern_id, "b");
    }

    #[test]
    fn delete_removes_from_future_searches() {
        let index = InMemoryVectorIndex::new(2, AnnConfig::default());
        index.upsert(entry("a", "pii"), vec![1.0, 0.0]).unwrap();
        index.delete("a").unwrap();
        assert_eq!(index.count(), 0);
        assert!(index.knn(&[1.0, 0.0], 5, None).unwrap().is_empty());
    }

    #[test]
    fn dimension_mismatch_on_upsert_is_rejected() {
        let index = InMemoryVectorIndex::new(3, AnnConfig::default());
        let err = index.upsert(entry("a", "pii"), vec![1.0, 0.0]).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 3, got: 2 }));
    }

    #[test]
    fn count_reflects_live_entries() {
        let index = InMemoryVectorIndex::new(2, AnnConfig::default());
        index.upsert(entry("a", "pii"), vec![1.0, 0.0]).unwrap();
        index.upsert(entry("b", "pii"), vec![0.0, 1.0]).unwrap();
        assert_eq!(index.count(), 2);
    }
}
