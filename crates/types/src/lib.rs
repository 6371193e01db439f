//! Shared data model for the prompt firewall: detections, policies' outcome
//! types, and the wire-level [`ValidationResult`].
//!
//! Kept dependency-free of any detector or store implementation so that
//! every stage of the pipeline (and every test double) can speak the same
//! vocabulary without pulling in `tokio`, `regex`, or a vector index.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Ordered severity level attached to a [`Detection`].
///
/// Ordering matters: policy evaluation and the `>` / `>=` comparisons used
/// by rule matching rely on the derived `PartialOrd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Parses a severity label, defaulting to [`Severity::Medium`] for
    /// anything unrecognized rather than failing a whole pattern load.
    pub fn parse_or_medium(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "low" => Severity::Low,
            "high" => Severity::High,
            "critical" => Severity::Critical,
            _ => Severity::Medium,
        }
    }
}

/// Which detector produced a [`Detection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionKind {
    Regex,
    Contextual,
    Semantic,
}

/// A byte-offset span within the original prompt text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A single piece of evidence that a prompt contains something interesting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub kind: DetectionKind,
    pub matched_pattern: String,
    pub confidence: f32,
    pub severity: Severity,
    pub category: String,
    #[serde(default)]
    pub positions: Vec<Span>,
    #[serde(default)]
    pub metadata: BTreeMap<String, JsonValue>,
}

impl Detection {
    pub fn regex(pattern: &str, category: &str, severity: Severity) -> Self {
        Self {
            kind: DetectionKind::Regex,
            matched_pattern: pattern.to_string(),
            confidence: 1.0,
            severity,
            category: category.to_string(),
            positions: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_positions(mut self, positions: Vec<Span>) -> Self {
        self.positions = positions;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Final action a policy assigns to a prompt, ordered by strictness.
///
/// `Block` latches: once a rule table run raises it, no later rule may
/// demote the decision back to `Warn` or `Allow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Allow,
    Warn,
    Block,
}

/// User-facing outcome of a validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Allowed,
    Warned,
    Blocked,
    Error,
}

impl From<Action> for Status {
    fn from(action: Action) -> Self {
        match action {
            Action::Allow => Status::Allowed,
            Action::Warn => Status::Warned,
            Action::Block => Status::Blocked,
        }
    }
}

impl Status {
    pub fn is_safe(self) -> bool {
        matches!(self, Status::Allowed | Status::Warned)
    }
}

/// A prompt submitted for validation, plus its optional routing context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub text: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub policy_id: Option<String>,
    #[serde(default)]
    pub context: BTreeMap<String, JsonValue>,
}

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            user_id: None,
            policy_id: None,
            context: BTreeMap::new(),
        }
    }
}

/// The result of validating a single prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: Status,
    pub is_safe: bool,
    pub detections: Vec<Detection>,
    pub policy_id: String,
    pub latency_ms: f64,
    pub message: String,
    pub cached: bool,
    pub request_id: String,
}

impl ValidationResult {
    pub fn from_action(
        action: Action,
        detections: Vec<Detection>,
        policy_id: impl Into<String>,
        message: impl Into<String>,
        request_id: impl Into<String>,
        latency_ms: f64,
    ) -> Self {
        let status = Status::from(action);
        Self {
            is_safe: status.is_safe(),
            status,
            detections,
            policy_id: policy_id.into(),
            latency_ms,
            message: message.into(),
            cached: false,
            request_id: request_id.into(),
        }
    }

    pub fn error(
        policy_id: impl Into<String>,
        message: impl Into<String>,
        request_id: impl Into<String>,
        latency_ms: f64,
    ) -> Self {
        Self {
            status: Status::Error,
            is_safe: false,
            detections: Vec::new(),
            policy_id: policy_id.into(),
            latency_ms,
            message: message.into(),
            cached: false,
            request_id: request_id.into(),
        }
    }

    /// Re-stamps a cached result for a new request: detections and status
    /// carry over, latency and the cached flag do not.
    pub fn served_from_cache(mut self, latency_ms: f64) -> Self {
        self.cached = true;
        self.latency_ms = latency_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_parse_unknown_defaults_medium() {
        assert_eq!(Severity::parse_or_medium("low"), Severity::Low);
        assert_eq!(Severity::parse_or_medium("CRITICAL"), Severity::Critical);
        assert_eq!(Severity::parse_or_medium("nonsense"), Severity::Medium);
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn action_to_status_mapping() {
        assert_eq!(Status::from(Action::Allow), Status::Allowed);
        assert_eq!(Status::from(Action::Warn), Status::Warned);
        assert_eq!(Status::from(Action::Block), Status::Blocked);
    }

    #[test]
    fn is_safe_matches_status() {
        assert!(Status::Allowed.is_safe());
        assert!(Status::Warned.is_safe());
        assert!(!Status::Blocked.is_safe());
        assert!(!Status::Error.is_safe());
    }

    #[test]
    fn validation_result_from_action_sets_is_safe() {
        let r = ValidationResult::from_action(Action::Block, vec![], "default", "blocked", "abc123", 1.2);
        assert_eq!(r.status, Status::Blocked);
        assert!(!r.is_safe);
        assert!(!r.cached);
    }

    #[test]
    fn served_from_cache_keeps_detections_restamps_latency() {
        let det = Detection::regex("aws_key", "api_keys", Severity::High);
        let r = ValidationResult::from_action(Action::Warn, vec![det.clone()], "default", "warned", "abc", 3.0)
            .served_from_cache(0.4);
        assert!(r.cached);
        assert_eq!(r.latency_ms, 0.4);
        assert_eq!(r.detections, vec![det]);
    }

    #[test]
    fn action_ordering_block_is_strictest() {
        assert!(Action::Block > Action::Warn);
        assert!(Action::Warn > Action::Allow);
    }
}
