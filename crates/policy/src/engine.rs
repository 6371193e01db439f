use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use regex::Regex;
use serde_json::Value as JsonValue;
use types::{Action, Detection};

use crate::types::{Policy, PolicyDocument, PolicyError};

struct CompiledDenylist {
    keywords: Vec<String>,
    phrases: Vec<String>,
    patterns: Vec<Regex>,
}

struct CompiledDocument {
    default_policy: String,
    policies: BTreeMap<String, Policy>,
    allowlist_patterns: Vec<String>,
    denylist: CompiledDenylist,
}

impl CompiledDocument {
    fn compile(doc: &PolicyDocument) -> Self {
        let patterns = doc
            .denylist
            .patterns
            .iter()
            .filter_map(|p| match Regex::new(&format!("(?i){p}")) {
                Ok(re) => Some(re),
                Err(err) => {
                    tracing::warn!(pattern = %p, %err, "skipping invalid denylist regex");
                    None
                }
            })
            .collect();

        Self {
            default_policy: doc.settings.default_policy.clone(),
            policies: doc.policies.clone(),
            allowlist_patterns: doc.allowlist.patterns.iter().map(|p| p.to_lowercase()).collect(),
            denylist: CompiledDenylist {
                keywords: doc.denylist.keywords.iter().map(|k| k.to_lowercase()).collect(),
                phrases: doc.denylist.phrases.iter().map(|p| p.to_lowercase()).collect(),
                patterns,
            },
        }
    }
}

/// Evaluates prompts against a named, hot-reloadable policy document.
///
/// Decision order per request: denylist, then allowlist, then "no
/// detections at all", then the selected policy's rule table, then a
/// final allow. A `Block` decision latches through the rule table: once
/// raised it is never demoted by a later rule.
pub struct PolicyEngine {
    compiled: ArcSwap<CompiledDocument>,
}

impl PolicyEngine {
    pub fn new(doc: &PolicyDocument) -> Self {
        Self {
            compiled: ArcSwap::from_pointee(CompiledDocument::compile(doc)),
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, PolicyError> {
        let doc: PolicyDocument = serde_yaml::from_str(yaml)?;
        Ok(Self::new(&doc))
    }

    pub fn from_yaml_path(path: impl AsRef<std::path::Path>) -> Result<Self, PolicyError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn reload(&self, doc: &PolicyDocument) {
        self.compiled.store(Arc::new(CompiledDocument::compile(doc)));
    }

    /// The policy id `evaluate` resolves to when `policy_id` is `None`.
    pub fn default_policy_id(&self) -> String {
        self.compiled.load().default_policy.clone()
    }

    pub fn evaluate(
        &self,
        prompt: &str,
        detections: &[Detection],
        policy_id: Option<&str>,
        _ctx: &BTreeMap<String, JsonValue>,
    ) -> Result<(Action, String, String), PolicyError> {
        let snapshot = self.compiled.load();
        let policy_id = policy_id.unwrap_or(&snapshot.default_policy).to_string();
        let policy = snapshot
            .policies
            .get(&policy_id)
            .ok_or_else(|| PolicyError::UnknownPolicy(policy_id.clone()))?;
        if !policy.enabled {
            return Err(PolicyError::PolicyDisabled(policy_id));
        }

        let lowered = prompt.to_lowercase();

        if snapshot.denylist.keywords.iter().any(|k| lowered.contains(k.as_str()))
            || snapshot.denylist.phrases.iter().any(|p| lowered.contains(p.as_str()))
            || snapshot.denylist.patterns.iter().any(|re| re.is_match(prompt))
        {
            return Ok((
                Action::Block,
                "Prompt contains denied keywords or phrases".to_string(),
                policy_id,
            ));
        }

        if snapshot.allowlist_patterns.iter().any(|p| lowered.contains(p.as_str())) {
            return Ok((Action::Allow, "Prompt matches allowlist".to_string(), policy_id));
        }

        if detections.is_empty() {
            return Ok((Action::Allow, "No sensitive data detected".to_string(), policy_id));
        }

        let mut final_action = Action::Allow;
        let mut reasons = Vec::new();
        for rule in policy.rules.iter().filter(|r| r.enabled) {
            for detection in detections {
                let category_matches = rule.categories.is_empty() || rule.categories.contains(&detection.category);
                let severity_matches = rule.severity.is_none_or(|s| s == detection.severity);
                if category_matches && severity_matches {
                    if rule.action > final_action {
                        final_action = rule.action;
                    }
                    reasons.push(format!(
                        "rule '{}' matched category '{}'",
                        rule.rule_type, detection.category
                    ));
                }
            }
        }

        if reasons.is_empty() {
            return Ok((Action::Allow, "No policy rules triggered".to_string(), policy_id));
        }

        reasons.truncate(3);
        Ok((final_action, reasons.join("; "), policy_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{Detection, Severity};

    fn doc() -> PolicyDocument {
        serde_yaml::from_str(
            r#"
settings:
  default_policy: default
policies:
  default:
    name: Default
    rules:
      - type: block_critical
        action: block
        severity: critical
        categories: []
      - type: warn_pii
        action: warn
        categories: [pii]
allowlist:
  patterns: ["this is a safe phrase"]
denylist:
  keywords: ["drop table"]
  phrases: ["rm -rf /"]
  patterns: ["\\bnuke\\b"]
"#,
        )
        .unwrap()
    }

    fn ctx() -> BTreeMap<String, JsonValue> {
        BTreeMap::new()
    }

    #[test]
    fn denylist_keyword_blocks_regardless_of_detections() {
        let engine = PolicyEngine::new(&doc());
        let (action, reason, _) = engine.evaluate("please drop table users", &[], None, &ctx()).unwrap();
        assert_eq!(action, Action::Block);
        assert!(reason.contains("denied"));
    }

    #[test]
    fn allowlist_match_allows_even_with_detections() {
        let engine = PolicyEngine::new(&doc());
        let detections = vec![Detection::regex("ssn", "pii", Severity::Critical)];
        let (action, _, _) = engine
            .evaluate("this is a safe phrase with an ssn", &detections, None, &ctx())
            .unwrap();
        assert_eq!(action, Action::Allow);
    }

    #[test]
    fn no_detections_allows() {
        let engine = PolicyEngine::new(&doc());
        let (action, reason, _) = engine.evaluate("totally fine prompt", &[], None, &ctx()).unwrap();
        assert_eq!(action, Action::Allow);
        assert_eq!(reason, "No sensitive data detected");
    }

    #[test]
    fn critical_severity_rule_blocks() {
        let engine = PolicyEngine::new(&doc());
        let detections = vec![Detection::regex("key", "api_keys", Severity::Critical)];
        let (action, _, _) = engine.evaluate("leak this", &detections, None, &ctx()).unwrap();
        assert_eq!(action, Action::Block);
    }

    #[test]
    fn pii_rule_warns_without_latching_to_block() {
        let engine = PolicyEngine::new(&doc());
        let detections = vec![Detection::regex("email", "pii", Severity::Medium)];
        let (action, _, _) = engine.evaluate("my email is x", &detections, None, &ctx()).unwrap();
        assert_eq!(action, Action::Warn);
    }

    #[test]
    fn block_latches_over_later_warn_rules() {
        let engine = PolicyEngine::new(&doc());
        let detections = vec![
            Detection::regex("key", "api_keys", Severity::Critical),
            Detection::regex("email", "pii", Severity::Medium),
        ];
        let (action, _, _) = engine.evaluate("mixed", &detections, None, &ctx()).unwrap();
        assert_eq!(action, Action::Block);
    }

    #[test]
    fn default_policy_id_reflects_settings() {
        let engine = PolicyEngine::new(&doc());
        assert_eq!(engine.default_policy_id(), "default");
    }

    #[test]
    fn unknown_policy_id_errors() {
        let engine = PolicyEngine::new(&doc());
        let err = engine.evaluate("x", &[], Some("nonexistent"), &ctx()).unwrap_err();
        assert!(matches!(err, PolicyError::UnknownPolicy(_)));
    }

    #[test]
    fn reload_replaces_rules_atomically() {
        let engine = PolicyEngine::new(&doc());
        let empty: PolicyDocument = serde_yaml::from_str(
            r#"
settings:
  default_policy: default
policies:
  default:
    name: Default
"#,
        )
        .unwrap();
        engine.reload(&empty);
        let detections = vec![Detection::regex("key", "api_keys", Severity::Critical)];
        let (action, reason, _) = engine.evaluate("x", &detections, None, &ctx()).unwrap();
        assert_eq!(action, Action::Allow);
        assert_eq!(reason, "No policy rules triggered");
    }
}
