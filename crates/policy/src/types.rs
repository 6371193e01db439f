use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use types::{Action, Severity};

/// A single rule in a policy's rule table. Fires against a [`types::Detection`]
/// when `categories` is empty or contains the detection's category, and
/// `severity` is absent or equals the detection's severity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    #[serde(rename = "type")]
    pub rule_type: String,
    #[serde(default = "Rule::default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub severity: Option<Severity>,
    pub action: Action,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl Rule {
    fn default_enabled() -> bool {
        true
    }
}

/// A named, versioned decision procedure over detections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Policy {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "Policy::default_version")]
    pub version: String,
    #[serde(default = "Policy::default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Policy {
    fn default_enabled() -> bool {
        true
    }

    fn default_version() -> String {
        "v1".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Allowlist {
    #[serde(default)]
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Denylist {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub phrases: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub default_policy: String,
}

/// Raw, deserializable policy document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub settings: Settings,
    #[serde(default)]
    pub policies: BTreeMap<String, Policy>,
    #[serde(default)]
    pub allowlist: Allowlist,
    #[serde(default)]
    pub denylist: Denylist,
}

/// Errors raised while loading, validating, or evaluating a policy document.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("failed to read policy file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("failed to parse policy yaml: {0}")]
    YamlParse(#[from] serde_yaml::Error),
    #[error("invalid denylist regex '{0}': {1}")]
    InvalidPattern(String, String),
    #[error("policy '{0}' not found")]
    UnknownPolicy(String),
    #[error("policy '{0}' is disabled")]
    PolicyDisabled(String),
    #[error("policy document has no default_policy and none was requested")]
    NoDefaultPolicy,
}
