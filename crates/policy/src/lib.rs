//! Decides what happens to a prompt once detections are in hand.
//!
//! A [`PolicyEngine`] holds a hot-reloadable [`PolicyDocument`]: a global
//! denylist/allowlist plus a set of named, versioned [`Policy`] rule tables.
//! [`PolicyEngine::evaluate`] walks denylist, then allowlist, then the
//! selected policy's rules, in that order, and returns the strictest
//! [`types::Action`] any layer raised.
//!
//! ```yaml
//! settings:
//!   default_policy: default
//! policies:
//!   default:
//!     name: Default policy
//!     rules:
//!       - type: block_critical
//!         action: block
//!         severity: critical
//! denylist:
//!   keywords: ["ignore previous instructions"]
//! ```

mod engine;
mod types;

pub use engine::PolicyEngine;
pub use types::{Allowlist, Denylist, Policy, PolicyDocument, PolicyError, Rule, Settings};
