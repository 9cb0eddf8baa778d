// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ensemble properties: the immutable configuration written at
//! `create()` time. Modeled as a fixed record type with
//! a named field per recognized key rather than a dynamically typed
//! mapping decoded per read.

use serde::{Deserialize, Serialize};

fn default_priority() -> i64 {
    100
}

/// Immutable per-ensemble configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    /// Terminal when `ended >= max_runs`. 0 means unbounded.
    #[serde(default)]
    pub max_runs: u64,

    /// Terminal when `fail >= fail_fast`. 0 disables.
    #[serde(default)]
    pub fail_fast: u64,

    /// Per-run wall-clock limit, in seconds.
    pub timeout: u64,

    /// Scheduling weight. Non-positive values make the ensemble
    /// ineligible for selection.
    #[serde(default = "default_priority")]
    pub priority: i64,

    /// Per-user priority override. When present, replaces `priority`
    /// entirely for weighting purposes.
    #[serde(default)]
    pub username_tagged_priority: Option<i64>,

    /// Excluded from the default active listing; scheduled via the
    /// sanity index instead of the active index.
    #[serde(default)]
    pub sanity: bool,

    /// Owner identity.
    pub username: String,

    /// Informational submission timestamp (ISO 8601).
    pub submitted: String,

    /// Whether `package` chunks are transported zstd-compressed.
    #[serde(default)]
    pub compressed: bool,
}

impl Properties {
    /// The scheduling weight used by the agent's weighted selection.
    /// Non-positive results mean "ineligible".
    pub fn effective_priority(&self) -> i64 {
        self.username_tagged_priority.unwrap_or(self.priority)
    }

    pub fn is_eligible(&self) -> bool {
        self.effective_priority() > 0
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Properties {
    /// Builder-style constructor for tests: sensible defaults, override
    /// only what the test cares about.
    pub fn for_test(username: &str) -> Self {
        Self {
            max_runs: 0,
            fail_fast: 0,
            timeout: 60,
            priority: default_priority(),
            username_tagged_priority: None,
            sanity: false,
            username: username.to_string(),
            submitted: "2026-01-01T00:00:00Z".to_string(),
            compressed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_tagged_priority_overrides_priority() {
        let mut props = Properties::for_test("alice");
        props.priority = 50;
        props.username_tagged_priority = Some(200);
        assert_eq!(props.effective_priority(), 200);
    }

    #[test]
    fn priority_defaults_to_100() {
        let props = Properties::for_test("alice");
        assert_eq!(props.priority, 100);
        assert_eq!(props.effective_priority(), 100);
    }

    #[test]
    fn non_positive_priority_is_ineligible() {
        let mut props = Properties::for_test("alice");
        props.priority = 0;
        assert!(!props.is_eligible());
        props.priority = -5;
        assert!(!props.is_eligible());
    }

    #[test]
    fn serde_roundtrip_preserves_all_fields() {
        let mut props = Properties::for_test("bob");
        props.max_runs = 10;
        props.fail_fast = 3;
        props.sanity = true;
        props.compressed = true;
        props.username_tagged_priority = Some(5);

        let json = serde_json::to_string(&props).unwrap();
        let back: Properties = serde_json::from_str(&json).unwrap();
        assert_eq!(props, back);
    }
}
