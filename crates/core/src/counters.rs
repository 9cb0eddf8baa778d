// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ensemble counters: a fixed record type with one named field per
//! counter. The set is closed and rarely changes, so this replaces the
//! dynamically-decoded mapping the original system used.
//!
//! Each field is maintained by atomic addition at the KV layer
//! (`joshua-kv`); this type is the in-memory view after a snapshot read.

use crate::properties::Properties;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub started: u64,
    pub ended: u64,
    pub pass: u64,
    pub fail: u64,
    /// Cumulative wall-clock runtime across all runs, in seconds.
    pub runtime: u64,
    /// Count of passing runs whose wall time exceeded `LONG_RUN_SECONDS`.
    pub pass_5min: u64,
    /// Count of failing runs whose wall time exceeded `LONG_RUN_SECONDS`.
    pub fail_5min: u64,
}

/// The delta applied by one completed run.
#[derive(Debug, Clone, Copy)]
pub struct CounterDelta {
    pub pass: bool,
    pub elapsed_seconds: u64,
}

impl Counters {
    /// Apply one run's result in place, as the agent does inside its
    /// single Reporting transaction.
    pub fn apply(&mut self, delta: CounterDelta) {
        self.started += 1;
        self.ended += 1;
        self.runtime += delta.elapsed_seconds;
        let long_run = delta.elapsed_seconds > crate::LONG_RUN_SECONDS;
        if delta.pass {
            self.pass += 1;
            if long_run {
                self.pass_5min += 1;
            }
        } else {
            self.fail += 1;
            if long_run {
                self.fail_5min += 1;
            }
        }
    }

    /// `ended == pass + fail` must hold after every completing
    /// transaction. Violation is fatal.
    pub fn check_invariant(&self) -> Result<(), String> {
        if self.ended != self.pass + self.fail {
            return Err(format!(
                "ended ({}) != pass ({}) + fail ({})",
                self.ended, self.pass, self.fail
            ));
        }
        if self.runtime < crate::LONG_RUN_SECONDS * (self.pass_5min + self.fail_5min) {
            return Err(format!(
                "runtime ({}) below the minimum implied by pass_5min+fail_5min ({})",
                self.runtime,
                self.pass_5min + self.fail_5min
            ));
        }
        Ok(())
    }

    /// Terminal conditions, evaluated post-increment: `max_runs > 0 AND
    /// ended >= max_runs`, or `fail_fast > 0 AND fail >= fail_fast`.
    pub fn is_terminal(&self, props: &Properties) -> bool {
        (props.max_runs > 0 && self.ended >= props.max_runs)
            || (props.fail_fast > 0 && self.fail >= props.fail_fast)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_keeps_ended_equal_to_pass_plus_fail() {
        let mut counters = Counters::default();
        counters.apply(CounterDelta { pass: true, elapsed_seconds: 3 });
        counters.apply(CounterDelta { pass: false, elapsed_seconds: 400 });
        assert_eq!(counters.ended, 2);
        assert_eq!(counters.pass, 1);
        assert_eq!(counters.fail, 1);
        assert_eq!(counters.fail_5min, 1);
        assert_eq!(counters.pass_5min, 0);
        assert!(counters.check_invariant().is_ok());
    }

    #[test]
    fn max_runs_zero_is_unbounded() {
        let props = Properties::for_test("a");
        let mut counters = Counters::default();
        counters.ended = 1000;
        assert!(!counters.is_terminal(&props));
    }

    #[test]
    fn max_runs_triggers_retirement() {
        let mut props = Properties::for_test("a");
        props.max_runs = 6;
        let mut counters = Counters::default();
        counters.ended = 5;
        assert!(!counters.is_terminal(&props));
        counters.ended = 6;
        assert!(counters.is_terminal(&props));
    }

    #[test]
    fn fail_fast_triggers_retirement_independent_of_max_runs() {
        let mut props = Properties::for_test("a");
        props.fail_fast = 3;
        let mut counters = Counters::default();
        counters.ended = 1;
        counters.fail = 3;
        assert!(counters.is_terminal(&props));
    }

    #[test]
    fn invariant_detects_corruption() {
        let counters = Counters { started: 2, ended: 2, pass: 3, fail: 0, runtime: 0, pass_5min: 0, fail_5min: 0 };
        assert!(counters.check_invariant().is_err());
    }
}
