// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plain-text rendering for `joshua` command output, grounded on the
//! teacher's `oj` CLI output module's shape (text-first, no colorizing
//! machinery this workspace doesn't need).

use joshua_core::{Counters, EnsembleId, Properties, RunResult};
use joshua_kv::EnsembleSummary;

/// Render one `list` row: id, owner, terminal counters, priority.
pub fn format_summary_row(summary: &EnsembleSummary) -> String {
    let Counters { started, ended, pass, fail, .. } = summary.counters;
    format!(
        "{id}  {user:<12}  priority={priority:<5}  started={started} ended={ended} pass={pass} fail={fail}",
        id = summary.id,
        user = summary.properties.username,
        priority = summary.properties.effective_priority(),
    )
}

/// Render a `tail` entry: run token, outcome, elapsed time, and
/// optionally the captured output.
pub fn format_run_result(result: &RunResult, raw: bool) -> String {
    let status = if result.exit_class.is_pass() { "PASS" } else { "FAIL" };
    let header = format!(
        "{token}  {status}  {elapsed}s",
        token = result.run_token,
        elapsed = result.elapsed_seconds,
    );
    if raw {
        format!("{header}\n{}", String::from_utf8_lossy(&result.output))
    } else {
        header
    }
}

/// Render the one-line autoscaler-style summary for `joshua status`.
pub fn format_status(active: usize, sanity_active: usize) -> String {
    format!("active={active} sanity_active={sanity_active}")
}

/// Render a single submitted id for `joshua submit`.
pub fn format_submitted(id: EnsembleId, properties: &Properties) -> String {
    format!("{id}  owner={}  timeout={}s", properties.username, properties.timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use joshua_core::RunToken;

    #[test]
    fn summary_row_includes_owner_and_counters() {
        let summary = EnsembleSummary {
            id: EnsembleId::from_bytes([0; 10]),
            properties: Properties::for_test("alice"),
            counters: Counters {
                started: 3,
                ended: 3,
                pass: 2,
                fail: 1,
                ..Counters::default()
            },
        };
        let line = format_summary_row(&summary);
        assert!(line.contains("alice"));
        assert!(line.contains("pass=2"));
        assert!(line.contains("fail=1"));
    }

    #[test]
    fn run_result_omits_output_unless_raw() {
        let result = RunResult {
            run_token: RunToken::from_bytes([1; 16]),
            elapsed_seconds: 4,
            exit_class: joshua_core::ExitClass::Fail,
            output: b"boom".to_vec(),
        };
        assert!(!format_run_result(&result, false).contains("boom"));
        assert!(format_run_result(&result, true).contains("boom"));
    }
}
