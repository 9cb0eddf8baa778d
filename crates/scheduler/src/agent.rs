// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent control loop: Discovering → Selecting
//! → Preparing → Running → Reporting → Idle, with a Retiring branch
//! taken when the global idle timeout elapses or the process is asked
//! to shut down. One ensemble runs at a time; no agent holds a lease,
//! lock, or persisted identity across cycles.

use joshua_core::{JoshuaError, Properties, RunToken};
use joshua_kv::{AgentHeartbeat, KvStore, ListFilter, ListScope};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::select::select_weighted;

/// Configuration for one agent process.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub agent_id: String,
    pub work_dir: PathBuf,
    pub idle_timeout: Duration,
    pub sanity: bool,
    pub keep_failed: bool,
}

/// Why the control loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// No work appeared for `idle_timeout`; exit 0.
    Idle,
    /// `shutdown` was cancelled.
    Cancelled,
}

fn list_scope(sanity: bool) -> ListScope {
    if sanity {
        ListScope::Sanity
    } else {
        ListScope::Active
    }
}

fn random_run_token() -> RunToken {
    RunToken::from_bytes(rand::random())
}

/// Outcome of waiting for the active index to change (or the idle
/// timeout to elapse) when there is currently nothing to run.
enum Wait {
    Cancelled,
    TimedOut,
    WokeUp,
}

async fn wait_for_work(
    store: &Arc<dyn KvStore>,
    sanity: bool,
    shutdown: &CancellationToken,
    remaining: Duration,
) -> Wait {
    if remaining.is_zero() {
        return Wait::TimedOut;
    }
    tokio::select! {
        _ = shutdown.cancelled() => Wait::Cancelled,
        _ = store.watch_active(sanity, remaining) => Wait::WokeUp,
    }
}

/// Run the agent's control loop until it exits idle or is cancelled.
/// Returns `Err` only for fatal errors (`JoshuaError::is_fatal`);
/// transient KV errors are already retried inside `joshua-kv`.
pub async fn run_loop(
    store: Arc<dyn KvStore>,
    config: AgentConfig,
    shutdown: CancellationToken,
) -> Result<LoopExit, JoshuaError> {
    let mut rng = StdRng::from_entropy();
    let mut idle_deadline_base = Instant::now();

    loop {
        if shutdown.is_cancelled() {
            return Ok(LoopExit::Cancelled);
        }

        // -- Discovering --------------------------------------------
        store
            .write_heartbeat(AgentHeartbeat {
                agent_id: config.agent_id.clone(),
                epoch_ms: epoch_ms(),
                current_ensemble: None,
            })
            .await?;

        let mut candidates: Vec<(joshua_core::EnsembleId, Properties)> = store
            .list(ListFilter {
                scope: Some(list_scope(config.sanity)),
                username: None,
            })
            .await?
            .into_iter()
            .map(|row| (row.id, row.properties))
            .collect();

        if candidates.is_empty() {
            let remaining = config.idle_timeout.saturating_sub(idle_deadline_base.elapsed());
            match wait_for_work(&store, config.sanity, &shutdown, remaining).await {
                Wait::TimedOut => return Ok(LoopExit::Idle),
                Wait::Cancelled => return Ok(LoopExit::Cancelled),
                Wait::WokeUp => continue,
            }
        }

        // The queue has something in it; the idle clock only measures
        // continuous emptiness, so reset it here rather than at process
        // start.
        idle_deadline_base = Instant::now();

        // -- Selecting / Preparing ------------------------------------
        // Reselect without replacement if the draw turns out to have
        // already been retired or stopped by the time we read it.
        let prepared = loop {
            let Some(id) = select_weighted(&candidates, &mut rng) else {
                break None;
            };
            let snapshot = store.prepare(id, config.sanity).await?;
            if snapshot.still_active {
                break Some((id, snapshot));
            }
            candidates.retain(|(cid, _)| *cid != id);
            if candidates.is_empty() {
                break None;
            }
        };

        let Some((id, snapshot)) = prepared else {
            // Every candidate was ineligible (non-positive priority) or
            // vanished by the time we tried to prepare it. Wait for the
            // active index to change instead of spinning on `list`.
            let remaining = config.idle_timeout.saturating_sub(idle_deadline_base.elapsed());
            match wait_for_work(&store, config.sanity, &shutdown, remaining).await {
                Wait::TimedOut => return Ok(LoopExit::Idle),
                Wait::Cancelled => return Ok(LoopExit::Cancelled),
                Wait::WokeUp => continue,
            }
        };

        store
            .write_heartbeat(AgentHeartbeat {
                agent_id: config.agent_id.clone(),
                epoch_ms: epoch_ms(),
                current_ensemble: Some(id),
            })
            .await?;

        // -- Running ---------------------------------------------------
        let workdir = joshua_sandbox::materialize(&config.work_dir, &id, snapshot.package)
            .await
            .map_err(|e| JoshuaError::SandboxEnvironment(e.to_string()))?;

        let run_options = joshua_sandbox::process::RunOptions {
            timeout: Duration::from_secs(snapshot.properties.timeout),
            ..Default::default()
        };

        // A cancellation observed here is not raced against the run: the
        // sandbox already enforces `Properties::timeout`, and letting a
        // started run finish (rather than tearing it down mid-flight)
        // keeps the Reporting transaction's result/counters in step with
        // what actually executed. Shutdown takes effect at the next
        // Discovering boundary.
        let outcome = joshua_sandbox::run(&workdir.entrypoint, &workdir.path, run_options)
            .await
            .map_err(|e| JoshuaError::SandboxEnvironment(e.to_string()))?;

        // -- Reporting / Retiring --------------------------------------
        // A concurrent delete can remove the ensemble record between
        // Preparing and here; treat the resulting NotFound as a no-op
        // write rather than a fatal error and go back to Discovering.
        let report = store
            .report_result(
                id,
                config.sanity,
                random_run_token(),
                outcome.elapsed_seconds,
                outcome.exit_class,
                outcome.output,
            )
            .await;

        joshua_sandbox::cleanup(workdir, config.keep_failed, !outcome.exit_class.is_pass())
            .await
            .map_err(|e| JoshuaError::SandboxEnvironment(e.to_string()))?;

        match report {
            Ok(outcome_report) => {
                outcome_report.counters.check_invariant().map_err(JoshuaError::InvariantViolation)?;
                if outcome_report.retired {
                    tracing::info!(%id, counters = ?outcome_report.counters, "ensemble retired");
                }
            }
            Err(JoshuaError::NotFound(_)) => {
                tracing::info!(%id, "ensemble vanished before its result could be reported");
                idle_deadline_base = Instant::now();
                continue;
            }
            Err(err) => return Err(err),
        }

        if shutdown.is_cancelled() {
            return Ok(LoopExit::Cancelled);
        }
    }
}

fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use joshua_kv::memory_store;

    fn config(work_dir: PathBuf) -> AgentConfig {
        AgentConfig {
            agent_id: "test-agent".into(),
            work_dir,
            idle_timeout: Duration::from_millis(100),
            sanity: false,
            keep_failed: false,
        }
    }

    #[tokio::test]
    async fn exits_idle_when_no_work_is_available() {
        let store = memory_store();
        let tmp = tempfile::tempdir().unwrap();
        let shutdown = CancellationToken::new();
        let exit = run_loop(store, config(tmp.path().to_path_buf()), shutdown)
            .await
            .unwrap();
        assert_eq!(exit, LoopExit::Idle);
    }

    #[tokio::test]
    async fn runs_a_submitted_ensemble_and_reports_a_result() {
        let store = memory_store();
        let tmp = tempfile::tempdir().unwrap();

        let mut props = Properties::for_test("alice");
        props.max_runs = 1;
        props.timeout = 5;
        let script = b"#!/bin/sh\nexit 0\n".to_vec();
        let id = store.create(props, script).await.unwrap();

        let shutdown = CancellationToken::new();
        let exit = run_loop(store.clone(), config(tmp.path().to_path_buf()), shutdown)
            .await
            .unwrap();
        assert_eq!(exit, LoopExit::Idle);

        let results = store.tail(id, false).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].exit_class.is_pass());
        assert_eq!(store.count_active(false).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn shutdown_token_stops_the_loop_when_already_cancelled() {
        let store = memory_store();
        let tmp = tempfile::tempdir().unwrap();
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let exit = run_loop(store, config(tmp.path().to_path_buf()), shutdown)
            .await
            .unwrap();
        assert_eq!(exit, LoopExit::Cancelled);
    }
}
