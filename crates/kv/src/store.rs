// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The transactional surface every backend implements, and the explicit
//! context object clients and the agent hold. An ambient, lazily-initialized
//! global KV handle was rejected in favor of passing `KvStore` explicitly
//! wherever it is needed, with a lifecycle of open-on-start, close-on-exit,
//! mirroring `oj-engine`'s `Runtime<S, A, N, C>` generic-context pattern.

use async_trait::async_trait;
use joshua_core::{Counters, EnsembleId, JoshuaError, Properties, RunToken};
use std::time::Duration;

pub type Result<T> = std::result::Result<T, JoshuaError>;

/// Which index/scan `list()` draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    /// Ensembles currently in the default active index.
    Active,
    /// Ensembles currently in the sanity index.
    Sanity,
    /// Ensembles no longer in either index (retired or stopped).
    Stopped,
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub scope: Option<ListScope>,
    pub username: Option<String>,
}

/// One (id, properties, counters) row returned by `list()`.
#[derive(Debug, Clone)]
pub struct EnsembleSummary {
    pub id: EnsembleId,
    pub properties: Properties,
    pub counters: Counters,
}

/// The outcome of submitting one run's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOutcome {
    pub counters: Counters,
    /// Whether this transaction observed a terminal condition and
    /// removed the ensemble from its index. Idempotent: a second agent
    /// reporting after retirement still gets `retired = true` back, but
    /// performs no additional write.
    pub retired: bool,
}

/// Snapshot read used by the agent's Preparing step:
/// properties, package bytes, and whether the id is still active, all
/// read at one consistent point in time.
#[derive(Debug, Clone)]
pub struct PreparedEnsemble {
    pub properties: Properties,
    pub package: Vec<u8>,
    pub still_active: bool,
}

/// A lightweight, best-effort liveness record.
/// Nothing in the scheduling path reads this; it exists purely so
/// operators and the autoscaler contract can see live agents.
#[derive(Debug, Clone)]
pub struct AgentHeartbeat {
    pub agent_id: String,
    pub epoch_ms: u64,
    pub current_ensemble: Option<EnsembleId>,
}

/// The full transactional surface consumed by the Ensemble Model API,
/// the agent scheduler, and the autoscaler contract.
///
/// Every method here is one logical transaction unless its doc comment
/// says otherwise.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// `create(properties, package_bytes) -> ensemble_id`.
    ///
    /// Splits `package_bytes` into `PACKAGE_CHUNK_SIZE` chunks. If the
    /// whole write would exceed one transaction's budget, the write is
    /// split across multiple transactions, but the index insert and
    /// property write happen only in the final one, so a concurrent
    /// reader never observes a partially-installed ensemble.
    async fn create(&self, properties: Properties, package: Vec<u8>) -> Result<EnsembleId>;

    /// Snapshot read of the requested scope, filtered and ordered.
    /// Eager (not lazily streamed) in this workspace: ensembles
    /// comfortably fit the sizes this fabric targets.
    async fn list(&self, filter: ListFilter) -> Result<Vec<EnsembleSummary>>;

    /// Atomically removes `id` from the active/sanity indices. Does not
    /// touch counters. Idempotent.
    async fn stop(&self, id: EnsembleId) -> Result<()>;

    /// Atomically removes every ensemble owned by `username` from the
    /// active/sanity indices.
    async fn stop_username(&self, username: &str) -> Result<()>;

    /// Ranged clear of all five subspaces for `id`. The only operation
    /// that destroys state.
    async fn delete(&self, id: EnsembleId) -> Result<()>;

    /// `tail(id, mode)`: run results in reverse-completion order.
    /// `errors_only` filters to `ExitClass::Fail`.
    async fn tail(
        &self,
        id: EnsembleId,
        errors_only: bool,
    ) -> Result<Vec<joshua_core::RunResult>>;

    /// Reassembles the package's chunks in order.
    async fn read_package(&self, id: EnsembleId) -> Result<Vec<u8>>;

    /// Cardinality of the active (or sanity) index — the entire
    /// Autoscaler Interface contract.
    async fn count_active(&self, sanity: bool) -> Result<usize>;

    // -- Agent-facing operations --------------------

    /// The ids currently in the active or sanity index, for Discovering.
    async fn active_ids(&self, sanity: bool) -> Result<Vec<EnsembleId>>;

    /// Block until the active (or sanity) index changes, or `timeout`
    /// elapses, whichever comes first. One of the three suspension
    /// points an agent may block on.
    async fn watch_active(&self, sanity: bool, timeout: Duration);

    /// Snapshot read of properties + package for Preparing. Also
    /// reports whether `id` is still in the index at the moment of the
    /// read, so the caller can abandon without wasting sandbox work.
    async fn prepare(&self, id: EnsembleId, sanity: bool) -> Result<PreparedEnsemble>;

    /// The single Reporting transaction: append the run result,
    /// increment counters, and retire if a terminal condition is now
    /// met. Committed even if `id` is already absent from the index.
    async fn report_result(
        &self,
        id: EnsembleId,
        sanity: bool,
        run_token: RunToken,
        elapsed_seconds: u64,
        exit_class: joshua_core::ExitClass,
        output: Vec<u8>,
    ) -> Result<ReportOutcome>;

    /// Best-effort heartbeat write; never read by the scheduling path.
    async fn write_heartbeat(&self, heartbeat: AgentHeartbeat) -> Result<()>;

    /// All heartbeats not older than `max_age`, for `joshua agent list`.
    async fn list_heartbeats(&self, max_age: Duration) -> Result<Vec<AgentHeartbeat>>;
}
