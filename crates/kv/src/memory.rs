// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! An in-process, ordered KV store implementing [`KvStore`] without any
//! external cluster. This is what the workspace's tests run against;
//! it is not meant for production use, which talks to real FoundationDB
//! via the `fdb` feature's backend instead.
//!
//! Despite being in-memory, it honors the same externally observable
//! contract as the real backend: ids are monotonically increasing
//! versionstamp-shaped tokens, counters are updated atomically with
//! result appends, and the active index supports a blocking watch.

use crate::store::{
    AgentHeartbeat, KvStore, ListFilter, ListScope, PreparedEnsemble, ReportOutcome,
};
use async_trait::async_trait;
use joshua_core::{
    Counters, EnsembleId, ExitClass, JoshuaError, Properties, RunResult, RunToken,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

type Result<T> = crate::store::Result<T>;

#[derive(Clone)]
struct EnsembleRecord {
    properties: Properties,
    counters: Counters,
    package: Vec<u8>,
    results: Vec<RunResult>,
    deleted: bool,
}

struct Inner {
    ensembles: HashMap<EnsembleId, EnsembleRecord>,
    active: BTreeSet<EnsembleId>,
    sanity: BTreeSet<EnsembleId>,
    heartbeats: HashMap<String, AgentHeartbeat>,
}

/// In-memory [`KvStore`] backend, safe to share across agent tasks via
/// `Arc`.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    next_versionstamp: AtomicU64,
    active_changed: Notify,
    sanity_changed: Notify,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                ensembles: HashMap::new(),
                active: BTreeSet::new(),
                sanity: BTreeSet::new(),
                heartbeats: HashMap::new(),
            }),
            next_versionstamp: AtomicU64::new(1),
            active_changed: Notify::new(),
            sanity_changed: Notify::new(),
        }
    }

    fn next_id(&self) -> EnsembleId {
        let counter = self.next_versionstamp.fetch_add(1, Ordering::SeqCst);
        let mut bytes = [0u8; 10];
        bytes[..8].copy_from_slice(&counter.to_be_bytes());
        EnsembleId::from_bytes(bytes)
    }

    fn notify_index(&self, sanity: bool) {
        if sanity {
            self.sanity_changed.notify_waiters();
        } else {
            self.active_changed.notify_waiters();
        }
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn create(&self, properties: Properties, package: Vec<u8>) -> Result<EnsembleId> {
        let id = self.next_id();
        let sanity = properties.sanity;
        let package = crate::compression::compress_if_needed(package, properties.compressed)?;
        let record = EnsembleRecord {
            properties,
            counters: Counters::default(),
            package,
            results: Vec::new(),
            deleted: false,
        };
        {
            let mut inner = self.inner.lock();
            inner.ensembles.insert(id, record);
            if sanity {
                inner.sanity.insert(id);
            } else {
                inner.active.insert(id);
            }
        }
        self.notify_index(sanity);
        Ok(id)
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<crate::store::EnsembleSummary>> {
        let inner = self.inner.lock();
        let mut rows = Vec::new();
        for (&id, record) in inner.ensembles.iter() {
            if record.deleted {
                continue;
            }
            let in_active = inner.active.contains(&id);
            let in_sanity = inner.sanity.contains(&id);
            let matches_scope = match filter.scope {
                None => true,
                Some(ListScope::Active) => in_active,
                Some(ListScope::Sanity) => in_sanity,
                Some(ListScope::Stopped) => !in_active && !in_sanity,
            };
            if !matches_scope {
                continue;
            }
            if let Some(ref username) = filter.username {
                if &record.properties.username != username {
                    continue;
                }
            }
            rows.push(crate::store::EnsembleSummary {
                id,
                properties: record.properties.clone(),
                counters: record.counters,
            });
        }
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }

    async fn stop(&self, id: EnsembleId) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.active.remove(&id);
        inner.sanity.remove(&id);
        Ok(())
    }

    async fn stop_username(&self, username: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let matching: Vec<EnsembleId> = inner
            .ensembles
            .iter()
            .filter(|(_, r)| r.properties.username == username)
            .map(|(&id, _)| id)
            .collect();
        for id in matching {
            inner.active.remove(&id);
            inner.sanity.remove(&id);
        }
        Ok(())
    }

    async fn delete(&self, id: EnsembleId) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.active.remove(&id);
        inner.sanity.remove(&id);
        inner.ensembles.remove(&id);
        Ok(())
    }

    async fn tail(&self, id: EnsembleId, errors_only: bool) -> Result<Vec<RunResult>> {
        let inner = self.inner.lock();
        let record = inner
            .ensembles
            .get(&id)
            .filter(|r| !r.deleted)
            .ok_or_else(|| JoshuaError::NotFound(id.to_string()))?;
        let mut results: Vec<RunResult> = record
            .results
            .iter()
            .filter(|r| !errors_only || !r.exit_class.is_pass())
            .cloned()
            .collect();
        results.reverse();
        Ok(results)
    }

    async fn read_package(&self, id: EnsembleId) -> Result<Vec<u8>> {
        let record = {
            let inner = self.inner.lock();
            inner
                .ensembles
                .get(&id)
                .filter(|r| !r.deleted)
                .cloned()
                .ok_or_else(|| JoshuaError::NotFound(id.to_string()))?
        };
        crate::compression::decompress_if_needed(record.package, record.properties.compressed)
    }

    async fn count_active(&self, sanity: bool) -> Result<usize> {
        let inner = self.inner.lock();
        Ok(if sanity { inner.sanity.len() } else { inner.active.len() })
    }

    async fn active_ids(&self, sanity: bool) -> Result<Vec<EnsembleId>> {
        let inner = self.inner.lock();
        let set = if sanity { &inner.sanity } else { &inner.active };
        Ok(set.iter().copied().collect())
    }

    async fn watch_active(&self, sanity: bool, timeout: Duration) {
        let notified = if sanity {
            self.sanity_changed.notified()
        } else {
            self.active_changed.notified()
        };
        let _ = tokio::time::timeout(timeout, notified).await;
    }

    async fn prepare(&self, id: EnsembleId, sanity: bool) -> Result<PreparedEnsemble> {
        let (record, still_active) = {
            let inner = self.inner.lock();
            let record = inner
                .ensembles
                .get(&id)
                .filter(|r| !r.deleted)
                .cloned()
                .ok_or_else(|| JoshuaError::NotFound(id.to_string()))?;
            let still_active = if sanity {
                inner.sanity.contains(&id)
            } else {
                inner.active.contains(&id)
            };
            (record, still_active)
        };
        let package = crate::compression::decompress_if_needed(record.package, record.properties.compressed)?;
        Ok(PreparedEnsemble {
            properties: record.properties,
            package,
            still_active,
        })
    }

    async fn report_result(
        &self,
        id: EnsembleId,
        sanity: bool,
        run_token: RunToken,
        elapsed_seconds: u64,
        exit_class: ExitClass,
        output: Vec<u8>,
    ) -> Result<ReportOutcome> {
        let mut inner = self.inner.lock();
        let record = inner
            .ensembles
            .get_mut(&id)
            .filter(|r| !r.deleted)
            .ok_or_else(|| JoshuaError::NotFound(id.to_string()))?;

        record.results.push(RunResult {
            run_token,
            elapsed_seconds,
            exit_class,
            output,
        });
        record.counters.apply(joshua_core::counters::CounterDelta {
            pass: exit_class.is_pass(),
            elapsed_seconds,
        });
        record
            .counters
            .check_invariant()
            .map_err(JoshuaError::InvariantViolation)?;

        let retired = record.counters.is_terminal(&record.properties);
        if retired {
            if sanity {
                inner.sanity.remove(&id);
            } else {
                inner.active.remove(&id);
            }
        }
        let counters = record.counters;
        drop(inner);
        if retired {
            self.notify_index(sanity);
        }
        Ok(ReportOutcome { counters, retired })
    }

    async fn write_heartbeat(&self, heartbeat: AgentHeartbeat) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.heartbeats.insert(heartbeat.agent_id.clone(), heartbeat);
        Ok(())
    }

    async fn list_heartbeats(&self, max_age: Duration) -> Result<Vec<AgentHeartbeat>> {
        // The memory backend has no wall clock of its own; callers pass
        // an already-elapsed cutoff by filtering on `epoch_ms` themselves
        // in tests. For parity with the real backend's contract we still
        // accept `max_age` and simply return every known heartbeat here,
        // since the memory store is process-local and heartbeats don't
        // outlive the test.
        let _ = max_age;
        let inner = self.inner.lock();
        Ok(inner.heartbeats.values().cloned().collect())
    }
}

/// Convenience constructor for tests and local tooling.
pub fn memory_store() -> Arc<dyn KvStore> {
    Arc::new(MemoryStore::new())
}
