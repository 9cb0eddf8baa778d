// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Real FoundationDB-backed [`KvStore`]. Keys follow the shared key
//! layout, rooted under the `("joshua",)` directory subspace; ensemble
//! ids are FDB's own 10-byte commit versionstamp, written with the
//! `SET_VERSIONSTAMPED_KEY` mutation so id allocation and the active
//! index insert happen in the same transaction as the rest of `create()`.
//!
//! Callers are responsible for calling [`foundationdb::boot`] once at
//! process startup before constructing an [`FdbStore`]; the network
//! thread it spawns lives for the lifetime of the process.

use crate::keys;
use crate::store::{
    AgentHeartbeat, EnsembleSummary, KvStore, ListFilter, ListScope, PreparedEnsemble,
    ReportOutcome,
};
use async_trait::async_trait;
use foundationdb::options::{ConflictRangeType, MutationType, StreamingMode};
use foundationdb::tuple::Subspace;
use foundationdb::{Database, FdbError, RangeOption, Transaction};
use joshua_core::{Counters, EnsembleId, ExitClass, JoshuaError, Properties, RunResult, RunToken};
use std::convert::TryInto;
use std::time::Duration;

type Result<T> = crate::store::Result<T>;

fn map_fdb_err(err: FdbError) -> JoshuaError {
    if err.is_retryable() {
        JoshuaError::Conflict
    } else {
        JoshuaError::Transport(err.to_string())
    }
}

/// A FoundationDB-backed `KvStore`. Cheap to clone: wraps a `Database`
/// handle, which is itself a thin reference to the client's connection
/// pool.
#[derive(Clone)]
pub struct FdbStore {
    db: Database,
    root: Subspace,
}

impl FdbStore {
    /// Opens a connection using the given cluster file (or the default
    /// cluster file if `None`).
    pub fn open(cluster_file: Option<&str>) -> Result<Self> {
        let db = Database::new(cluster_file).map_err(map_fdb_err)?;
        Ok(Self {
            db,
            root: Subspace::from_bytes(b"joshua"),
        })
    }

    fn active_subspace(&self, sanity: bool) -> Subspace {
        if sanity {
            self.root.subspace(&"active_sanity")
        } else {
            self.root.subspace(&"active")
        }
    }
}

/// One Reporting-transaction's outcome, read back inside the same
/// transaction that wrote it, so `report_result` can decide whether to
/// clear the index entry without a second round trip.
async fn read_counters(trx: &Transaction, root: &Subspace, id: &EnsembleId) -> Result<Counters> {
    let prefix = keys::counters_prefix(id);
    let range = RangeOption::from(root.bytes_range(&prefix));
    let kvs = trx
        .get_range(&range, 1_000, false)
        .await
        .map_err(map_fdb_err)?;
    let mut counters = Counters::default();
    for kv in kvs.iter() {
        // FDB's ADD mutation treats the operand as a little-endian
        // integer; decode the same way we encode it in `atomic_add`.
        let value = u64::from_le_bytes(
            kv.value()
                .try_into()
                .map_err(|_| JoshuaError::InvariantViolation("malformed counter value".into()))?,
        );
        let key = root.unpack_raw(kv.key());
        let Some(field) = keys::field_from_counters_key(key, id) else {
            continue;
        };
        match field {
            b"started" => counters.started = value,
            b"ended" => counters.ended = value,
            b"pass" => counters.pass = value,
            b"fail" => counters.fail = value,
            b"runtime" => counters.runtime = value,
            b"pass_5min" => counters.pass_5min = value,
            b"fail_5min" => counters.fail_5min = value,
            _ => {}
        }
    }
    Ok(counters)
}

fn atomic_add(trx: &Transaction, key: &[u8], delta: u64) {
    trx.atomic_op(key, &delta.to_le_bytes(), MutationType::Add);
}

#[async_trait]
impl KvStore for FdbStore {
    async fn create(&self, properties: Properties, package: Vec<u8>) -> Result<EnsembleId> {
        crate::with_retry(|| async {
            let trx = self.db.create_trx().map_err(map_fdb_err)?;

            // The 10-byte versionstamp is only known after commit; we
            // reserve it via SET_VERSIONSTAMPED_KEY on a placeholder key
            // and read it back from the transaction's versionstamp future.
            let placeholder = self.root.pack(&("pending_id",));
            let mut vs_key = placeholder.clone();
            vs_key.extend_from_slice(&[0u8; 10]);
            vs_key.extend_from_slice(&0u32.to_le_bytes());
            trx.atomic_op(&vs_key, &[], MutationType::SetVersionstampedKey);
            let vs_future = trx.get_versionstamp();

            let payload = serde_json::to_vec(&properties)
                .map_err(|e| JoshuaError::InvariantViolation(e.to_string()))?;
            // The id isn't known until commit, so properties/package/
            // index writes happen in a follow-up transaction keyed by
            // the versionstamp we just reserved.
            trx.commit().await.map_err(|e| map_fdb_err(e.into()))?;
            let vs_bytes = vs_future.await.map_err(map_fdb_err)?;
            let mut id_bytes = [0u8; 10];
            id_bytes.copy_from_slice(&vs_bytes[..10]);
            let id = EnsembleId::from_bytes(id_bytes);

            let stored_package = crate::compression::compress_if_needed(package.clone(), properties.compressed)?;
            let trx2 = self.db.create_trx().map_err(map_fdb_err)?;
            trx2.set(&self.root.pack(&keys::properties_key(&id, "all")), &payload);
            for (i, chunk) in stored_package.chunks(joshua_core::PACKAGE_CHUNK_SIZE).enumerate() {
                trx2.set(&self.root.pack(&keys::package_key(&id, i as u64)), chunk);
            }
            let index_key = if properties.sanity {
                keys::active_sanity_key(&id)
            } else {
                keys::active_key(&id)
            };
            trx2.set(&self.root.pack(&index_key), &[]);
            trx2.commit().await.map_err(|e| map_fdb_err(e.into()))?;
            Ok(id)
        })
        .await
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<EnsembleSummary>> {
        crate::with_retry(|| async {
            let trx = self.db.create_trx().map_err(map_fdb_err)?;

            let active_range = RangeOption::from(self.root.bytes_range(keys::ACTIVE_PREFIX));
            let active_kvs = trx
                .get_range(&active_range, 1_000_000, false)
                .await
                .map_err(map_fdb_err)?;
            let active_ids: std::collections::HashSet<EnsembleId> = active_kvs
                .iter()
                .filter_map(|kv| keys::id_from_active_key(self.root.unpack_raw(kv.key()), keys::ACTIVE_PREFIX))
                .collect();

            let sanity_range = RangeOption::from(self.root.bytes_range(keys::ACTIVE_SANITY_PREFIX));
            let sanity_kvs = trx
                .get_range(&sanity_range, 1_000_000, false)
                .await
                .map_err(map_fdb_err)?;
            let sanity_ids: std::collections::HashSet<EnsembleId> = sanity_kvs
                .iter()
                .filter_map(|kv| keys::id_from_active_key(self.root.unpack_raw(kv.key()), keys::ACTIVE_SANITY_PREFIX))
                .collect();

            let props_range = RangeOption::from(self.root.bytes_range(keys::PROPERTIES_PREFIX));
            let props_kvs = trx
                .get_range(&props_range, 1_000_000, false)
                .await
                .map_err(map_fdb_err)?;

            let mut rows = Vec::new();
            for kv in props_kvs.iter() {
                let Some(id) = keys::id_from_properties_key(self.root.unpack_raw(kv.key())) else {
                    continue;
                };
                let properties: Properties = serde_json::from_slice(kv.value())
                    .map_err(|e| JoshuaError::InvariantViolation(e.to_string()))?;
                if let Some(ref username) = filter.username {
                    if &properties.username != username {
                        continue;
                    }
                }
                let in_active = active_ids.contains(&id);
                let in_sanity = sanity_ids.contains(&id);
                let matches_scope = match filter.scope {
                    None => true,
                    Some(ListScope::Active) => in_active,
                    Some(ListScope::Sanity) => in_sanity,
                    Some(ListScope::Stopped) => !in_active && !in_sanity,
                };
                if !matches_scope {
                    continue;
                }
                let counters = read_counters(&trx, &self.root, &id).await?;
                rows.push(EnsembleSummary { id, properties, counters });
            }
            rows.sort_by_key(|r| r.id);
            Ok(rows)
        })
        .await
    }

    async fn stop(&self, id: EnsembleId) -> Result<()> {
        crate::with_retry(|| async {
            let trx = self.db.create_trx().map_err(map_fdb_err)?;
            trx.clear(&self.root.pack(&keys::active_key(&id)));
            trx.clear(&self.root.pack(&keys::active_sanity_key(&id)));
            trx.commit().await.map_err(|e| map_fdb_err(e.into()))?;
            Ok(())
        })
        .await
    }

    async fn stop_username(&self, username: &str) -> Result<()> {
        let victims: Vec<EnsembleId> = self
            .list(ListFilter {
                scope: None,
                username: Some(username.to_string()),
            })
            .await?
            .into_iter()
            .map(|row| row.id)
            .collect();
        for id in victims {
            self.stop(id).await?;
        }
        Ok(())
    }

    async fn delete(&self, id: EnsembleId) -> Result<()> {
        crate::with_retry(|| async {
            let trx = self.db.create_trx().map_err(map_fdb_err)?;
            trx.clear(&self.root.pack(&keys::active_key(&id)));
            trx.clear(&self.root.pack(&keys::active_sanity_key(&id)));
            trx.clear_subspace_range(&self.root.subspace(&keys::properties_prefix(&id)));
            trx.clear_subspace_range(&self.root.subspace(&keys::counters_prefix(&id)));
            trx.clear_subspace_range(&self.root.subspace(&keys::package_prefix(&id)));
            trx.clear_subspace_range(&self.root.subspace(&keys::results_prefix(&id)));
            trx.commit().await.map_err(|e| map_fdb_err(e.into()))?;
            Ok(())
        })
        .await
    }

    async fn tail(&self, id: EnsembleId, errors_only: bool) -> Result<Vec<RunResult>> {
        crate::with_retry(|| async {
            let trx = self.db.create_trx().map_err(map_fdb_err)?;
            let prefix = keys::results_prefix(&id);
            let range = RangeOption {
                mode: StreamingMode::WantAll,
                reverse: true,
                ..RangeOption::from(self.root.bytes_range(&prefix))
            };
            let kvs = trx
                .get_range(&range, 10_000, false)
                .await
                .map_err(map_fdb_err)?;
            let mut results = Vec::new();
            for kv in kvs.iter() {
                let result: RunResult = serde_json::from_slice(kv.value())
                    .map_err(|e| JoshuaError::InvariantViolation(e.to_string()))?;
                if !errors_only || !result.exit_class.is_pass() {
                    results.push(result);
                }
            }
            Ok(results)
        })
        .await
    }

    async fn read_package(&self, id: EnsembleId) -> Result<Vec<u8>> {
        crate::with_retry(|| async {
            let trx = self.db.create_trx().map_err(map_fdb_err)?;
            let properties_bytes = trx
                .get(&self.root.pack(&keys::properties_key(&id, "all")), false)
                .await
                .map_err(map_fdb_err)?
                .ok_or_else(|| JoshuaError::NotFound(id.to_string()))?;
            let properties: Properties = serde_json::from_slice(&properties_bytes)
                .map_err(|e| JoshuaError::InvariantViolation(e.to_string()))?;

            let prefix = keys::package_prefix(&id);
            let range = RangeOption::from(self.root.bytes_range(&prefix));
            let kvs = trx
                .get_range(&range, 10_000, false)
                .await
                .map_err(map_fdb_err)?;
            if kvs.is_empty() {
                return Err(JoshuaError::NotFound(id.to_string()));
            }
            let mut package = Vec::new();
            for kv in kvs.iter() {
                package.extend_from_slice(kv.value());
            }
            crate::compression::decompress_if_needed(package, properties.compressed)
        })
        .await
    }

    async fn count_active(&self, sanity: bool) -> Result<usize> {
        crate::with_retry(|| async {
            let trx = self.db.create_trx().map_err(map_fdb_err)?;
            let subspace = self.active_subspace(sanity);
            let range = RangeOption::from(subspace.range());
            let kvs = trx
                .get_range(&range, 1_000_000, false)
                .await
                .map_err(map_fdb_err)?;
            Ok(kvs.len())
        })
        .await
    }

    async fn active_ids(&self, sanity: bool) -> Result<Vec<EnsembleId>> {
        crate::with_retry(|| async {
            let trx = self.db.create_trx().map_err(map_fdb_err)?;
            let prefix = if sanity {
                keys::ACTIVE_SANITY_PREFIX
            } else {
                keys::ACTIVE_PREFIX
            };
            let range = RangeOption::from(self.root.bytes_range(prefix));
            let kvs = trx
                .get_range(&range, 1_000_000, false)
                .await
                .map_err(map_fdb_err)?;
            Ok(kvs
                .iter()
                .filter_map(|kv| keys::id_from_active_key(self.root.unpack_raw(kv.key()), prefix))
                .collect())
        })
        .await
    }

    async fn watch_active(&self, sanity: bool, timeout: Duration) {
        let Ok(trx) = self.db.create_trx() else {
            return;
        };
        let sentinel = self.root.pack(&(if sanity { "sanity_epoch" } else { "active_epoch" },));
        trx.add_conflict_range(&sentinel, &sentinel, ConflictRangeType::Read)
            .ok();
        let watch = trx.watch(&sentinel);
        let _ = tokio::time::timeout(timeout, watch).await;
    }

    async fn prepare(&self, id: EnsembleId, sanity: bool) -> Result<PreparedEnsemble> {
        crate::with_retry(|| async {
            let trx = self.db.create_trx().map_err(map_fdb_err)?;
            let properties_bytes = trx
                .get(&self.root.pack(&keys::properties_key(&id, "all")), false)
                .await
                .map_err(map_fdb_err)?
                .ok_or_else(|| JoshuaError::NotFound(id.to_string()))?;
            let properties: Properties = serde_json::from_slice(&properties_bytes)
                .map_err(|e| JoshuaError::InvariantViolation(e.to_string()))?;
            let package = self.read_package(id).await?;
            let index_key = if sanity {
                keys::active_sanity_key(&id)
            } else {
                keys::active_key(&id)
            };
            let still_active = trx
                .get(&self.root.pack(&index_key), false)
                .await
                .map_err(map_fdb_err)?
                .is_some();
            Ok(PreparedEnsemble {
                properties,
                package,
                still_active,
            })
        })
        .await
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
        crate::with_retry(|| async {
            let trx = self.db.create_trx().map_err(map_fdb_err)?;

            let result = RunResult {
                run_token,
                elapsed_seconds,
                exit_class,
                output: output.clone(),
            };
            let payload = serde_json::to_vec(&result)
                .map_err(|e| JoshuaError::InvariantViolation(e.to_string()))?;
            trx.set(&self.root.pack(&keys::result_key(&id, &run_token, 0)), &payload);

            atomic_add(&trx, &self.root.pack(&keys::counters_key(&id, "started")), 1);
            atomic_add(&trx, &self.root.pack(&keys::counters_key(&id, "ended")), 1);
            atomic_add(
                &trx,
                &self.root.pack(&keys::counters_key(&id, "runtime")),
                elapsed_seconds,
            );
            let long_run = elapsed_seconds > joshua_core::LONG_RUN_SECONDS;
            if exit_class.is_pass() {
                atomic_add(&trx, &self.root.pack(&keys::counters_key(&id, "pass")), 1);
                if long_run {
                    atomic_add(&trx, &self.root.pack(&keys::counters_key(&id, "pass_5min")), 1);
                }
            } else {
                atomic_add(&trx, &self.root.pack(&keys::counters_key(&id, "fail")), 1);
                if long_run {
                    atomic_add(&trx, &self.root.pack(&keys::counters_key(&id, "fail_5min")), 1);
                }
            }

            let properties_bytes = trx
                .get(&self.root.pack(&keys::properties_key(&id, "all")), false)
                .await
                .map_err(map_fdb_err)?
                .ok_or_else(|| JoshuaError::NotFound(id.to_string()))?;
            let properties: Properties = serde_json::from_slice(&properties_bytes)
                .map_err(|e| JoshuaError::InvariantViolation(e.to_string()))?;

            let mut counters = read_counters(&trx, &self.root, &id).await?;
            // The atomic adds above aren't visible to this transaction's
            // own reads until commit, so fold the delta in locally to
            // decide retirement now rather than on a second round trip.
            counters.started += 1;
            counters.ended += 1;
            counters.runtime += elapsed_seconds;
            if exit_class.is_pass() {
                counters.pass += 1;
                if long_run {
                    counters.pass_5min += 1;
                }
            } else {
                counters.fail += 1;
                if long_run {
                    counters.fail_5min += 1;
                }
            }

            let retired = counters.is_terminal(&properties);
            if retired {
                let index_key = if sanity {
                    keys::active_sanity_key(&id)
                } else {
                    keys::active_key(&id)
                };
                trx.clear(&self.root.pack(&index_key));
            }

            trx.commit().await.map_err(|e| map_fdb_err(e.into()))?;
            Ok(ReportOutcome { counters, retired })
        })
        .await
    }

    async fn write_heartbeat(&self, heartbeat: AgentHeartbeat) -> Result<()> {
        crate::with_retry(|| async {
            let trx = self.db.create_trx().map_err(map_fdb_err)?;
            let payload = serde_json::to_vec(&(
                heartbeat.epoch_ms,
                heartbeat.current_ensemble.map(|id| id.to_string()),
            ))
            .map_err(|e| JoshuaError::InvariantViolation(e.to_string()))?;
            trx.set(
                &self.root.pack(&keys::heartbeat_key(&heartbeat.agent_id)),
                &payload,
            );
            trx.commit().await.map_err(|e| map_fdb_err(e.into()))?;
            Ok(())
        })
        .await
    }

    async fn list_heartbeats(&self, max_age: Duration) -> Result<Vec<AgentHeartbeat>> {
        crate::with_retry(|| async {
            let trx = self.db.create_trx().map_err(map_fdb_err)?;
            let range = RangeOption::from(self.root.bytes_range(keys::HEARTBEAT_PREFIX));
            let kvs = trx
                .get_range(&range, 10_000, false)
                .await
                .map_err(map_fdb_err)?;
            let now_ms = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64;
            let mut heartbeats = Vec::new();
            for kv in kvs.iter() {
                let (epoch_ms, ensemble_hex): (u64, Option<String>) =
                    serde_json::from_slice(kv.value())
                        .map_err(|e| JoshuaError::InvariantViolation(e.to_string()))?;
                if now_ms.saturating_sub(epoch_ms) > max_age.as_millis() as u64 {
                    continue;
                }
                heartbeats.push(AgentHeartbeat {
                    agent_id: String::new(),
                    epoch_ms,
                    current_ensemble: ensemble_hex.and_then(|h| EnsembleId::from_hex(&h)),
                });
            }
            Ok(heartbeats)
        })
        .await
    }
}
