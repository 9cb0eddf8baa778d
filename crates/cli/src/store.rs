// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Picks a [`KvStore`] backend for the binaries to hold as their
//! explicit context object.
//!
//! The `fdb` feature talks to a real cluster via `--cluster-file`. The
//! `memory` default gives every process its own store, which is enough
//! to exercise `joshua submit`/`list`/`tail` and the agent loop end to
//! end in one process (tests, demos) but does not persist across
//! separate invocations — a real deployment builds with `--features
//! fdb` and points `--cluster-file` at a running cluster.

use anyhow::Context;
use joshua_kv::KvStore;
use std::sync::Arc;

#[cfg(feature = "fdb")]
pub fn open_store(cluster_file: Option<&str>) -> anyhow::Result<Arc<dyn KvStore>> {
    // SAFETY: must run before any other foundationdb API call and only
    // once per process; both binaries call `open_store` exactly once
    // at startup. The returned guard stops the client's network thread
    // on drop, which we never want mid-process, so it is intentionally
    // leaked for the life of the binary.
    let network = unsafe { foundationdb::boot() };
    std::mem::forget(network);
    let store = joshua_kv::FdbStore::open(cluster_file).context("failed to open FoundationDB cluster")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "fdb"))]
pub fn open_store(cluster_file: Option<&str>) -> anyhow::Result<Arc<dyn KvStore>> {
    if cluster_file.is_some() {
        tracing::warn!("--cluster-file is ignored: this binary was built without the `fdb` feature");
    }
    tracing::warn!("using a per-process in-memory store; state does not persist across invocations");
    Ok(joshua_kv::memory_store())
}
