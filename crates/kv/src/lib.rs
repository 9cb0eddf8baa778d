// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! joshua-kv: the transactional data model.
//!
//! Two backends implement [`KvStore`]: [`memory::MemoryStore`] for tests
//! and local development (always available), and `fdb::FdbStore` for a
//! real FoundationDB cluster (behind the `fdb` feature, since it links
//! against the FDB client library).

pub mod backoff;
mod compression;
pub mod keys;
pub mod store;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "fdb")]
pub mod fdb;

pub use backoff::with_retry;
pub use store::{
    AgentHeartbeat, EnsembleSummary, KvStore, ListFilter, ListScope, PreparedEnsemble,
    ReportOutcome, Result,
};

#[cfg(feature = "memory")]
pub use memory::{memory_store, MemoryStore};

#[cfg(feature = "fdb")]
pub use fdb::FdbStore;
