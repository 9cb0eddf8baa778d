// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The shared error taxonomy. Every crate's own error enum converts into
//! this one at its public boundary so callers (the scheduler, the CLI)
//! have a single type to match on.

use thiserror::Error;

/// Errors surfaced by the Ensemble Model API and
/// propagated up through the scheduler and sandbox.
#[derive(Debug, Error)]
pub enum JoshuaError {
    /// The requested ensemble id does not exist.
    #[error("ensemble {0} not found")]
    NotFound(String),

    /// The KV transport signalled a commit conflict. Retryable.
    #[error("commit conflict, retry")]
    Conflict,

    /// A single property or write exceeded the KV transaction budget.
    #[error("value too large for a single transaction: {0}")]
    TooLarge(String),

    /// Counters were observed inconsistent with `ended == pass + fail`.
    /// Fatal: must abort rather than be masked.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// An environmental failure in the subprocess sandbox (cannot create
    /// working directory, cannot materialise package, cannot spawn).
    /// Fatal to the agent.
    #[error("sandbox environmental error: {0}")]
    SandboxEnvironment(String),

    /// Transport-level I/O failure talking to the KV store.
    #[error("kv transport error: {0}")]
    Transport(String),

    /// Underlying filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl JoshuaError {
    /// True for errors that are safe to retry transparently with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, JoshuaError::Conflict)
    }

    /// True for errors that must terminate the agent process rather than
    /// be recovered from in-process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            JoshuaError::SandboxEnvironment(_) | JoshuaError::InvariantViolation(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, JoshuaError>;
