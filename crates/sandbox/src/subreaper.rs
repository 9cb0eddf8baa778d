// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child-subreaper registration: a run's process may fork
//! and exit before its own children do, orphaning them to PID 1. Marking
//! the agent as a subreaper reparents them to us instead, so the process
//! group kill in [`crate::process::run`] can actually reach them.

/// Register the current process as a child subreaper. Linux-only; a
/// no-op elsewhere, logged once at startup so the deployment story is
/// visible without failing the agent on unsupported platforms.
pub fn register() {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: PR_SET_CHILD_SUBREAPER takes no pointer arguments; the
        // trailing zeros are ignored by the kernel for this option.
        let rc = unsafe { libc::prctl(libc::PR_SET_CHILD_SUBREAPER, 1, 0, 0, 0) };
        if rc != 0 {
            tracing::warn!(
                errno = std::io::Error::last_os_error().raw_os_error(),
                "failed to register as child subreaper; orphaned run descendants may leak"
            );
        } else {
            tracing::debug!("registered process as child subreaper");
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        tracing::debug!("child subreaper registration is a no-op on this platform");
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn register_does_not_panic() {
        register();
    }
}
