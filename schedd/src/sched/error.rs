/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the scheduler server.
//!
//! [`SchedError`] is the failure surface of every request handler. The
//! variants map one-to-one onto the status codes a client can receive:
//!
//! | Variant | Classic code | Meaning |
//! |---|---|---|
//! | `Perm` | `EPERM` | sender is not a privileged component |
//! | `BadEndpoint` | `EBADEPT` | endpoint unknown or wrong occupancy |
//! | `Invalid` | `EINVAL` | nice/queue argument out of range |
//! | `Kernel(BadCpu)` | `EBADCPU` | every CPU is dead |
//! | `Kernel(Call)` | kernel code | dispatch failure, state rolled back |
//!
//! The numeric errno encoding belongs to the IPC transport, which is outside
//! this crate; within the server the typed variants **are** the contract.
//! Do not collapse these into `anyhow::Error` — handlers match on them to
//! decide rollback behavior.

use thiserror::Error;

use crate::kernel::KernelError;
use crate::proc::Endpoint;

/// Top-level error type returned by every request handler.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// The sender is not allowed to issue scheduling requests.
    #[error("sender {0} may not issue scheduling requests")]
    Perm(Endpoint),

    /// The endpoint does not resolve to a usable slot: it names a kernel
    /// task, a free slot where an in-use one was required (or vice versa),
    /// or a stale endpoint generation.
    #[error("endpoint {0} does not resolve to a usable slot")]
    BadEndpoint(Endpoint),

    /// A nice value or the queue it maps to is out of range.
    #[error("nice value or scheduling queue out of range")]
    Invalid,

    /// The kernel refused a call. For `BadCpu` this only escapes the server
    /// once every CPU has been marked dead.
    #[error(transparent)]
    Kernel(#[from] KernelError),
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_errors_convert_losslessly() {
        let err: SchedError = KernelError::BadCpu { cpu: 2 }.into();
        assert_eq!(err, SchedError::Kernel(KernelError::BadCpu { cpu: 2 }));
    }

    #[test]
    fn display_names_the_offending_endpoint() {
        let err = SchedError::BadEndpoint(Endpoint(123));
        assert!(err.to_string().contains("123"));
    }
}
