/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Kernel dispatch interface.
//!
//! The scheduler owns the *policy* decision; the kernel owns the mechanics
//! of dispatch. This module defines the narrow contract between the two:
//! a [`Kernel`] trait carrying the three synchronous kernel calls the server
//! needs, and the [`Change`] flag set describing which parts of a scheduling
//! decision a call pushes down.
//!
//! Production binaries talk to the [`sim::SimKernel`] stand-in — the real
//! kernel lives on the far side of the IPC transport, which is outside this
//! crate. Tests substitute scriptable mocks.

pub mod sim;

use bitflags::bitflags;
use thiserror::Error;

use crate::proc::Endpoint;

// ── Change flags ──────────────────────────────────────────────────────────────

bitflags! {
    /// Which parts of a scheduling decision a `sys_schedule` call changes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Change: u32 {
        const PRIO = 0x1;
        const QUANTUM = 0x2;
        const CPU = 0x4;
    }
}

/// Wire value meaning "leave this parameter unchanged".
pub const NO_CHANGE: i32 = -1;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Failure of a kernel call.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// The kernel refused the chosen CPU. The scheduler marks the CPU dead
    /// and retries elsewhere; the error only reaches a client when every
    /// CPU has been exhausted.
    #[error("kernel rejected CPU {cpu}")]
    BadCpu { cpu: u32 },

    /// Any other kernel-call failure, with the kernel's error code.
    #[error("kernel call failed with code {0}")]
    Call(i32),
}

// ── Kernel trait ──────────────────────────────────────────────────────────────

/// The kernel calls the scheduler depends on.
///
/// All calls are synchronous: the single-threaded server blocks until the
/// kernel replies. Parameters passed as [`NO_CHANGE`] keep their current
/// kernel-side value.
pub trait Kernel {
    /// Claim scheduling ownership of `endpoint` (`sys_schedctl`).
    fn schedctl(&mut self, endpoint: Endpoint) -> Result<(), KernelError>;

    /// Push a `(priority, quantum, cpu)` decision for `endpoint`
    /// (`sys_schedule`). Each parameter may be [`NO_CHANGE`].
    fn schedule(
        &mut self,
        endpoint: Endpoint,
        priority: i32,
        quantum: i32,
        cpu: i32,
    ) -> Result<(), KernelError>;

    /// System clock frequency in ticks per second (`sys_hz`).
    fn hz(&self) -> u32;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
