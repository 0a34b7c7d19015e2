/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Accept-all kernel simulator.
//!
//! [`SimKernel`] stands in for the real kernel when the server runs outside
//! a microkernel host: it acknowledges every call, logs the decision it
//! received, and can be configured with dead CPUs so the `EBADCPU` retry
//! path is reachable from the workload simulator.

use std::collections::HashSet;

use tracing::debug;

use super::{Kernel, KernelError, NO_CHANGE};
use crate::proc::Endpoint;

/// Kernel stand-in that accepts every decision.
#[derive(Debug, Clone)]
pub struct SimKernel {
    hz: u32,
    dead_cpus: HashSet<u32>,
}

impl SimKernel {
    /// Simulator ticking at `hz` ticks per second.
    pub fn new(hz: u32) -> Self {
        Self {
            hz,
            dead_cpus: HashSet::new(),
        }
    }

    /// Pretend `cpu` is broken: every decision naming it is rejected with
    /// [`KernelError::BadCpu`].
    pub fn with_dead_cpu(mut self, cpu: u32) -> Self {
        self.dead_cpus.insert(cpu);
        self
    }
}

impl Kernel for SimKernel {
    fn schedctl(&mut self, endpoint: Endpoint) -> Result<(), KernelError> {
        debug!(%endpoint, "schedctl: taking over scheduling");
        Ok(())
    }

    fn schedule(
        &mut self,
        endpoint: Endpoint,
        priority: i32,
        quantum: i32,
        cpu: i32,
    ) -> Result<(), KernelError> {
        if cpu != NO_CHANGE && self.dead_cpus.contains(&(cpu as u32)) {
            return Err(KernelError::BadCpu { cpu: cpu as u32 });
        }
        debug!(%endpoint, priority, quantum, cpu, "schedule: decision accepted");
        Ok(())
    }

    fn hz(&self) -> u32 {
        self.hz
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
