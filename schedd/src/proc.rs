/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Core process-table data structures for the scheduler server.
//!
//! One [`SchedSlot`] exists per non-kernel process the server schedules.
//! Slots live in a fixed-capacity [`ProcTable`] indexed by the process
//! number embedded in the kernel-assigned [`Endpoint`].
//!
//! # Ownership model
//! The table is **owned** by the `Scheduler` and mutated only from request
//! handlers and timer callbacks — the event loop is single-threaded, so no
//! interior mutability or locking is needed.

use std::fmt;

use bitflags::bitflags;

// ── Queue geometry ────────────────────────────────────────────────────────────

/// Number of slots in the process table for non-kernel processes.
pub const NR_PROCS: usize = 256;

/// Total number of scheduling queues known to the kernel.
pub const NR_SCHED_QUEUES: u32 = 16;

/// Best (numerically lowest) queue a user process may occupy.
pub const MAX_USER_Q: u32 = 0;

/// Worst (numerically highest) user queue.
pub const MIN_USER_Q: u32 = NR_SCHED_QUEUES - 1;

/// The "good" middle queue where freshly promoted winners run.
pub const USER_Q: u32 = (MAX_USER_Q + MIN_USER_Q) / 2;

/// Lowest accepted nice value.
pub const PRIO_MIN: i32 = -20;

/// Highest accepted nice value.
pub const PRIO_MAX: i32 = 20;

/// Quantum handed to the bootstrap process, in ticks.
pub const DEFAULT_USER_TIME_SLICE: u32 = 200;

// ── Endpoints ─────────────────────────────────────────────────────────────────

/// Opaque kernel-assigned process identifier.
///
/// Non-negative endpoints map onto a process-table slot via
/// [`Endpoint::slot_index`]; negative endpoints denote kernel tasks, which
/// this server never schedules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint(pub i32);

/// The process manager — may issue scheduling requests on behalf of its
/// children.
pub const PM_PROC_NR: Endpoint = Endpoint(0);

/// The reincarnation server — starts system services; its children are
/// system processes and stay pinned to the boot processor.
pub const RS_PROC_NR: Endpoint = Endpoint(2);

/// This scheduler itself, reported back to the kernel as the owner of every
/// process it takes over.
pub const SCHED_PROC_NR: Endpoint = Endpoint(10);

impl Endpoint {
    /// Process-table slot this endpoint lives in, or `None` for kernel tasks.
    pub fn slot_index(self) -> Option<usize> {
        if self.0 < 0 {
            return None;
        }
        Some(self.0 as usize % NR_PROCS)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Slot flags ────────────────────────────────────────────────────────────────

bitflags! {
    /// Per-slot marker flags. An empty set means the slot is free.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct SlotFlags: u32 {
        /// The slot holds a process this server currently schedules.
        const IN_USE = 0x1;
    }
}

// ── SchedSlot ─────────────────────────────────────────────────────────────────

/// Scheduling state for one non-kernel process.
///
/// A default slot is free. Every field other than `flags` is meaningless
/// while the slot is free — policies must only look at in-use slots.
///
/// # Lifecycle
/// Created by `start_scheduling`, mutated by `nice`, `noquantum` and the
/// balance/EDF timers, and reset to the default value by `stop_scheduling`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedSlot {
    /// Occupancy marker; contains at most [`SlotFlags::IN_USE`].
    pub flags: SlotFlags,

    /// Kernel endpoint of the scheduled process.
    pub endpoint: Endpoint,

    /// Endpoint of the process that requested scheduling.
    pub parent: Endpoint,

    /// Current queue index in `[MAX_USER_Q, MIN_USER_Q]`; lower is better.
    pub priority: u32,

    /// Best queue this slot is permitted to occupy (`max_priority ≤ priority`).
    pub max_priority: u32,

    /// Quantum in ticks.
    pub time_slice: u32,

    /// CPU the slot is accounted against, `None` until first placement.
    pub cpu: Option<u32>,

    /// Ticket count under the lottery policy; always at least 1 once started.
    pub lottery_num: u32,

    /// Absolute virtual-clock deadline under EDF; `0` means no deadline.
    pub deadline: u64,
}

impl SchedSlot {
    /// Returns `true` if this slot holds a scheduled process.
    pub fn in_use(&self) -> bool {
        self.flags.contains(SlotFlags::IN_USE)
    }

    /// System processes are those started by the reincarnation server.
    pub fn is_system(&self) -> bool {
        self.parent == RS_PROC_NR
    }
}

// ── ProcTable ─────────────────────────────────────────────────────────────────

/// Fixed-capacity table of scheduling slots, indexed by process number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcTable {
    slots: Vec<SchedSlot>,
}

impl ProcTable {
    /// Create a table with all [`NR_PROCS`] slots free.
    pub fn new() -> Self {
        Self {
            slots: vec![SchedSlot::default(); NR_PROCS],
        }
    }

    /// Resolve `endpoint` to the index of an **in-use** slot.
    ///
    /// Fails when the endpoint is a kernel task, when the slot is free, or
    /// when the slot is occupied by a different endpoint generation.
    pub fn resolve(&self, endpoint: Endpoint) -> Result<usize, crate::sched::SchedError> {
        let idx = endpoint
            .slot_index()
            .ok_or(crate::sched::SchedError::BadEndpoint(endpoint))?;
        let slot = &self.slots[idx];
        if !slot.in_use() || slot.endpoint != endpoint {
            return Err(crate::sched::SchedError::BadEndpoint(endpoint));
        }
        Ok(idx)
    }

    /// Resolve `endpoint` to the index of a **free** slot.
    ///
    /// `start_scheduling` uses this; asking to start an endpoint whose slot
    /// is already occupied is an error.
    pub fn resolve_empty(&self, endpoint: Endpoint) -> Result<usize, crate::sched::SchedError> {
        let idx = endpoint
            .slot_index()
            .ok_or(crate::sched::SchedError::BadEndpoint(endpoint))?;
        if self.slots[idx].in_use() {
            return Err(crate::sched::SchedError::BadEndpoint(endpoint));
        }
        Ok(idx)
    }

    /// Iterate over all in-use slots together with their indices, in slot
    /// order. Policies rely on this ordering for deterministic picks.
    pub fn in_use(&self) -> impl Iterator<Item = (usize, &SchedSlot)> + '_ {
        self.slots.iter().enumerate().filter(|(_, s)| s.in_use())
    }

    /// Number of in-use slots.
    pub fn count_in_use(&self) -> usize {
        self.in_use().count()
    }
}

impl Default for ProcTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Index<usize> for ProcTable {
    type Output = SchedSlot;

    fn index(&self, idx: usize) -> &SchedSlot {
        &self.slots[idx]
    }
}

impl std::ops::IndexMut<usize> for ProcTable {
    fn index_mut(&mut self, idx: usize) -> &mut SchedSlot {
        &mut self.slots[idx]
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::SchedError;

    // ── Queue geometry ────────────────────────────────────────────────────────

    #[test]
    fn user_q_is_the_middle_queue() {
        assert_eq!(USER_Q, 7);
        assert!(MAX_USER_Q < USER_Q && USER_Q < MIN_USER_Q);
    }

    #[test]
    fn min_user_q_is_the_last_queue() {
        assert_eq!(MIN_USER_Q, NR_SCHED_QUEUES - 1);
    }

    // ── Endpoint ──────────────────────────────────────────────────────────────

    #[test]
    fn endpoint_maps_to_slot_index_modulo_table_size() {
        assert_eq!(Endpoint(0).slot_index(), Some(0));
        assert_eq!(Endpoint(100).slot_index(), Some(100));
        assert_eq!(Endpoint(NR_PROCS as i32 + 3).slot_index(), Some(3));
    }

    #[test]
    fn kernel_task_endpoints_have_no_slot() {
        assert_eq!(Endpoint(-1).slot_index(), None);
        assert_eq!(Endpoint(-42).slot_index(), None);
    }

    // ── SchedSlot ─────────────────────────────────────────────────────────────

    #[test]
    fn default_slot_is_free() {
        let slot = SchedSlot::default();
        assert!(!slot.in_use());
        assert_eq!(slot.flags, SlotFlags::empty());
    }

    #[test]
    fn slot_started_by_rs_is_a_system_process() {
        let slot = SchedSlot {
            parent: RS_PROC_NR,
            ..Default::default()
        };
        assert!(slot.is_system());

        let user = SchedSlot {
            parent: PM_PROC_NR,
            ..Default::default()
        };
        assert!(!user.is_system());
    }

    // ── ProcTable resolution ──────────────────────────────────────────────────

    fn table_with(endpoint: Endpoint) -> ProcTable {
        let mut table = ProcTable::new();
        let idx = endpoint.slot_index().unwrap();
        table[idx].flags = SlotFlags::IN_USE;
        table[idx].endpoint = endpoint;
        table
    }

    #[test]
    fn resolve_finds_an_in_use_slot() {
        let table = table_with(Endpoint(100));
        assert_eq!(table.resolve(Endpoint(100)).unwrap(), 100);
    }

    #[test]
    fn resolve_rejects_free_slots() {
        let table = ProcTable::new();
        assert_eq!(
            table.resolve(Endpoint(5)),
            Err(SchedError::BadEndpoint(Endpoint(5)))
        );
    }

    #[test]
    fn resolve_rejects_stale_endpoint_generations() {
        // Slot 100 is occupied by endpoint 100; endpoint 356 maps to the same
        // slot but belongs to an older/newer generation.
        let table = table_with(Endpoint(100));
        let stale = Endpoint(100 + NR_PROCS as i32);
        assert_eq!(table.resolve(stale), Err(SchedError::BadEndpoint(stale)));
    }

    #[test]
    fn resolve_rejects_kernel_tasks() {
        let table = ProcTable::new();
        assert_eq!(
            table.resolve(Endpoint(-3)),
            Err(SchedError::BadEndpoint(Endpoint(-3)))
        );
    }

    #[test]
    fn resolve_empty_rejects_occupied_slots() {
        let table = table_with(Endpoint(7));
        assert_eq!(
            table.resolve_empty(Endpoint(7)),
            Err(SchedError::BadEndpoint(Endpoint(7)))
        );
        assert!(table.resolve_empty(Endpoint(8)).is_ok());
    }

    // ── Iteration order ───────────────────────────────────────────────────────

    #[test]
    fn in_use_iterates_in_slot_order() {
        let mut table = ProcTable::new();
        for ep in [Endpoint(30), Endpoint(10), Endpoint(20)] {
            let idx = ep.slot_index().unwrap();
            table[idx].flags = SlotFlags::IN_USE;
            table[idx].endpoint = ep;
        }
        let order: Vec<usize> = table.in_use().map(|(i, _)| i).collect();
        assert_eq!(order, vec![10, 20, 30]);
    }
}
