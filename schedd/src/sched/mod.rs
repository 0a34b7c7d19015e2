/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Scheduling policy engine.
//!
//! [`Scheduler`] owns the policy decision for every non-kernel process: which
//! queue it runs in, how long its quantum is, and which CPU it lands on. The
//! kernel performs the mechanical dispatch; this server only pushes decisions
//! down through the [`Kernel`] bridge.
//!
//! Three policies share the same slot layout and are selected globally at
//! runtime:
//!
//! * **MLFQ** (the default) — demote one level on quantum exhaustion, age
//!   everything back toward its ceiling on the periodic balance timer.
//! * **Lottery** — processes wait in the bottom queue; a weighted random
//!   draw promotes one winner per vacated quantum.
//! * **EDF** — same bottom-queue pool, but the winner is the process with
//!   the nearest absolute deadline on the virtual clock.
//!
//! # Concurrency
//! The engine is strictly single-threaded: one request is handled to
//! completion before the next, timer callbacks run between requests, and a
//! policy pick triggered inside a handler finishes before the handler
//! returns. All state lives behind `&mut self` — no locks, no hidden
//! globals.
//!
//! # Example
//! ```rust,ignore
//! let kernel = SimKernel::new(100);
//! let mut sched = Scheduler::seeded(kernel, Machine::single_cpu(), Policy::Mlfq, 42);
//! let reply = sched.handle(Message { source: PM_PROC_NR, request })?;
//! ```

pub mod cpu;
pub mod error;
pub mod nice;

pub use cpu::{CpuLoadMap, CPU_DEAD};
pub use error::SchedError;
pub use nice::nice_to_priority;

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::Deserialize;
use tracing::{debug, info, trace, warn};

use crate::config::Machine;
use crate::kernel::{Change, Kernel, KernelError, NO_CHANGE};
use crate::proc::{
    Endpoint, ProcTable, SchedSlot, SlotFlags, DEFAULT_USER_TIME_SLICE, MIN_USER_Q, NR_PROCS,
    NR_SCHED_QUEUES, PM_PROC_NR, RS_PROC_NR, SCHED_PROC_NR, USER_Q,
};

// ── Constants ─────────────────────────────────────────────────────────────────

/// How often the balance timer rebalances the queues, in seconds.
pub const BALANCE_TIMEOUT_SECS: u32 = 5;

// ── Policy ────────────────────────────────────────────────────────────────────

/// Globally selected scheduling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Multi-level feedback queue. The boot default.
    #[serde(alias = "default")]
    Mlfq,

    /// Probabilistic selection weighted by ticket counts.
    Lottery,

    /// Earliest-deadline-first over the virtual clock.
    Edf,
}

impl Policy {
    /// The policy the runtime switch command advances to.
    pub fn next(self) -> Policy {
        match self {
            Policy::Mlfq => Policy::Lottery,
            Policy::Lottery => Policy::Edf,
            Policy::Edf => Policy::Mlfq,
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Policy::Mlfq => "mlfq",
            Policy::Lottery => "lottery",
            Policy::Edf => "edf",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Policy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mlfq" | "default" => Ok(Policy::Mlfq),
            "lottery" => Ok(Policy::Lottery),
            "edf" => Ok(Policy::Edf),
            other => Err(format!(
                "unknown scheduling policy: '{other}' (valid: mlfq, lottery, edf)"
            )),
        }
    }
}

// ── Requests and replies ──────────────────────────────────────────────────────

/// A scheduling request as decoded from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Take over scheduling of a process with explicit quantum; used for
    /// system processes and the init bootstrap.
    Start {
        endpoint: Endpoint,
        parent: Endpoint,
        max_prio: i32,
        quantum: u32,
    },

    /// Take over scheduling of a forked child, inheriting queue and quantum
    /// from its already-scheduled parent.
    Inherit {
        endpoint: Endpoint,
        parent: Endpoint,
        max_prio: i32,
    },

    /// Release a slot.
    Stop { endpoint: Endpoint },

    /// Policy-dependent tuning knob: queue ceiling (MLFQ), ticket count
    /// (lottery) or milliseconds-to-deadline (EDF).
    Nice { endpoint: Endpoint, nice: i32 },

    /// Sent by the kernel when the *source* process exhausts its quantum.
    NoQuantum,

    /// Advance the global policy to the next one.
    SwitchPolicy,
}

/// A decoded message: who sent it and what they asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub source: Endpoint,
    pub request: Request,
}

/// Successful handler outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Nothing to report beyond success.
    Empty,

    /// `start` replies with the endpoint of the scheduler that now owns the
    /// process, so the kernel knows where to send `NoQuantum` events.
    Scheduler(Endpoint),
}

/// Which flavour of takeover a start request asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartKind {
    Start { quantum: u32 },
    Inherit,
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

/// The policy engine: process table, CPU accounting, policy state and the
/// kernel bridge, driven by one request at a time.
pub struct Scheduler<K: Kernel> {
    kernel: K,
    machine: Machine,
    policy: Policy,
    table: ProcTable,
    cpu_load: CpuLoadMap,

    /// Ticks per second, queried from the kernel once at startup.
    hz: u32,

    /// EDF virtual clock; advanced only by [`Scheduler::edf_tick`].
    edf_clock: u64,

    /// Ticks between EDF clock advances (`hz / 10`, at least 1).
    edf_interval: u64,

    /// Ticks between balance-timer fires (`BALANCE_TIMEOUT_SECS · hz`).
    balance_interval: u64,

    /// Injected ticket source so lottery runs are reproducible.
    rng: Box<dyn RngCore + Send>,
}

impl<K: Kernel> Scheduler<K> {
    /// Build a scheduler for `machine`, drawing lottery tickets from `rng`.
    pub fn new(kernel: K, machine: Machine, policy: Policy, rng: Box<dyn RngCore + Send>) -> Self {
        let hz = kernel.hz();
        Self {
            machine,
            policy,
            table: ProcTable::new(),
            cpu_load: CpuLoadMap::new(machine.processors_count),
            hz,
            edf_clock: 0,
            // the virtual clock must keep moving even on slow tick sources
            edf_interval: u64::from(hz / 10).max(1),
            balance_interval: u64::from(BALANCE_TIMEOUT_SECS) * u64::from(hz),
            kernel,
            rng,
        }
    }

    /// Convenience constructor with a seeded standard RNG.
    pub fn seeded(kernel: K, machine: Machine, policy: Policy, seed: u64) -> Self {
        Self::new(
            kernel,
            machine,
            policy,
            Box::new(StdRng::seed_from_u64(seed)),
        )
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn hz(&self) -> u32 {
        self.hz
    }

    pub fn edf_clock(&self) -> u64 {
        self.edf_clock
    }

    pub fn edf_interval(&self) -> u64 {
        self.edf_interval
    }

    pub fn balance_interval(&self) -> u64 {
        self.balance_interval
    }

    pub fn table(&self) -> &ProcTable {
        &self.table
    }

    pub fn cpu_loads(&self) -> &CpuLoadMap {
        &self.cpu_load
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn kernel_mut(&mut self) -> &mut K {
        &mut self.kernel
    }

    // ── Request dispatch ──────────────────────────────────────────────────────

    /// Decode and execute one request to completion.
    pub fn handle(&mut self, message: Message) -> Result<Reply, SchedError> {
        let Message { source, request } = message;
        match request {
            Request::Start {
                endpoint,
                parent,
                max_prio,
                quantum,
            } => self.do_start_scheduling(
                source,
                endpoint,
                parent,
                max_prio,
                StartKind::Start { quantum },
            ),
            Request::Inherit {
                endpoint,
                parent,
                max_prio,
            } => self.do_start_scheduling(source, endpoint, parent, max_prio, StartKind::Inherit),
            Request::Stop { endpoint } => self.do_stop_scheduling(source, endpoint),
            Request::Nice { endpoint, nice } => self.do_nice(source, endpoint, nice),
            Request::NoQuantum => self.do_noquantum(source),
            Request::SwitchPolicy => self.do_switch_policy(source),
        }
    }

    /// Only privileged components may reconfigure scheduling.
    fn accept_message(&self, source: Endpoint) -> Result<(), SchedError> {
        if source == PM_PROC_NR || source == RS_PROC_NR {
            Ok(())
        } else {
            Err(SchedError::Perm(source))
        }
    }

    // ── start_scheduling ──────────────────────────────────────────────────────

    fn do_start_scheduling(
        &mut self,
        source: Endpoint,
        endpoint: Endpoint,
        parent: Endpoint,
        max_prio: i32,
        kind: StartKind,
    ) -> Result<Reply, SchedError> {
        self.accept_message(source)?;
        let idx = self.table.resolve_empty(endpoint)?;

        // A nice that fails to convert does not fail the call: the process
        // simply enters with the worst permitted ceiling.
        let new_q = nice_to_priority(max_prio).unwrap_or(MIN_USER_Q);
        if new_q >= NR_SCHED_QUEUES {
            return Err(SchedError::Invalid);
        }

        // The parent must already be scheduled before a child can inherit.
        let inherited = match kind {
            StartKind::Inherit => {
                let pidx = self.table.resolve(parent)?;
                let pslot = &self.table[pidx];
                Some((pslot.priority, pslot.time_slice))
            }
            StartKind::Start { .. } => None,
        };

        let policy = self.policy;
        let bsp = self.machine.bsp_id;
        let bootstrap = endpoint == parent;
        {
            let slot = &mut self.table[idx];
            slot.endpoint = endpoint;
            slot.parent = parent;
            slot.max_priority = new_q;
            slot.lottery_num = 1;
            slot.deadline = 0;

            if bootstrap {
                // Init is its own parent and is already running on the boot
                // processor when we take over.
                slot.priority = USER_Q;
                slot.time_slice = DEFAULT_USER_TIME_SLICE;
                slot.cpu = Some(bsp);
            }

            match kind {
                StartKind::Start { quantum } => {
                    slot.priority = match policy {
                        Policy::Mlfq => slot.max_priority,
                        // cooperative policies admit everyone at the bottom
                        // and promote winners one quantum at a time
                        Policy::Lottery | Policy::Edf => MIN_USER_Q,
                    };
                    slot.time_slice = quantum;
                }
                StartKind::Inherit => {
                    // a forked child takes over its parent's queue and
                    // quantum as they stand, whatever the active policy
                    let (parent_prio, parent_slice) = inherited.unwrap();
                    slot.priority = parent_prio;
                    slot.time_slice = parent_slice;
                }
            }
        }
        if bootstrap {
            self.cpu_load.charge(bsp);
        }

        if let Err(e) = self.kernel.schedctl(endpoint) {
            warn!(%endpoint, error = %e, "could not take over scheduling");
            self.release_slot(idx);
            return Err(e.into());
        }
        self.table[idx].flags = SlotFlags::IN_USE;

        // Push the full decision. CPUs the kernel rejects are marked dead
        // and never tried again; the learned markers outlive this call.
        loop {
            match self.schedule_process(idx, Change::all()) {
                Ok(()) => break,
                Err(KernelError::BadCpu { cpu }) => {
                    self.cpu_load.mark_dead(cpu);
                    if !self.cpu_load.any_alive() {
                        self.release_slot(idx);
                        return Err(KernelError::BadCpu { cpu }.into());
                    }
                }
                Err(e) => {
                    warn!(%endpoint, error = %e, "kernel refused the scheduling decision");
                    self.release_slot(idx);
                    return Err(e.into());
                }
            }
        }

        let slot = &self.table[idx];
        info!(
            %endpoint,
            %parent,
            priority = slot.priority,
            quantum = slot.time_slice,
            cpu = slot.cpu.unwrap_or(bsp),
            "scheduling started"
        );

        Ok(Reply::Scheduler(SCHED_PROC_NR))
    }

    /// Undo a partially started slot: give its CPU count back and leave the
    /// slot exactly as free as it was before the request.
    fn release_slot(&mut self, idx: usize) {
        if let Some(cpu) = self.table[idx].cpu {
            self.cpu_load.release(cpu);
        }
        self.table[idx] = SchedSlot::default();
    }

    // ── stop_scheduling ───────────────────────────────────────────────────────

    fn do_stop_scheduling(&mut self, source: Endpoint, endpoint: Endpoint) -> Result<Reply, SchedError> {
        self.accept_message(source)?;
        let idx = match self.table.resolve(endpoint) {
            Ok(idx) => idx,
            Err(e) => {
                warn!(%endpoint, "stop request for an unknown endpoint");
                return Err(e);
            }
        };

        if let Some(cpu) = self.table[idx].cpu {
            self.cpu_load.release(cpu);
        }
        // A full reset keeps the table indistinguishable from one where the
        // process never existed.
        self.table[idx] = SchedSlot::default();
        info!(%endpoint, "scheduling stopped");

        // Hand the vacated quantum to the next winner right away.
        match self.policy {
            Policy::Mlfq => Ok(Reply::Empty),
            Policy::Lottery => self.lottery_pick().map(|_| Reply::Empty),
            Policy::Edf => self.edf_pick().map(|_| Reply::Empty),
        }
    }

    // ── nice ──────────────────────────────────────────────────────────────────

    fn do_nice(&mut self, source: Endpoint, endpoint: Endpoint, nice: i32) -> Result<Reply, SchedError> {
        self.accept_message(source)?;
        let idx = match self.table.resolve(endpoint) {
            Ok(idx) => idx,
            Err(e) => {
                warn!(%endpoint, "nice request for an unknown endpoint");
                return Err(e);
            }
        };

        match self.policy {
            Policy::Mlfq => {
                let new_q = nice_to_priority(nice)?;
                if new_q >= NR_SCHED_QUEUES {
                    return Err(SchedError::Invalid);
                }

                let (old_q, old_max) = {
                    let slot = &self.table[idx];
                    (slot.priority, slot.max_priority)
                };
                {
                    let slot = &mut self.table[idx];
                    slot.max_priority = new_q;
                    slot.priority = new_q;
                }

                if let Err(e) = self.schedule_local(idx) {
                    let slot = &mut self.table[idx];
                    slot.priority = old_q;
                    slot.max_priority = old_max;
                    return Err(e.into());
                }

                debug!(%endpoint, queue = new_q, "nice moved process");
                Ok(Reply::Empty)
            }
            Policy::Lottery => {
                // nice is the ticket count; everyone holds at least one
                let tickets = nice.max(1) as u32;
                self.table[idx].lottery_num = tickets;
                info!(%endpoint, tickets, "nice set lottery tickets");
                Ok(Reply::Empty)
            }
            Policy::Edf => {
                // nice is milliseconds until the task should finish
                let deadline = if nice <= 0 {
                    0
                } else {
                    self.edf_clock + u64::from(self.hz) * nice as u64 / 1000
                };
                self.table[idx].deadline = deadline;
                info!(%endpoint, deadline, "nice set deadline");
                Ok(Reply::Empty)
            }
        }
    }

    // ── noquantum ─────────────────────────────────────────────────────────────

    /// The kernel reports that `source` ran out of quantum.
    ///
    /// Unlike the other handlers this one is not gated on the privileged
    /// senders: the message arrives on behalf of the exhausted process
    /// itself, and resolving the endpoint is the validation.
    fn do_noquantum(&mut self, source: Endpoint) -> Result<Reply, SchedError> {
        let idx = match self.table.resolve(source) {
            Ok(idx) => idx,
            Err(e) => {
                warn!(%source, "quantum exhausted for an unknown endpoint");
                return Err(e);
            }
        };

        match self.policy {
            Policy::Mlfq => {
                // push the process down one level
                let old_q = self.table[idx].priority;
                if old_q < MIN_USER_Q {
                    self.table[idx].priority = old_q + 1;
                }
                if let Err(e) = self.schedule_local(idx) {
                    self.table[idx].priority = old_q;
                    return Err(e.into());
                }
                Ok(Reply::Empty)
            }
            Policy::Lottery => {
                self.requeue_at_bottom(idx)?;
                self.lottery_pick().map(|_| Reply::Empty)
            }
            Policy::Edf => {
                self.requeue_at_bottom(idx)?;
                self.edf_pick().map(|_| Reply::Empty)
            }
        }
    }

    /// Cooperative policies dump an exhausted process straight back into the
    /// bottom-queue pool.
    fn requeue_at_bottom(&mut self, idx: usize) -> Result<(), SchedError> {
        let old_q = self.table[idx].priority;
        self.table[idx].priority = MIN_USER_Q;
        if let Err(e) = self.schedule_local(idx) {
            self.table[idx].priority = old_q;
            return Err(e.into());
        }
        Ok(())
    }

    // ── Policy switch ─────────────────────────────────────────────────────────

    fn do_switch_policy(&mut self, source: Endpoint) -> Result<Reply, SchedError> {
        self.accept_message(source)?;
        self.policy = self.policy.next();
        info!(policy = %self.policy, "schedule policy switched");
        Ok(Reply::Empty)
    }

    // ── Policies ──────────────────────────────────────────────────────────────

    /// Draw a weighted ticket over the pool of processes waiting at the
    /// bottom queue and give the winner one quantum at the good priority.
    fn lottery_pick(&mut self) -> Result<(), SchedError> {
        let total: u64 = self
            .table
            .in_use()
            .filter(|(_, s)| s.priority == MIN_USER_Q)
            .map(|(_, s)| u64::from(s.lottery_num))
            .sum();
        if total == 0 {
            debug!("lottery: no candidates in the pool");
            return Ok(());
        }

        let ticket = u64::from(self.rng.next_u32()) % total + 1;
        let mut acc = 0u64;
        let mut winner = None;
        // slot-index order makes the draw reproducible for a given ticket
        for (idx, slot) in self.table.in_use() {
            if slot.priority != MIN_USER_Q {
                continue;
            }
            acc += u64::from(slot.lottery_num);
            if acc >= ticket {
                winner = Some(idx);
                break;
            }
        }
        // the cumulative walk always reaches total >= ticket
        let Some(idx) = winner else {
            return Ok(());
        };

        info!(ticket, total, endpoint = %self.table[idx].endpoint, "lottery winner");
        self.promote(idx)
    }

    /// Promote the waiting process whose deadline is nearest. Processes
    /// without a deadline never win; ties go to the lowest slot index.
    fn edf_pick(&mut self) -> Result<(), SchedError> {
        let mut winner: Option<(usize, u64)> = None;
        for (idx, slot) in self.table.in_use() {
            if slot.priority != MIN_USER_Q || slot.deadline == 0 {
                continue;
            }
            let closer = match winner {
                None => true,
                Some((_, best)) => slot.deadline < best,
            };
            if closer {
                winner = Some((idx, slot.deadline));
            }
        }
        let Some((idx, deadline)) = winner else {
            debug!("edf: no pending deadlines");
            return Ok(());
        };

        info!(
            deadline,
            clock = self.edf_clock,
            endpoint = %self.table[idx].endpoint,
            "edf winner"
        );
        self.promote(idx)
    }

    /// Move a pool slot up to the good queue for one quantum. A kernel
    /// refusal demotes it straight back, so at most one process sits at
    /// `USER_Q` at any time.
    fn promote(&mut self, idx: usize) -> Result<(), SchedError> {
        self.table[idx].priority = USER_Q;
        if let Err(e) = self.schedule_local(idx) {
            self.table[idx].priority = MIN_USER_Q;
            return Err(e.into());
        }
        Ok(())
    }

    // ── Timer callbacks ───────────────────────────────────────────────────────

    /// Periodic MLFQ aging: every process stuck below its ceiling is pulled
    /// up one level. A no-op under the cooperative policies, but the timer
    /// keeps firing so a later policy switch needs no re-arming.
    pub fn balance_tick(&mut self) {
        if self.policy != Policy::Mlfq {
            return;
        }
        for idx in 0..NR_PROCS {
            let eligible = {
                let slot = &self.table[idx];
                slot.in_use() && slot.priority > slot.max_priority
            };
            if !eligible {
                continue;
            }
            self.table[idx].priority -= 1;
            if let Err(e) = self.schedule_local(idx) {
                warn!(endpoint = %self.table[idx].endpoint, error = %e, "reschedule after aging failed");
            }
        }
    }

    /// Advance the EDF virtual clock by one timer interval. Never triggers
    /// a pick; picks happen only on `noquantum`/`stop`.
    pub fn edf_tick(&mut self) {
        self.edf_clock += self.edf_interval;
        trace!(clock = self.edf_clock, "edf clock advanced");
    }

    // ── Kernel dispatch bridge ────────────────────────────────────────────────

    /// Push the parts of the slot's decision named in `changes` down to the
    /// kernel. The CPU placement is refreshed on every call so the load
    /// accounting stays exact even for local reschedules.
    fn schedule_process(&mut self, idx: usize, changes: Change) -> Result<(), KernelError> {
        let cpu = self.pick_cpu(idx);

        let slot = &self.table[idx];
        let endpoint = slot.endpoint;
        let new_prio = if changes.contains(Change::PRIO) {
            slot.priority as i32
        } else {
            NO_CHANGE
        };
        let new_quantum = if changes.contains(Change::QUANTUM) {
            slot.time_slice as i32
        } else {
            NO_CHANGE
        };
        let new_cpu = if changes.contains(Change::CPU) {
            cpu as i32
        } else {
            NO_CHANGE
        };

        if let Err(e) = self.kernel.schedule(endpoint, new_prio, new_quantum, new_cpu) {
            warn!(%endpoint, error = %e, "sys_schedule failed");
            return Err(e);
        }
        Ok(())
    }

    fn schedule_local(&mut self, idx: usize) -> Result<(), KernelError> {
        self.schedule_process(idx, Change::PRIO | Change::QUANTUM)
    }

    /// Reserved for balance-time migrations.
    #[allow(dead_code)]
    fn schedule_migrate(&mut self, idx: usize) -> Result<(), KernelError> {
        self.schedule_process(idx, Change::CPU)
    }

    /// Choose a CPU for the slot and move its load accounting there.
    ///
    /// The previous assignment is released before the new one is charged,
    /// so per-CPU counts always match the table contents exactly.
    fn pick_cpu(&mut self, idx: usize) -> u32 {
        let bsp = self.machine.bsp_id;
        let target = {
            let slot = &self.table[idx];
            if self.machine.processors_count == 1 || slot.is_system() {
                // system processes run only on the boot cpu
                bsp
            } else {
                self.cpu_load.least_loaded(bsp)
            }
        };

        let previous = self.table[idx].cpu.replace(target);
        if let Some(old) = previous {
            self.cpu_load.release(old);
        }
        self.cpu_load.charge(target);
        target
    }
}

impl<K: Kernel + fmt::Debug> fmt::Debug for Scheduler<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("policy", &self.policy)
            .field("in_use", &self.table.count_in_use())
            .field("edf_clock", &self.edf_clock)
            .field("kernel", &self.kernel)
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
