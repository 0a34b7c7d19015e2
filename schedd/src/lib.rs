/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! schedd – userspace process scheduler server
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── config/  – YAML machine/runtime configuration
//! ├── proc     – endpoints, scheduling slots, fixed-size process table
//! ├── kernel/  – kernel call interface + accept-all simulator
//! ├── sched/   – policy engine: handlers, MLFQ/lottery/EDF, timer ticks
//! └── server/  – single-threaded message loop with the two periodic timers
//! ```

pub mod config;
pub mod kernel;
pub mod proc;
pub mod sched;
pub mod server;
