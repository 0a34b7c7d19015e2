/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Message-driven event loop.
//!
//! The scheduler is strictly single-threaded: [`run`] owns the
//! [`Scheduler`] and processes one [`Envelope`] at a time, interleaved with
//! the two periodic timers. Timer callbacks never interrupt a handler —
//! they are just more branches of the same `select!`.
//!
//! The transport that produces envelopes (kernel IPC in a real deployment)
//! is outside this crate; anything holding the channel sender can drive the
//! server, which is exactly what the binaries and tests do.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::kernel::Kernel;
use crate::sched::{Message, Reply, SchedError, Scheduler};

// ── Envelope ──────────────────────────────────────────────────────────────────

/// One request on its way into the server, with an optional reply channel.
#[derive(Debug)]
pub struct Envelope {
    pub message: Message,
    pub reply: Option<oneshot::Sender<Result<Reply, SchedError>>>,
}

impl Envelope {
    /// Fire-and-forget request; the result is only visible in the logs.
    pub fn post(message: Message) -> Self {
        Self {
            message,
            reply: None,
        }
    }

    /// Request plus the receiver on which its result will arrive.
    pub fn call(message: Message) -> (Self, oneshot::Receiver<Result<Reply, SchedError>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                message,
                reply: Some(tx),
            },
            rx,
        )
    }
}

// ── Event loop ────────────────────────────────────────────────────────────────

/// Drive `scheduler` until every request sender is gone.
///
/// The balance and EDF timers are armed one full period out and re-armed
/// unconditionally, watchdog style: a missed tick delays the next one
/// instead of stopping the timer or firing a burst.
pub async fn run<K: Kernel>(mut scheduler: Scheduler<K>, mut requests: mpsc::Receiver<Envelope>) {
    let hz = u64::from(scheduler.hz());
    let balance_period = ticks_to_duration(scheduler.balance_interval(), hz);
    let edf_period = ticks_to_duration(scheduler.edf_interval(), hz);

    let mut balance = interval_at(Instant::now() + balance_period, balance_period);
    let mut edf = interval_at(Instant::now() + edf_period, edf_period);
    balance.set_missed_tick_behavior(MissedTickBehavior::Delay);
    edf.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(policy = %scheduler.policy(), hz, "scheduler ready");

    loop {
        tokio::select! {
            maybe = requests.recv() => match maybe {
                Some(envelope) => {
                    let result = scheduler.handle(envelope.message);
                    if let Err(e) = &result {
                        debug!(error = %e, "request failed");
                    }
                    if let Some(reply) = envelope.reply {
                        // the caller may have stopped waiting; that is fine
                        let _ = reply.send(result);
                    }
                }
                None => break,
            },
            _ = balance.tick() => scheduler.balance_tick(),
            _ = edf.tick() => scheduler.edf_tick(),
        }
    }

    info!("request channel closed, shutting down");
}

/// Convert a tick count into wall-clock time at `hz` ticks per second.
fn ticks_to_duration(ticks: u64, hz: u64) -> Duration {
    Duration::from_millis(ticks.saturating_mul(1000) / hz)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
