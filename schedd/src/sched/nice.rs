/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Nice-to-priority mapping.
//!
//! A free function rather than a method so it can be used and tested
//! independently of the `Scheduler`.

use crate::proc::{MAX_USER_Q, MIN_USER_Q, PRIO_MAX, PRIO_MIN};
use crate::sched::SchedError;

/// Map a nice value onto a scheduling-queue index.
///
/// Lower nice means a better (numerically smaller) queue. The mapping is
/// linear across the user-queue window and the result is clamped to
/// `[MAX_USER_Q, MIN_USER_Q]`.
///
/// # Errors
/// [`SchedError::Invalid`] when `nice` lies outside `[PRIO_MIN, PRIO_MAX]`.
pub fn nice_to_priority(nice: i32) -> Result<u32, SchedError> {
    if !(PRIO_MIN..=PRIO_MAX).contains(&nice) {
        return Err(SchedError::Invalid);
    }

    let window = (MIN_USER_Q - MAX_USER_Q + 1) as i32;
    let range = PRIO_MAX - PRIO_MIN + 1;
    let q = MAX_USER_Q as i32 + (nice - PRIO_MIN) * window / range;

    Ok(q.clamp(MAX_USER_Q as i32, MIN_USER_Q as i32) as u32)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::USER_Q;

    #[test]
    fn extreme_nice_values_hit_the_queue_bounds() {
        assert_eq!(nice_to_priority(PRIO_MIN).unwrap(), MAX_USER_Q);
        assert_eq!(nice_to_priority(PRIO_MAX).unwrap(), MIN_USER_Q);
    }

    #[test]
    fn neutral_nice_lands_on_the_middle_queue() {
        assert_eq!(nice_to_priority(0).unwrap(), USER_Q);
    }

    #[test]
    fn mapping_is_monotonic() {
        let mut prev = MAX_USER_Q;
        for nice in PRIO_MIN..=PRIO_MAX {
            let q = nice_to_priority(nice).unwrap();
            assert!(q >= prev, "queue regressed at nice {nice}");
            prev = q;
        }
    }

    #[test]
    fn out_of_range_nice_is_rejected() {
        assert_eq!(nice_to_priority(PRIO_MIN - 1), Err(SchedError::Invalid));
        assert_eq!(nice_to_priority(PRIO_MAX + 1), Err(SchedError::Invalid));
    }

    #[test]
    fn every_accepted_nice_stays_inside_the_user_window() {
        for nice in PRIO_MIN..=PRIO_MAX {
            let q = nice_to_priority(nice).unwrap();
            assert!((MAX_USER_Q..=MIN_USER_Q).contains(&q));
        }
    }
}
