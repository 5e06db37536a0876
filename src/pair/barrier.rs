//! The four rendezvous points that sequence thread A and thread B through
//! one iteration.
//!
//! Implemented as a symmetric two-counter protocol: each side owns one
//! atomic counter (`a_cntr`, `b_cntr`) that it alone increments, and waits
//! (via [`Pair::wait_until`]) for the other counter to reach a target
//! derived from its own. A full iteration advances both counters by 2 and
//! leaves them equal again, which is exactly the idle state
//! [`run_b`](super::Pair::run_b) waits for before letting thread B start
//! the next one.
//!
//! The delay search (§ see [`crate::delay`]) is settled once per iteration,
//! at the end of `end_race_a`, rather than literally "at the top of
//! `start_race_a`": this guarantees the freshly computed
//! [`DelayPlan`][crate::delay::DelayPlan] is visible to thread B (via the
//! same atomic bump and condvar notify that unblocks its next
//! [`run_b`](super::Pair::run_b)) before thread B can possibly consult it
//! in `start_race_b`, removing a read/compute race the literal placement
//! would otherwise allow.
use std::sync::atomic::Ordering;

use super::Pair;

impl Pair {
    /// Thread A's half of the start-of-iteration rendezvous.
    ///
    /// Waits until thread B has reached [`start_race_b`](Pair::start_race_b),
    /// applies A's own delay if the current search plan calls for one, then
    /// records `a_start`.
    pub fn start_race_a(&self) {
        let a = self.a_cntr.load(Ordering::Acquire);
        self.wait_until(|| self.b_cntr.load(Ordering::Acquire) == a + 1);

        // SAFETY: the wait above just established happens-before with
        // thread B's `start_race_b`, which only touches `b_start`/`b_cntr`;
        // `delay_plan` was last written by this same thread A at the end
        // of the previous iteration, so reading it here is thread A
        // reading its own prior write.
        let state = unsafe { &mut *self.state.get() };
        if let crate::delay::DelayPlan::DelayA(ns) = state.delay_plan {
            crate::clock::sleep_ns(&*self.clock, ns as i64);
        }

        state.a_start = self.clock.now_ns();
        self.a_cntr.fetch_add(1, Ordering::AcqRel);
        self.wake_parked();
    }

    /// Thread B's half of the start-of-iteration rendezvous.
    ///
    /// Records `b_start`, signals thread A (unblocking its wait in
    /// [`start_race_a`](Pair::start_race_a)), then sleeps if the current
    /// search plan calls for B to delay.
    pub fn start_race_b(&self) {
        // SAFETY: this runs only after `run_b` confirmed `a_cntr ==
        // b_cntr`, i.e. thread A has fully finished the previous iteration
        // (or this is the first one) and is not touching `state`.
        let state = unsafe { &mut *self.state.get() };
        state.b_start = self.clock.now_ns();
        let delay_plan = state.delay_plan;

        self.b_cntr.fetch_add(1, Ordering::AcqRel);
        self.wake_parked();

        if let crate::delay::DelayPlan::DelayB(ns) = delay_plan {
            crate::clock::sleep_ns(&*self.clock, ns as i64);
        }
    }

    /// Thread A's half of the end-of-iteration rendezvous.
    ///
    /// Records `a_end`, waits for thread B's [`end_race_b`](Pair::end_race_b)
    /// signal, then folds this iteration's four timestamps into the
    /// running statistics and settles the delay plan for the next
    /// iteration.
    pub fn end_race_a(&self) {
        // SAFETY: thread A's own write; thread B does not touch `a_end`.
        let state = unsafe { &mut *self.state.get() };
        state.a_end = self.clock.now_ns();

        let a = self.a_cntr.load(Ordering::Acquire);
        self.wait_until(|| self.b_cntr.load(Ordering::Acquire) == a + 1);

        // SAFETY: the wait above establishes happens-before with thread
        // B's `end_race_b`, making `b_start`/`b_end` safe to read now.
        self.update_stats(state);
        self.compute_next_delay(state);

        self.a_cntr.fetch_add(1, Ordering::AcqRel);
        self.wake_parked();
    }

    /// Thread B's half of the end-of-iteration rendezvous.
    ///
    /// Records `b_end` and signals thread A; does not itself wait.
    pub fn end_race_b(&self) {
        // SAFETY: thread A is parked in `end_race_a`'s wait (or hasn't
        // reached it yet) until this bump; no concurrent access to
        // `b_end`.
        let state = unsafe { &mut *self.state.get() };
        state.b_end = self.clock.now_ns();

        self.b_cntr.fetch_add(1, Ordering::AcqRel);
        self.wake_parked();
    }

    fn update_stats(&self, state: &mut super::State) {
        state
            .stat_diff_ab
            .update_default((state.b_start - state.a_start) as f64);
        state
            .stat_diff_ba
            .update_default((state.a_start - state.b_start) as f64);
        state
            .stat_diff_aa
            .update_default((state.a_end - state.a_start) as f64);
        state
            .stat_diff_bb
            .update_default((state.b_end - state.b_start) as f64);
        state
            .stat_diff_ab_end
            .update_default((state.b_end - state.a_start) as f64);
    }
}
