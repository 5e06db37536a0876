//! The two loop-entry predicates that govern whether each thread performs
//! another iteration.
use std::sync::atomic::Ordering;

use super::Pair;

impl Pair {
    /// "Perform another iteration?", the authority. Thread A's loop
    /// calls this once per iteration, before [`start_race_a`](Pair::start_race_a).
    ///
    /// Returns `false` when the pair's `exit` flag is set, the iteration
    /// budget (`exec_loops`) is exhausted, or the pair's share
    /// (`exec_time_p`) of its wall-clock time budget has elapsed. In every
    /// one of those non-flag cases `exit` is also set before returning, so
    /// [`run_b`](Pair::run_b), which only watches that flag, mirrors the
    /// decision.
    ///
    /// Otherwise increments `exec_loop`, counts down the sampling budget,
    /// and decides whether sampling has converged enough for the delay
    /// search to engage on the next iteration.
    pub fn run_a(&self) -> bool {
        if self.exit.load(Ordering::Acquire) {
            return false;
        }

        let state = unsafe { &mut *self.state.get() };
        let now = self.clock.now_ns();
        let elapsed_ns = (now - state.exec_time_start).max(0) as f64;

        let options = self.options.lock().unwrap();
        let budget_ns = options.exec_time_p * self.time_budget.as_nanos() as f64;
        let exec_loops = options.exec_loops;
        let min_samples = options.min_samples;
        let max_dev_ratio = options.max_dev_ratio;
        drop(options);

        if state.exec_loop >= exec_loops || elapsed_ns >= budget_ns {
            self.request_exit();
            return false;
        }

        state.exec_loop += 1;

        if state.sampling > 0 {
            state.sampling -= 1;
            if state.sampling == 0 {
                let durations_converged = state
                    .stat_diff_aa
                    .has_converged(min_samples, max_dev_ratio)
                    && state.stat_diff_bb.has_converged(min_samples, max_dev_ratio);

                // `stat_diff_ab` (B start - A start) is the inter-thread
                // wake latency: its mean sits near zero with jitter of
                // comparable magnitude, so its own avg_dev/avg ratio is
                // almost never a useful stability signal. Judge it instead
                // against the scale of the windows themselves, which is
                // what the delay search actually needs to be steady.
                let window_scale = state
                    .stat_diff_aa
                    .avg
                    .abs()
                    .max(state.stat_diff_bb.avg.abs())
                    .max(1.0);
                let offset_stable = state.stat_diff_ab.n >= min_samples
                    && state.stat_diff_ab.avg_dev <= max_dev_ratio * window_scale;

                let converged = durations_converged && offset_stable;

                if !converged {
                    // Extend sampling rather than declaring it complete;
                    // how noisy the timings are decides how much longer
                    // this keeps happening.
                    state.sampling = min_samples.max(64) / 4;
                }
            }
        }

        true
    }

    /// "Perform another iteration?", thread B's mirror. Waits until
    /// either thread A has fully closed out the previous iteration
    /// (`a_cntr == b_cntr`, the pair's idle state) or `exit` is set, then
    /// returns accordingly.
    pub fn run_b(&self) -> bool {
        self.wait_until(|| {
            self.a_cntr.load(Ordering::Acquire) == self.b_cntr.load(Ordering::Acquire)
        });
        !self.exit.load(Ordering::Acquire)
    }
}
