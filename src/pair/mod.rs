//! The shared pair state that mediates thread A and thread B of a race.
//!
//! [`Pair`] is the one value both threads hold a reference to (via
//! [`Arc`]). It owns the barriers (`barrier.rs`), the loop-termination
//! predicates (`loop_ctrl.rs`), the adaptive delay search
//! ([`crate::delay`]) and the running statistics ([`crate::stat`]) that
//! feed it.
//!
//! # Safety
//!
//! Two OS threads hold a live `&Pair` concurrently for the whole lifetime
//! of a race, so `Pair` must be `Sync`. Most of its fields are not
//! individually `Sync` (`UnsafeCell<State>`, a plain `f64`/`u64`-bearing
//! struct with no atomics of its own); soundness comes not from the type
//! system but from a protocol invariant documented on every accessor. Here
//! that invariant is the barrier protocol itself: `State` is touched by
//! thread A only
//! between the end of one iteration's barriers and the start of the
//! next's, or by thread B only in the symmetric window between
//! `start_race_b` and `end_race_b`, and the barrier's atomic
//! increment-then-wait establishes the happens-before edge needed for
//! each side to safely read what the other wrote.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::clock::{Clock, MonotonicClock};
use crate::delay::{self, DelayPlan, SearchInput};
use crate::error::{PairError, Result};
use crate::options::Options;
use crate::stat::RunningStat;

mod barrier;
mod loop_ctrl;

/// Default stand-in for "the total test budget" a standalone pair has no
/// external framework to share with; combined with [`Options::exec_time_p`]
/// defaulting to `1.0` this makes the default behave as effectively
/// unbounded in practice, while still giving `run_a` a concrete number to
/// check against.
const DEFAULT_TIME_BUDGET: Duration = Duration::from_secs(315_576_000); // ~10 years

/// Mutable pair state touched only by thread A between barriers, or by
/// thread B in the symmetric window (see the module-level safety note).
struct State {
    a_start: i64,
    a_end: i64,
    b_start: i64,
    b_end: i64,

    stat_diff_ab: RunningStat,
    stat_diff_ba: RunningStat,
    stat_diff_aa: RunningStat,
    stat_diff_bb: RunningStat,
    stat_diff_ab_end: RunningStat,

    delay_plan: DelayPlan,
    delay_bias: f64,

    sampling: u64,
    exec_loop: u64,
    exec_time_start: i64,

    rng: rand::rngs::StdRng,
}

impl State {
    fn new(now_ns: i64, min_samples: u64) -> Self {
        use rand::SeedableRng;
        Self {
            a_start: 0,
            a_end: 0,
            b_start: 0,
            b_end: 0,
            stat_diff_ab: RunningStat::new(),
            stat_diff_ba: RunningStat::new(),
            stat_diff_aa: RunningStat::new(),
            stat_diff_bb: RunningStat::new(),
            stat_diff_ab_end: RunningStat::new(),
            delay_plan: DelayPlan::None,
            delay_bias: 0.0,
            sampling: min_samples,
            exec_loop: 0,
            exec_time_start: now_ns,
            // Seeded from the OS entropy source at reset time; good enough
            // for a randomized search, no reproducibility contract is made.
            rng: rand::rngs::StdRng::from_entropy(),
        }
    }
}

/// A snapshot of a pair's running statistics, for instrumentation and
/// tests. Cheap to clone; does not borrow from the pair.
#[derive(Clone, Copy, Debug)]
pub struct StatsSnapshot {
    /// `B start − A start`.
    pub diff_ab: RunningStat,
    /// `A start − B start`.
    pub diff_ba: RunningStat,
    /// `A end − A start` (duration of A's window).
    pub diff_aa: RunningStat,
    /// `B end − B start` (duration of B's window).
    pub diff_bb: RunningStat,
    /// `B end − A start`.
    pub diff_ab_end: RunningStat,
    /// Current bias applied to the delay-search midpoint.
    pub delay_bias: f64,
    /// Iterations still to be spent in pure-sampling mode; `0` means the
    /// delay search has engaged.
    pub sampling: u64,
    /// Total iterations executed so far in the current race.
    pub exec_loop: u64,
}

/// The shared object mediating one race between thread A (the caller's own
/// thread) and thread B (a worker spawned and managed by the pair).
///
/// Always held behind an [`Arc`]: thread B needs to keep a reference to
/// the pair alive independently of the caller, so a plain owned `Pair`
/// cannot be shared with it. See [`Pair::new`].
pub struct Pair {
    clock: Box<dyn Clock>,
    options: Mutex<Options>,
    time_budget: Duration,

    a_cntr: AtomicU64,
    b_cntr: AtomicU64,
    /// Per-race termination flag. Cleared on every [`reset`](Pair::reset).
    exit: AtomicBool,
    /// Whole-pair teardown flag. Set only by [`cleanup`](Pair::cleanup);
    /// never cleared.
    shutdown: AtomicBool,
    /// Bumped once per `reset` call; thread B's persistent loop waits for
    /// this to change to know a new race has begun.
    race_epoch: AtomicU64,

    state: std::cell::UnsafeCell<State>,

    thread_b: Mutex<Option<JoinHandle<()>>>,
    worker: Mutex<Option<Arc<dyn Fn(&Pair) + Send + Sync>>>,

    park_lock: Mutex<()>,
    park_cv: Condvar,
}

// SAFETY: see the module-level doc comment. `state`'s contents are never
// read or written outside the happens-before window the barrier protocol
// establishes between thread A and thread B.
unsafe impl Sync for Pair {}

impl Pair {
    /// Prepare a fresh pair (the engine's `init`).
    ///
    /// All fields start zeroed/empty; [`Options`] defaults apply until
    /// overridden via [`options_mut`](Pair::options_mut). No thread is
    /// spawned until the first [`reset`](Pair::reset).
    pub fn new() -> Arc<Pair> {
        let clock = Box::new(MonotonicClock);
        let now = clock.now_ns();
        let options = Options::default();
        let min_samples = options.min_samples;
        Arc::new(Pair {
            clock,
            options: Mutex::new(options),
            time_budget: DEFAULT_TIME_BUDGET,
            a_cntr: AtomicU64::new(0),
            b_cntr: AtomicU64::new(0),
            exit: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            race_epoch: AtomicU64::new(0),
            state: std::cell::UnsafeCell::new(State::new(now, min_samples)),
            thread_b: Mutex::new(None),
            worker: Mutex::new(None),
            park_lock: Mutex::new(()),
            park_cv: Condvar::new(),
        })
    }

    /// Replace the default `CLOCK_MONOTONIC`-backed clock with a
    /// caller-supplied monotonic time source.
    ///
    /// Only meaningful before the first [`reset`](Pair::reset); this is the
    /// hook for callers whose platform's default monotonic clock is
    /// unsuitable.
    pub fn set_clock(self: &mut Arc<Self>, clock: impl Clock + 'static) {
        match Arc::get_mut(self) {
            Some(pair) => pair.clock = Box::new(clock),
            None => {
                // Another reference (e.g. a still-running thread B) already
                // exists; this is a caller contract violation but not
                // memory-unsafe, so we simply ignore it rather than panic.
                debug_assert!(false, "set_clock called after pair was shared");
            }
        }
    }

    /// Access the caller-configurable parameters (`min_samples`,
    /// `max_dev_ratio`, `exec_loops`, `exec_time_p`, ...) to adjust before
    /// the next [`reset`](Pair::reset).
    pub fn with_options(&self, f: impl FnOnce(&mut Options)) {
        let mut options = self.options.lock().unwrap();
        f(&mut options);
    }

    /// Current options, cloned out.
    pub fn options(&self) -> Options {
        self.options.lock().unwrap().clone()
    }

    /// A snapshot of the running statistics and search state.
    pub fn stats(&self) -> StatsSnapshot {
        // SAFETY: read-only snapshot; caller is expected to only call this
        // between races or from thread A's own vantage point, same as any
        // other `State` access. A torn read of a `RunningStat` (a few
        // `f64`/`u64` fields, not updated atomically as a unit) is possible
        // if called concurrently with an in-flight race and is documented
        // as the caller's responsibility, exactly like reading a `Counter`'s
        // `read_buf` while a race is active would be.
        let state = unsafe { &*self.state.get() };
        StatsSnapshot {
            diff_ab: state.stat_diff_ab,
            diff_ba: state.stat_diff_ba,
            diff_aa: state.stat_diff_aa,
            diff_bb: state.stat_diff_bb,
            diff_ab_end: state.stat_diff_ab_end,
            delay_bias: state.delay_bias,
            sampling: state.sampling,
            exec_loop: state.exec_loop,
        }
    }

    /// The nanosecond delay currently planned for the next iteration, in
    /// signed convention: positive delays B, negative delays A, zero
    /// delays neither.
    pub fn delay_ns(&self) -> i64 {
        let state = unsafe { &*self.state.get() };
        state.delay_plan.signed_ns()
    }

    /// Total iterations executed in the current race.
    pub fn exec_loop(&self) -> u64 {
        unsafe { &*self.state.get() }.exec_loop
    }

    /// The barrier counters `(a_cntr, b_cntr)`. Equal whenever both
    /// threads are idle outside a barrier, e.g. just after `cleanup`.
    pub fn barrier_counters(&self) -> (u64, u64) {
        (
            self.a_cntr.load(Ordering::Acquire),
            self.b_cntr.load(Ordering::Acquire),
        )
    }

    /// Begin a new race.
    ///
    /// Clears statistics, timestamps, counters and the per-race `exit`
    /// flag, and records the current time as the race's start. If `worker`
    /// is `Some`, it becomes (or replaces) the closure thread B runs once
    /// per race; if `None`, the closure installed by a previous `reset`
    /// call is reused. Either way, if thread B is not yet alive it is
    /// spawned now; if it is already alive (from a previous race on this
    /// same pair) it is instead signalled to begin the new race, without
    /// tearing down and recreating the OS thread.
    ///
    /// `arg` is moved into the stored closure and handed to `worker` by
    /// reference on every race it runs, including races after this one
    /// that reuse the same worker.
    pub fn reset<F, A>(self: &Arc<Self>, worker: Option<F>, arg: A) -> Result<()>
    where
        F: Fn(&Pair, &A) + Send + Sync + 'static,
        A: Send + Sync + 'static,
    {
        {
            let options = self.options.lock().unwrap();
            let state = unsafe { &mut *self.state.get() };
            *state = State::new(self.clock.now_ns(), options.min_samples);
        }
        self.a_cntr.store(0, Ordering::Release);
        self.b_cntr.store(0, Ordering::Release);
        self.exit.store(false, Ordering::Release);

        if let Some(f) = worker {
            let arg = Arc::new(arg);
            let boxed: Arc<dyn Fn(&Pair) + Send + Sync> = Arc::new(move |p: &Pair| f(p, &arg));
            *self.worker.lock().unwrap() = Some(boxed);
        }

        let mut thread_slot = self.thread_b.lock().unwrap();
        if thread_slot.is_none() {
            let pair = Arc::clone(self);
            let handle = thread::Builder::new()
                .name("fuzzy-sync-b".into())
                .spawn(move || thread_b_main(pair))
                .map_err(PairError::Spawn)?;
            *thread_slot = Some(handle);
        }
        drop(thread_slot);

        self.race_epoch.fetch_add(1, Ordering::AcqRel);
        {
            let _guard = self.park_lock.lock().unwrap();
        }
        self.park_cv.notify_all();

        Ok(())
    }

    /// Request that both loop predicates return `false` from now on, for
    /// the current race.
    ///
    /// Safe to call from any thread, including a signal-initiated teardown
    /// path: this only touches an `AtomicBool` and a `Mutex`/`Condvar` pair
    /// used solely to bound wakeup latency, not to protect any data.
    pub fn request_exit(&self) {
        self.exit.store(true, Ordering::Release);
        self.wake_parked();
    }

    /// Tear the pair down: request exit, unblock any parked thread, and
    /// join thread B.
    pub fn cleanup(&self) -> Result<()> {
        self.exit.store(true, Ordering::Release);
        self.shutdown.store(true, Ordering::Release);
        self.wake_parked();

        let handle = self.thread_b.lock().unwrap().take();
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| PairError::ContractViolation("thread B panicked"))?;
        }
        Ok(())
    }

    fn wake_parked(&self) {
        let _guard = self.park_lock.lock().unwrap();
        self.park_cv.notify_all();
    }

    /// Spin for a short bound, then fall back to a timed park, until
    /// `cond` is true or `exit` has been requested.
    ///
    /// This is the bounded futex-like wait the design notes call for: it
    /// keeps sub-microsecond wake latency when the other side is expected
    /// imminently, without burning a full core indefinitely when it is
    /// not.
    fn wait_until(&self, mut cond: impl FnMut() -> bool) {
        const SPIN_ITERS: u32 = 2_000;
        for _ in 0..SPIN_ITERS {
            if cond() || self.exit.load(Ordering::Acquire) {
                return;
            }
            std::hint::spin_loop();
        }
        let mut guard = self.park_lock.lock().unwrap();
        while !cond() && !self.exit.load(Ordering::Acquire) {
            let (g, _timeout) = self
                .park_cv
                .wait_timeout(guard, Duration::from_micros(200))
                .unwrap();
            guard = g;
        }
    }

    fn compute_next_delay(&self, state: &mut State) {
        let options = self.options.lock().unwrap();
        if state.sampling > 0 {
            state.delay_plan = DelayPlan::None;
            return;
        }

        let mu_a = state.stat_diff_aa.avg;
        let mu_b = state.stat_diff_bb.avg;

        if !delay::should_engage(mu_a, mu_b, options.max_window_ns) {
            // Workload too noisy: extend sampling instead of engaging.
            state.sampling = options.min_samples.max(64) / 4;
            state.delay_plan = DelayPlan::None;
            return;
        }

        if state.exec_loop % options.bias_period == 0 {
            let (_, half_width) = delay::target_and_half_width(&SearchInput {
                mu_a,
                mu_b,
                mu_ab: state.stat_diff_ab.avg,
                sigma_ab: state.stat_diff_ab.avg_dev,
                dispersion_multiplier: options.dispersion_multiplier,
                delay_bias: 0.0,
            });
            state.delay_bias = delay::randomize_bias(half_width, &mut state.rng);
        }

        let input = SearchInput {
            mu_a,
            mu_b,
            mu_ab: state.stat_diff_ab.avg,
            sigma_ab: state.stat_diff_ab.avg_dev,
            dispersion_multiplier: options.dispersion_multiplier,
            delay_bias: state.delay_bias,
        };
        state.delay_plan = delay::search(&input, &mut state.rng);
    }
}

fn thread_b_main(pair: Arc<Pair>) {
    let mut seen_epoch = 0;
    loop {
        pair.wait_until(|| pair.race_epoch.load(Ordering::Acquire) != seen_epoch);
        if pair.shutdown.load(Ordering::Acquire) {
            return;
        }
        seen_epoch = pair.race_epoch.load(Ordering::Acquire);

        let worker = pair.worker.lock().unwrap().clone();
        if let Some(worker) = worker {
            worker(&pair);
        }
    }
}
