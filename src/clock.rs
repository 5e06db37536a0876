//! Monotonic-clock hook.
//!
//! [`Pair`][crate::pair::Pair] timestamps every barrier with a monotonic
//! clock. The default, [`MonotonicClock`], calls `clock_gettime(CLOCK_MONOTONIC, ..)`
//! directly, the same pattern the rest of this crate uses for every other
//! raw syscall. Callers that need a different time source (a virtual clock
//! in a test, a clock that can be paused) can supply their own via
//! [`Pair::set_clock`][crate::pair::Pair::set_clock].

use std::mem::MaybeUninit;
use std::time::Duration;

/// A source of monotonically increasing timestamps, in nanoseconds since an
/// arbitrary epoch.
///
/// Implementations must never go backwards between two calls from the same
/// thread.
pub trait Clock: Send {
    /// Current time, in nanoseconds since an arbitrary but fixed epoch.
    fn now_ns(&self) -> i64;
}

/// `CLOCK_MONOTONIC`-backed clock.
///
/// This is the default clock used by a freshly [`init`][crate::pair::Pair::new]ed
/// pair.
#[derive(Clone, Copy, Debug, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now_ns(&self) -> i64 {
        let mut ts = MaybeUninit::uninit();
        // Safe: `clock_gettime` only ever writes into `ts`, and
        // `CLOCK_MONOTONIC` is available on every Linux/Android target this
        // crate supports.
        let ts = unsafe {
            libc::clock_gettime(libc::CLOCK_MONOTONIC, ts.as_mut_ptr());
            ts.assume_init()
        };
        ts.tv_sec as i64 * 1_000_000_000 + ts.tv_nsec as i64
    }
}

/// Sleep for `dur` using the monotonic clock, resuming on spurious early
/// wakeups.
///
/// `std::thread::sleep` is already specified to sleep *at least* the given
/// duration on every platform we target, but we re-check against our own
/// clock so callers that swap in a virtual `Clock` still get delays with
/// the semantics barrier delay injection needs: a consistent view of
/// elapsed time across the sleep and the timestamps taken around it.
pub fn sleep_ns(clock: &dyn Clock, ns: i64) {
    if ns <= 0 {
        return;
    }
    let deadline = clock.now_ns() + ns;
    loop {
        let remaining = deadline - clock.now_ns();
        if remaining <= 0 {
            return;
        }
        std::thread::sleep(Duration::from_nanos(remaining as u64));
    }
}
