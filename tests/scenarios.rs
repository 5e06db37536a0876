//! Concrete race scenarios exercised end-to-end against a real pair of
//! threads. Each scenario is a pair of window timings `(critical_s,
//! critical_t, return_t)`, the delay before a critical section, its
//! length, and the delay after it before the thread loops again, scaled
//! cubically so the window itself is much narrower than the entry/exit
//! delays. The four-state shared counter and the `cs`/`ct` overlap test:
//! each side bumps the counter on entering and leaving its window, and
//! `(1, 2)` / `(3, 4)` are the only non-overlapping orderings.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fuzzy_sync::Pair;

#[derive(Clone, Copy)]
struct Window {
    before: i64,
    during: i64,
    after: i64,
}

fn scaled(units: i64) -> i64 {
    units * units * units
}

fn spin_delay(units: i64) {
    let mut remaining = scaled(units);
    while remaining > 0 {
        std::thread::yield_now();
        remaining -= 1;
    }
}

struct ScenarioResult {
    overlaps: u64,
    ran: u64,
}

fn run_scenario(a: Window, b: Window, exec_loops: u64, min_samples: u64) -> ScenarioResult {
    let c = Arc::new(AtomicI64::new(0));

    let pair = Pair::new();
    pair.with_options(|o| {
        o.exec_loops = exec_loops;
        o.min_samples = min_samples;
    });

    let worker_c = Arc::clone(&c);
    pair.reset(
        Some(move |pair: &Pair, _arg: &()| {
            while pair.run_b() {
                pair.start_race_b();
                spin_delay(b.before);
                worker_c.fetch_add(1, Ordering::SeqCst);
                spin_delay(b.during);
                worker_c.fetch_add(1, Ordering::SeqCst);
                spin_delay(b.after);
                pair.end_race_b();
            }
        }),
        (),
    )
    .unwrap();

    let mut overlaps = 0u64;
    let mut ran = 0u64;
    let mut last_overlaps = 0u64;

    while pair.run_a() {
        pair.start_race_a();
        spin_delay(a.before);
        let cs = c.fetch_add(1, Ordering::SeqCst) + 1;
        spin_delay(a.during);
        let ct = c.fetch_add(1, Ordering::SeqCst) + 1;
        spin_delay(a.after);
        pair.end_race_a();
        ran += 1;

        if !(cs == 1 && ct == 2) && !(cs == 3 && ct == 4) {
            overlaps += 1;
        }
        assert!(overlaps >= last_overlaps);
        last_overlaps = overlaps;

        let leftover = c.fetch_sub(4, Ordering::SeqCst) - 4;
        assert_eq!(leftover, 0, "counter left in a torn state between iterations");

        if overlaps >= 100 {
            break;
        }
    }

    pair.cleanup().unwrap();
    let (a_cntr, b_cntr) = pair.barrier_counters();
    assert_eq!(a_cntr, b_cntr, "barrier counters diverged after cleanup");

    ScenarioResult { overlaps, ran }
}

#[test]
fn aligned_trivial_race_overlaps_at_least_once() {
    let a = Window { before: 0, during: 0, after: 0 };
    let b = Window { before: 0, during: 0, after: 0 };

    let c = Arc::new(AtomicI64::new(0));
    let pair = Pair::new();
    pair.with_options(|o| o.exec_loops = 10_000);

    let worker_c = Arc::clone(&c);
    pair.reset(
        Some(move |pair: &Pair, _arg: &()| {
            while pair.run_b() {
                pair.start_race_b();
                spin_delay(b.before);
                worker_c.fetch_add(1, Ordering::SeqCst);
                spin_delay(b.during);
                worker_c.fetch_add(1, Ordering::SeqCst);
                spin_delay(b.after);
                pair.end_race_b();
            }
        }),
        (),
    )
    .unwrap();

    let mut overlaps = 0u64;
    while pair.run_a() {
        pair.start_race_a();
        spin_delay(a.before);
        let cs = c.fetch_add(1, Ordering::SeqCst) + 1;
        spin_delay(a.during);
        let ct = c.fetch_add(1, Ordering::SeqCst) + 1;
        spin_delay(a.after);
        pair.end_race_a();

        if !(cs == 1 && ct == 2) && !(cs == 3 && ct == 4) {
            overlaps += 1;
        }
        c.fetch_sub(4, Ordering::SeqCst);
    }

    pair.cleanup().unwrap();
    let (a_cntr, b_cntr) = pair.barrier_counters();
    assert_eq!(a_cntr, b_cntr, "barrier counters diverged after cleanup");
    assert!(overlaps >= 1);
}

#[test]
fn shifted_race_short_b_reaches_a_hundred_overlaps() {
    let a = Window { before: 3, during: 1, after: 1 };
    let b = Window { before: 1, during: 1, after: 3 };
    let result = run_scenario(a, b, 3_000_000, 10_000);
    assert!(result.overlaps >= 100, "only {} overlaps in {} iterations", result.overlaps, result.ran);
}

#[test]
fn reversed_shift_reaches_a_hundred_overlaps() {
    let a = Window { before: 1, during: 1, after: 3 };
    let b = Window { before: 3, during: 1, after: 1 };
    let result = run_scenario(a, b, 3_000_000, 10_000);
    assert!(result.overlaps >= 100, "only {} overlaps in {} iterations", result.overlaps, result.ran);
}

#[test]
fn asymmetric_window_lengths_still_reach_a_hundred_overlaps() {
    let a = Window { before: 3, during: 1, after: 0 };
    let b = Window { before: 0, during: 1, after: 2 };
    let result = run_scenario(a, b, 3_000_000, 10_000);
    assert!(result.overlaps >= 100, "only {} overlaps in {} iterations", result.overlaps, result.ran);
}

#[test]
fn degenerate_b_window_still_overlaps() {
    let a = Window { before: 3, during: 1, after: 1 };
    let b = Window { before: 0, during: 0, after: 0 };
    let result = run_scenario(a, b, 3_000_000, 10_000);
    assert!(result.overlaps >= 1, "no overlap in {} iterations", result.ran);
}

#[test]
fn cancellation_unblocks_both_sides_quickly() {
    let pair = Pair::new();
    pair.with_options(|o| o.exec_loops = 10_000_000);

    pair.reset(
        Some(|pair: &Pair, _: &()| {
            while pair.run_b() {
                pair.start_race_b();
                pair.end_race_b();
            }
        }),
        (),
    )
    .unwrap();

    for _ in 0..1_000 {
        if !pair.run_a() {
            break;
        }
        pair.start_race_a();
        pair.end_race_a();
    }

    let start = std::time::Instant::now();
    pair.request_exit();
    while pair.run_a() {
        pair.start_race_a();
        pair.end_race_a();
    }
    assert!(start.elapsed() < Duration::from_secs(1));

    pair.cleanup().unwrap();
    let (a_cntr, b_cntr) = pair.barrier_counters();
    assert_eq!(a_cntr, b_cntr, "barrier counters diverged after cleanup");
}
