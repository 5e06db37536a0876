//! The adaptive delay search: once sampling has converged, compute a
//! randomized delay to inject so the two windows' midpoints tend to
//! coincide.

use rand::Rng;

/// Where the next iteration's artificial delay should be injected.
///
/// A tagged choice computed once per iteration and read without further
/// branching on sign, rather than a signed integer encoding who sleeps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DelayPlan {
    /// Sampling hasn't converged yet (or the computed delay rounds to
    /// zero): neither side sleeps.
    None,
    /// Thread A should sleep this many nanoseconds before `a_start` is
    /// recorded.
    DelayA(u64),
    /// Thread B should sleep this many nanoseconds before returning from
    /// `start_race_b`.
    DelayB(u64),
}

impl DelayPlan {
    /// The signed-nanosecond view of the delay: positive means B delays,
    /// negative means A delays, zero means neither.
    pub fn signed_ns(self) -> i64 {
        match self {
            DelayPlan::None => 0,
            DelayPlan::DelayA(ns) => -(ns as i64),
            DelayPlan::DelayB(ns) => ns as i64,
        }
    }

    fn from_signed_ns(ns: i64) -> Self {
        match ns.cmp(&0) {
            std::cmp::Ordering::Less => DelayPlan::DelayA(ns.unsigned_abs()),
            std::cmp::Ordering::Greater => DelayPlan::DelayB(ns as u64),
            std::cmp::Ordering::Equal => DelayPlan::None,
        }
    }
}

/// Floor applied to `sigma_ab` (in nanoseconds) when the statistics are
/// perfectly steady, so the search still explores a small range instead
/// of freezing on one point.
const MIN_SIGMA_NS: f64 = 1.0;

/// Inputs to one round of the delay search, gathered from the pair's
/// running statistics.
#[derive(Clone, Copy, Debug)]
pub struct SearchInput {
    /// `stat_diff_aa.avg`, A's window duration.
    pub mu_a: f64,
    /// `stat_diff_bb.avg`, B's window duration.
    pub mu_b: f64,
    /// `stat_diff_ab.avg`, offset of B's start relative to A's start.
    pub mu_ab: f64,
    /// `stat_diff_ab.avg_dev`, before the dispersion multiplier.
    pub sigma_ab: f64,
    /// Multiplier applied to `sigma_ab` (default `3.0`).
    pub dispersion_multiplier: f64,
    /// Current `delay_bias`, applied on top of the sampled point.
    pub delay_bias: f64,
}

/// The alignment target (the delay that would make the two windows'
/// midpoints coincide) and the range's half-width around it.
pub fn target_and_half_width(input: &SearchInput) -> (f64, f64) {
    let target = input.mu_ab + (input.mu_a - input.mu_b) / 2.0;
    let sigma = (input.sigma_ab * input.dispersion_multiplier).max(MIN_SIGMA_NS);
    let half_width = sigma + input.mu_a.max(input.mu_b);
    (target, half_width)
}

/// Pick a uniformly random point in `[target - half_width, target +
/// half_width]`, apply `delay_bias`, and return the resulting plan.
pub fn search(input: &SearchInput, rng: &mut impl Rng) -> DelayPlan {
    let (target, half_width) = target_and_half_width(input);
    let lo = target - half_width;
    let hi = target + half_width;
    let point = if lo < hi {
        rng.gen_range(lo..hi)
    } else {
        target
    };
    DelayPlan::from_signed_ns((point + input.delay_bias).round() as i64)
}

/// Is the current window noise low enough for the search to engage, or is
/// the workload too noisy (the soft-ceiling tie-break)?
pub fn should_engage(mu_a: f64, mu_b: f64, max_window_ns: f64) -> bool {
    mu_a.max(mu_b) <= max_window_ns
}

/// Pick a fresh `delay_bias`, uniformly within ±10% of the search range's
/// total width, to keep the search from fixating on a local minimum.
pub fn randomize_bias(half_width: f64, rng: &mut impl Rng) -> f64 {
    let span = half_width * 2.0 * 0.10;
    if span <= 0.0 {
        return 0.0;
    }
    rng.gen_range(-span / 2.0..span / 2.0)
}
