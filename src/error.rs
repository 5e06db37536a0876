use std::io;

use thiserror::Error;

/// Errors produced by a [`Pair`][crate::pair::Pair].
///
/// Timeouts and sample-budget exhaustion are not errors: they are surfaced
/// by [`run_a`][crate::pair::Pair::run_a] returning `false`, per the
/// engine's loop-controller contract.
#[derive(Debug, Error)]
pub enum PairError {
    /// Thread B could not be spawned, or another OS resource needed by
    /// [`reset`][crate::pair::Pair::reset] could not be acquired.
    ///
    /// This is recoverable for the process: the pair is left in its
    /// pre-`reset` state and a fresh `reset` may be attempted.
    #[error("failed to spawn race thread: {0}")]
    Spawn(#[from] io::Error),

    /// Thread B panicked while running the caller's worker closure, which
    /// surfaces at [`cleanup`][crate::pair::Pair::cleanup] as a join
    /// failure.
    ///
    /// Misuse of the barrier calls themselves (an `end_race_a` with no
    /// matching `start_race_a`, a thread calling the wrong role's
    /// operations) is not detected: this engine is deliberately not a
    /// general barrier primitive with its own misuse protection, and
    /// release and debug builds alike have no defined behavior for that
    /// kind of contract violation.
    #[error("caller contract violation: {0}")]
    ContractViolation(&'static str),
}

pub type Result<T> = std::result::Result<T, PairError>;
