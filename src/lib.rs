//! Reliably reproduce data races whose vulnerability window is too narrow
//! (nanoseconds to microseconds) to hit by chance.
//!
//! Given a thread A and a thread B, each with one short window of
//! interest, [`Pair`][pair::Pair] drives many repeated executions of the
//! two while adaptively learning the timing distribution of both windows
//! and injecting calibrated delays so that, on a rising fraction of
//! iterations, the windows overlap.
//!
//! This crate is the synchronization and delay-search engine only: the
//! barriers, the statistics, the search, the loop controller, and thread
//! B's lifecycle. It has no file, network, or CLI surface, and does not
//! itself observe whether a race fired, that is the caller's job.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::sync::Arc;
//!
//! use fuzzy_sync::pair::Pair;
//!
//! // Both threads bump a shared counter on entering and leaving their
//! // critical section. `cs == 1 && ct == 2` means A's section ran fully
//! // before B's; `cs == 3 && ct == 4` means fully after. Anything else
//! // means the two sections overlapped.
//! let counter = Arc::new(AtomicU32::new(0));
//! let overlaps = Arc::new(AtomicU32::new(0));
//!
//! let pair = Pair::new();
//! pair.with_options(|o| o.exec_loops = 2_000);
//!
//! let worker_counter = Arc::clone(&counter);
//! pair.reset(
//!     Some(move |pair: &Pair, _arg: &()| {
//!         while pair.run_b() {
//!             pair.start_race_b();
//!             worker_counter.fetch_add(1, Ordering::SeqCst);
//!             worker_counter.fetch_add(1, Ordering::SeqCst);
//!             pair.end_race_b();
//!         }
//!     }),
//!     (),
//! )
//! .unwrap();
//!
//! while pair.run_a() {
//!     pair.start_race_a();
//!     let cs = counter.fetch_add(1, Ordering::SeqCst) + 1;
//!     let ct = counter.fetch_add(1, Ordering::SeqCst) + 1;
//!     if !(cs == 1 && ct == 2) && !(cs == 3 && ct == 4) {
//!         overlaps.fetch_add(1, Ordering::SeqCst);
//!     }
//!     counter.store(0, Ordering::SeqCst);
//!     pair.end_race_a();
//! }
//!
//! pair.cleanup().unwrap();
//! ```

pub mod clock;
pub mod delay;
pub mod error;
pub mod options;
pub mod pair;
pub mod stat;

pub use error::{PairError, Result};
pub use options::Options;
pub use pair::Pair;
pub use stat::RunningStat;
