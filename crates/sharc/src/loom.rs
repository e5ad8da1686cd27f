//! Atomics used by the control block.
//!
//! Normal builds use `std::sync::atomic`. Building with `--cfg loom` swaps in
//! `loom`'s atomics so the counter protocol can be model-checked:
//!
//! ```text
//! RUSTFLAGS="--cfg loom" cargo test -p sharc --release --test loom_control_block
//! ```

#[cfg(not(loom))]
pub(crate) use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(loom)]
pub(crate) use ::loom::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::utils::Backoff;

/// Waits one round in a retry loop. Under loom the scheduler has to be told,
/// otherwise a spinning thread never lets the lock holder run.
#[cfg(not(loom))]
pub(crate) fn spin_wait(backoff: &Backoff) {
    backoff.spin();
}

#[cfg(loom)]
pub(crate) fn spin_wait(_backoff: &Backoff) {
    ::loom::thread::yield_now();
}
