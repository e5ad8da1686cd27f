//! Control-block tracing support.
//!
//! When the `tracing` feature is enabled, this module emits structured
//! `tracing` events for the lifecycle of each control block. Without the
//! feature every helper is an empty inline function.

#[cfg(feature = "tracing")]
mod internal {
    /// Log the allocation of a control block.
    ///
    /// `layout` is `"inline"` for `Shared::new` and `"adopted"` for blocks
    /// that took over an existing allocation.
    pub fn log_block_allocated(block: usize, layout: &'static str) {
        ::tracing::trace!(block, layout, "block_allocated");
    }

    /// Log the payload being destroyed after the strong count reached zero.
    pub fn log_payload_destroyed(block: usize) {
        ::tracing::trace!(block, "payload_destroyed");
    }

    /// Log the control block being released after the weak count reached zero.
    pub fn log_block_freed(block: usize) {
        ::tracing::trace!(block, "block_freed");
    }

    /// Log a counter that left its valid range, right before aborting.
    pub fn log_counter_violation(counter: &'static str, observed: usize) {
        ::tracing::error!(counter, observed, "refcount_violation");
    }
}

#[cfg(not(feature = "tracing"))]
mod internal {
    #[inline(always)]
    pub const fn log_block_allocated(_block: usize, _layout: &'static str) {}

    #[inline(always)]
    pub const fn log_payload_destroyed(_block: usize) {}

    #[inline(always)]
    pub const fn log_block_freed(_block: usize) {}

    #[inline(always)]
    pub const fn log_counter_violation(_counter: &'static str, _observed: usize) {}
}

pub(crate) use internal::{
    log_block_allocated, log_block_freed, log_counter_violation, log_payload_destroyed,
};
