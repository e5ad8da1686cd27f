//! Thread-safe shared ownership with weak observers.
//!
//! `sharc` provides a [`Shared<T>`] handle that jointly owns a heap value and
//! destroys it exactly once when the last strong handle goes away, and a
//! [`Weak<T>`] handle that observes the value without keeping it alive and can
//! atomically try to regain ownership.
//!
//! # Features
//!
//! - **Explicit control block**: strong and weak counts plus a type-erased
//!   destroy operation, shared by every handle to one value
//! - **Race-free upgrade**: [`Weak::lock`] only succeeds while the value is
//!   alive, even against a concurrent final drop
//! - **Custom destroy operations**: adopt a `Box` or raw pointer together with
//!   the code that frees it
//! - **Shared-from-this**: payloads embedding a [`SelfCell`] can produce
//!   handles to themselves via [`SharedFromThis`]
//! - **Aliasing handles**: [`Shared::map`] points at part of a payload while
//!   keeping the whole value alive
//!
//! # Quick Start
//!
//! ```
//! use sharc::Shared;
//!
//! let a = Shared::new(vec![1, 2, 3]);
//! let b = Shared::clone(&a);
//! let w = Shared::downgrade(&a);
//! assert_eq!(Shared::use_count(&a), 2);
//!
//! drop(a);
//! assert_eq!(w.lock().len(), 3);
//!
//! drop(b);
//! assert!(w.expired());
//! assert!(Shared::is_empty(&w.lock()));
//! ```
//!
//! # Cycles
//!
//! There is no cycle detection. Two values holding `Shared` handles to each
//! other are never destroyed; make one edge of the cycle a [`Weak`].
//!
//! # Thread Safety
//!
//! `Shared<T>` and `Weak<T>` are `Send + Sync` when `T: Send + Sync`. The
//! counters are atomic; the payload itself is not synchronized. To replace a
//! handle that other threads are reading, use [`SharedSlot`].

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod control;
mod error;
mod loom;
mod shared;
mod slot;
mod this;
mod tracing;
mod weak;

// Re-export public API
pub use error::Error;
pub use shared::Shared;
pub use slot::SharedSlot;
pub use this::{SelfCell, SharedFromThis};
pub use weak::Weak;

// Re-export derive macro when feature is enabled
#[cfg(feature = "derive")]
pub use sharc_derive::SharedFromThis;
