//! A `Shared<T>` that many threads can read and replace at once.
//!
//! `Shared::assign` takes `&mut self`, so nobody can observe a plain handle
//! mid-assignment. `SharedSlot` is the variant meant to be shared: readers
//! take a clone of whatever the slot currently holds, writers install a new
//! handle, and the old payload is released only after the new one is
//! visible.
//!
//! # Examples
//!
//! ```
//! use sharc::{Shared, SharedSlot};
//!
//! let config = SharedSlot::new(Shared::new("v1"));
//!
//! let reader = std::thread::scope(|scope| {
//!     scope.spawn(|| *config.load()).join().unwrap()
//! });
//! assert_eq!(reader, "v1");
//!
//! config.store(Shared::new("v2"));
//! assert_eq!(*config.load(), "v2");
//! ```

use parking_lot::Mutex;

use crate::{Shared, Weak};

/// A lockable slot holding a [`Shared`] handle.
///
/// The lock only guards the handle itself, never the payload. Payload
/// destructors always run after the lock has been released.
pub struct SharedSlot<T: ?Sized> {
    inner: Mutex<Shared<T>>,
}

impl<T: ?Sized> SharedSlot<T> {
    /// Creates a slot holding `value`.
    #[must_use]
    pub const fn new(value: Shared<T>) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Creates a slot holding an empty handle.
    #[must_use]
    pub const fn empty() -> Self {
        Self::new(Shared::empty())
    }

    /// Returns a new strong handle to whatever the slot holds right now.
    #[must_use]
    pub fn load(&self) -> Shared<T> {
        Shared::clone(&self.inner.lock())
    }

    /// Returns a weak handle to whatever the slot holds right now.
    #[must_use]
    pub fn downgrade(&self) -> Weak<T> {
        Shared::downgrade(&self.inner.lock())
    }

    /// Replaces the held handle, releasing the previous one afterwards.
    pub fn store(&self, value: Shared<T>) {
        drop(self.swap(value));
    }

    /// Replaces the held handle and returns the previous one.
    #[must_use = "dropping the returned handle is what `store` is for"]
    pub fn swap(&self, value: Shared<T>) -> Shared<T> {
        let mut guard = self.inner.lock();
        std::mem::replace(&mut *guard, value)
    }

    /// Empties the slot and returns what it held.
    #[must_use]
    pub fn take(&self) -> Shared<T> {
        self.swap(Shared::empty())
    }

    /// Returns `true` if the slot currently holds an empty handle.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        Shared::is_empty(&self.inner.lock())
    }

    /// Consumes the slot and returns the held handle.
    pub fn into_inner(self) -> Shared<T> {
        self.inner.into_inner()
    }
}

impl<T: ?Sized> Default for SharedSlot<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized> From<Shared<T>> for SharedSlot<T> {
    fn from(value: Shared<T>) -> Self {
        Self::new(value)
    }
}

impl<T: ?Sized + std::fmt::Debug> std::fmt::Debug for SharedSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedSlot").field(&self.load()).finish()
    }
}
