//! The `Weak<T>` observer handle.

use std::marker::PhantomData;

use crate::control::{ControlBlock, RawParts};
use crate::shared::owner_addr;
use crate::Shared;

/// A non-owning observer of a [`Shared`] payload.
///
/// A `Weak<T>` keeps the control block allocated but not the payload. The
/// only way back to the payload is [`Weak::lock`] (or [`Weak::upgrade`]),
/// which atomically re-acquires a strong unit if and only if the payload has
/// not been destroyed yet.
///
/// The stored payload pointer may dangle once the payload is destroyed; it
/// is never dereferenced without a successful upgrade.
///
/// # Examples
///
/// ```
/// use sharc::Shared;
///
/// let strong = Shared::new(42);
/// let weak = Shared::downgrade(&strong);
///
/// assert_eq!(*weak.lock(), 42);
///
/// drop(strong);
/// assert!(weak.expired());
/// assert!(Shared::is_empty(&weak.lock()));
/// ```
pub struct Weak<T: ?Sized> {
    parts: Option<RawParts<T>>,
    _marker: PhantomData<T>,
}

impl<T: ?Sized> Weak<T> {
    /// Constructs a `Weak` that observes nothing and never upgrades.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            parts: None,
            _marker: PhantomData,
        }
    }

    /// Wraps parts whose weak unit is transferred to the new handle.
    pub(crate) const fn from_parts(parts: RawParts<T>) -> Self {
        Self {
            parts: Some(parts),
            _marker: PhantomData,
        }
    }

    /// Attempts to take shared ownership of the payload.
    ///
    /// Returns an empty [`Shared`] if the payload has been destroyed or if
    /// this handle observes nothing. A successful lock keeps the payload
    /// alive until the returned handle is dropped, even if every other strong
    /// handle is dropped in the meantime.
    #[must_use]
    pub fn lock(&self) -> Shared<T> {
        self.upgrade().unwrap_or_default()
    }

    /// Attempts to take shared ownership of the payload.
    ///
    /// Same protocol as [`Weak::lock`], returning `None` instead of an empty
    /// handle.
    #[must_use]
    pub fn upgrade(&self) -> Option<Shared<T>> {
        let parts = self.parts?;
        // SAFETY: our weak unit keeps the block allocated.
        if unsafe { parts.block() }.try_add_strong() {
            Some(Shared::from_parts(parts))
        } else {
            None
        }
    }

    /// Returns `true` if the payload has been destroyed, or if this handle
    /// observes nothing.
    ///
    /// A `false` answer can become stale immediately; only [`Weak::lock`]
    /// is authoritative.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.use_count() == 0
    }

    /// Number of `Shared` handles to the observed payload; 0 when expired.
    #[must_use]
    pub fn use_count(&self) -> usize {
        // SAFETY: our weak unit keeps the block allocated.
        self.parts
            .map_or(0, |parts| unsafe { parts.block() }.strong_count())
    }

    /// Number of `Weak` handles observing the block, this one included; 0 when empty.
    ///
    /// The value is approximate while other threads clone or drop handles.
    /// If the last `Shared` is dropped between the two counter reads, the
    /// strong side's unit is reported as one extra `Weak`.
    #[must_use]
    pub fn weak_count(&self) -> usize {
        let Some(parts) = self.parts else {
            return 0;
        };
        // SAFETY: our weak unit keeps the block allocated.
        let block = unsafe { parts.block() };
        let weak = block.weak_count();
        if block.strong_count() > 0 {
            weak.saturating_sub(1)
        } else {
            weak
        }
    }

    /// Stops observing, leaving this handle empty.
    pub fn reset(&mut self) {
        drop(std::mem::take(self));
    }

    /// Exchanges what two handles observe.
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    /// Returns `true` if both handles observe the same payload address.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        let addr = |weak: &Self| {
            weak.parts
                .map_or(0, |parts| parts.ptr.as_ptr().cast::<()>().addr())
        };
        addr(self) == addr(other)
    }

    /// Returns `true` if both handles share a control block.
    #[must_use]
    pub fn owner_eq<U: ?Sized>(&self, other: &Weak<U>) -> bool {
        owner_addr(self.parts) == owner_addr(other.parts)
    }

    /// Returns `true` if this handle shares a control block with `shared`.
    #[must_use]
    pub fn owned_by<U: ?Sized>(&self, shared: &Shared<U>) -> bool {
        owner_addr(self.parts) == owner_addr(Shared::parts(shared))
    }

    /// Orders handles by control block address.
    #[must_use]
    pub fn owner_before<U: ?Sized>(&self, other: &Weak<U>) -> bool {
        owner_addr(self.parts) < owner_addr(other.parts)
    }
}

impl<T: ?Sized> Clone for Weak<T> {
    fn clone(&self) -> Self {
        if let Some(parts) = self.parts {
            // SAFETY: our weak unit keeps the block allocated.
            unsafe { parts.block() }.add_weak();
        }
        Self {
            parts: self.parts,
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> Drop for Weak<T> {
    fn drop(&mut self) {
        if let Some(parts) = self.parts {
            // SAFETY: this handle owns exactly one weak unit and is going away.
            unsafe { ControlBlock::release_weak(parts.block) };
        }
    }
}

impl<T: ?Sized> Default for Weak<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> From<&Shared<T>> for Weak<T> {
    fn from(shared: &Shared<T>) -> Self {
        Shared::downgrade(shared)
    }
}

impl<T: ?Sized> std::fmt::Debug for Weak<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(Weak)")
    }
}

// SAFETY: a `Weak` only touches the atomic counters, and hands out the
// payload only through `Shared`, which carries the same bounds.
unsafe impl<T: ?Sized + Send + Sync> Send for Weak<T> {}
// SAFETY: as above.
unsafe impl<T: ?Sized + Send + Sync> Sync for Weak<T> {}
