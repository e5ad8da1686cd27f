//! Letting a payload hand out handles to itself.
//!
//! A payload opts in by embedding a [`SelfCell`] and implementing
//! [`SharedFromThis`] (usually with `#[derive(SharedFromThis)]`). When the
//! value is adopted through [`Shared::new_self_ref`] or
//! [`Shared::from_box_self_ref`], the cell receives a [`Weak`] to the new
//! block before the handle is returned to the caller.
//!
//! The cell holds a weak unit, not a strong one, so the payload's reference
//! to itself never keeps it alive.
//!
//! # Examples
//!
//! ```
//! use sharc::{SelfCell, Shared, SharedFromThis};
//!
//! #[derive(SharedFromThis)]
//! struct Session {
//!     id: u32,
//!     this: SelfCell<Self>,
//! }
//!
//! impl Session {
//!     fn handle(&self) -> Shared<Self> {
//!         self.shared_from_this().expect("adopted through new_self_ref")
//!     }
//! }
//!
//! let session = Shared::new_self_ref(Session { id: 7, this: SelfCell::new() });
//! let again = session.handle();
//! assert_eq!(again.id, 7);
//! assert!(Shared::ptr_eq(&session, &again));
//! ```

use std::sync::OnceLock;

use crate::{Error, Shared, Weak};

/// Write-once slot holding a payload's weak handle to itself.
///
/// Cloning a `SelfCell` produces an unbound cell: a cloned payload is a new
/// value that has not been adopted yet.
pub struct SelfCell<T> {
    weak: OnceLock<Weak<T>>,
}

impl<T> SelfCell<T> {
    /// Creates an unbound cell.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            weak: OnceLock::new(),
        }
    }

    /// Returns `true` once a `Shared` handle has adopted the owning payload.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.weak.get().is_some()
    }

    fn weak(&self) -> Result<&Weak<T>, Error> {
        self.weak.get().ok_or(Error::SelfUninitialized)
    }
}

impl<T> Default for SelfCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SelfCell<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for SelfCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelfCell")
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// A payload that can produce [`Shared`] and [`Weak`] handles to itself.
///
/// Implementors only point at their [`SelfCell`]; the provided methods do
/// the rest.
pub trait SharedFromThis: Sized {
    /// Returns the cell the adopting handle binds. It must be a field of
    /// `self`, not a cell reached through another handle.
    fn self_cell(&self) -> &SelfCell<Self>;

    /// Returns a new strong handle to `self`.
    ///
    /// # Errors
    ///
    /// - [`Error::SelfUninitialized`] if no `Shared` adopted `self` through
    ///   [`Shared::new_self_ref`] or [`Shared::from_box_self_ref`], for
    ///   example when called while the value is still being built.
    /// - [`Error::Expired`] if the payload is already being destroyed, for
    ///   example when called from `Drop`.
    fn shared_from_this(&self) -> Result<Shared<Self>, Error> {
        self.self_cell().weak()?.upgrade().ok_or(Error::Expired)
    }

    /// Returns a new weak handle to `self`.
    ///
    /// # Errors
    ///
    /// [`Error::SelfUninitialized`] if no `Shared` adopted `self` yet.
    fn weak_from_this(&self) -> Result<Weak<Self>, Error> {
        self.self_cell().weak().cloned()
    }
}

/// Binds the payload's cell to the block `shared` owns.
///
/// Only the first adoption binds; the cell is never re-pointed.
pub(crate) fn bind<T: SharedFromThis>(shared: &Shared<T>) {
    if let Some(value) = Shared::get(shared) {
        // Adoption consumes the value, and a cell can only be bound through
        // adoption, so the cell is still unbound here.
        let newly_bound = value.self_cell().weak.set(Shared::downgrade(shared)).is_ok();
        debug_assert!(newly_bound, "self cell bound twice");
    }
}
