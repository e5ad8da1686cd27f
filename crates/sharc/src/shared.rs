//! The `Shared<T>` owning handle.

use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

use crate::control::{AdoptedBlock, BoxDeleter, ControlBlock, DropBox, InlineBlock, RawDeleter, RawParts};
use crate::this::{self, SharedFromThis};
use crate::{Error, Weak};

// ============================================================================
// Shared<T> - the owning handle
// ============================================================================

/// A thread-safe, reference-counted owning handle.
///
/// Every non-empty `Shared<T>` holds one strong unit on a control block. The
/// payload is destroyed exactly once, by whichever thread drops the last
/// strong unit, even if [`Weak`] handles still exist. The block itself is
/// released once the last weak handle is gone as well.
///
/// A `Shared<T>` may also be empty, in which case it owns nothing and
/// dereferencing it panics. Use [`Shared::get`] or [`Shared::try_get`] for
/// fallible access.
///
/// Like `Arc`, the handle's own operations are associated functions
/// (`Shared::use_count(&s)`) so they never shadow methods of `T`.
///
/// # Thread Safety
///
/// `Shared<T>` is `Send` and `Sync` when `T: Send + Sync`. The counters are
/// synchronized; the payload is not. Mutating the payload through several
/// handles needs its own lock.
///
/// # Examples
///
/// ```
/// use sharc::Shared;
///
/// let a = Shared::new(String::from("payload"));
/// let b = Shared::clone(&a);
/// assert_eq!(Shared::use_count(&a), 2);
/// assert!(Shared::ptr_eq(&a, &b));
///
/// drop(b);
/// assert!(Shared::unique(&a));
/// ```
pub struct Shared<T: ?Sized> {
    parts: Option<RawParts<T>>,
    /// The handle logically owns a `T`.
    _marker: PhantomData<T>,
}

impl<T> Shared<T> {
    /// Allocates a control block holding `value` and returns its first handle.
    ///
    /// The payload lives in the same allocation as the counters.
    ///
    /// # Examples
    ///
    /// ```
    /// use sharc::Shared;
    ///
    /// let x = Shared::new(42);
    /// assert_eq!(*x, 42);
    /// ```
    pub fn new(value: T) -> Self {
        Self::from_parts(InlineBlock::allocate(value))
    }

    /// Like [`Shared::new`], and also binds the payload's [`SelfCell`](crate::SelfCell)
    /// before returning, so that [`SharedFromThis::shared_from_this`] works
    /// from any method called through the handle.
    pub fn new_self_ref(value: T) -> Self
    where
        T: SharedFromThis,
    {
        let shared = Self::new(value);
        this::bind(&shared);
        shared
    }

    /// Like [`Shared::from_box`], and also binds the payload's
    /// [`SelfCell`](crate::SelfCell) before returning.
    pub fn from_box_self_ref(value: Box<T>) -> Self
    where
        T: SharedFromThis,
    {
        let shared = Self::from_box(value);
        this::bind(&shared);
        shared
    }

    /// Replaces the managed value with a freshly allocated one.
    ///
    /// The new block is installed before the old strong unit is released.
    pub fn reset_to(this: &mut Self, value: T) {
        Self::assign(this, Self::new(value));
    }
}

impl<T: ?Sized> Shared<T> {
    /// Returns a handle that owns nothing.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            parts: None,
            _marker: PhantomData,
        }
    }

    /// Takes ownership of a boxed value.
    ///
    /// The control block is allocated separately; the payload is freed by
    /// dropping the box. Works for unsized payloads such as `Box<[T]>` or
    /// `Box<dyn Trait>`.
    pub fn from_box(value: Box<T>) -> Self {
        // SAFETY: `Box::into_raw` never returns null.
        let ptr = unsafe { NonNull::new_unchecked(Box::into_raw(value)) };
        Self::from_parts(AdoptedBlock::allocate(ptr, DropBox))
    }

    /// Takes ownership of a boxed value with a custom destroy operation.
    ///
    /// `deleter` receives the box back exactly once, on whichever thread
    /// drops the last strong handle.
    ///
    /// # Examples
    ///
    /// ```
    /// use sharc::Shared;
    /// use std::sync::atomic::{AtomicBool, Ordering};
    /// use std::sync::Arc;
    ///
    /// let ran = Arc::new(AtomicBool::new(false));
    /// let flag = Arc::clone(&ran);
    /// let shared = Shared::from_box_with(Box::new(5), move |value| {
    ///     assert_eq!(*value, 5);
    ///     flag.store(true, Ordering::SeqCst);
    /// });
    ///
    /// drop(shared);
    /// assert!(ran.load(Ordering::SeqCst));
    /// ```
    pub fn from_box_with<D>(value: Box<T>, deleter: D) -> Self
    where
        D: FnOnce(Box<T>) + Send + 'static,
    {
        // SAFETY: `Box::into_raw` never returns null.
        let ptr = unsafe { NonNull::new_unchecked(Box::into_raw(value)) };
        Self::from_parts(AdoptedBlock::allocate(ptr, BoxDeleter(deleter)))
    }

    /// Takes ownership of a pointer produced by [`Box::into_raw`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NullPointer`] if `ptr` is null.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `Box::into_raw` and must not be owned by anything
    /// else, including another control block. Adopting the same pointer twice
    /// is not detected and leads to a double free.
    pub unsafe fn from_raw(ptr: *mut T) -> Result<Self, Error> {
        let ptr = NonNull::new(ptr).ok_or(Error::NullPointer)?;
        Ok(Self::from_parts(AdoptedBlock::allocate(ptr, DropBox)))
    }

    /// Takes ownership of `ptr`, destroying it with `deleter`.
    ///
    /// If `ptr` is null, `deleter` is dropped without being called.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NullPointer`] if `ptr` is null.
    ///
    /// # Safety
    ///
    /// `ptr` must stay valid for reads and writes until `deleter` runs and
    /// must not be aliased: nothing outside the returned handles may read or
    /// write through it, and no other control block may own it. It must also
    /// be safe to share between threads as `&T`.
    pub unsafe fn from_raw_with<D>(ptr: *mut T, deleter: D) -> Result<Self, Error>
    where
        D: FnOnce(NonNull<T>) + Send + 'static,
    {
        let ptr = NonNull::new(ptr).ok_or(Error::NullPointer)?;
        Ok(Self::from_parts(AdoptedBlock::allocate(
            ptr,
            RawDeleter(deleter),
        )))
    }

    /// Wraps parts whose strong unit is transferred to the new handle.
    pub(crate) const fn from_parts(parts: RawParts<T>) -> Self {
        Self {
            parts: Some(parts),
            _marker: PhantomData,
        }
    }

    pub(crate) const fn parts(this: &Self) -> Option<RawParts<T>> {
        this.parts
    }

    /// Returns a reference to the payload, or `None` if the handle is empty.
    #[must_use]
    pub fn get(this: &Self) -> Option<&T> {
        // SAFETY: a non-empty handle holds a strong unit, so the payload is alive.
        this.parts.map(|parts| unsafe { parts.ptr.as_ref() })
    }

    /// Returns a reference to the payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Empty`] if the handle owns nothing.
    pub fn try_get(this: &Self) -> Result<&T, Error> {
        Self::get(this).ok_or(Error::Empty)
    }

    /// Returns a mutable reference to the payload if this is the only handle
    /// of any kind that can reach it.
    ///
    /// Returns `None` if the handle is empty, shared with another `Shared`,
    /// or observed by a `Weak` (including a bound [`SelfCell`](crate::SelfCell)).
    /// Handles produced by [`Shared::map`] always return `None`, since the
    /// projection may point at memory the payload does not own.
    pub fn get_mut(this: &mut Self) -> Option<&mut T> {
        let parts = this.parts?;
        if parts.projected {
            return None;
        }
        // SAFETY: we hold a strong unit.
        let block = unsafe { parts.block() };
        if block.is_unique() {
            // SAFETY: no other handle exists and none can be created without
            // going through `this`, which we borrow mutably.
            Some(unsafe { &mut *parts.ptr.as_ptr() })
        } else {
            None
        }
    }

    /// Returns the payload pointer, or `None` if the handle is empty.
    #[must_use]
    pub fn as_ptr(this: &Self) -> Option<NonNull<T>> {
        this.parts.map(|parts| parts.ptr)
    }

    /// Returns `true` if the handle owns nothing.
    #[must_use]
    pub const fn is_empty(this: &Self) -> bool {
        this.parts.is_none()
    }

    /// Number of `Shared` handles sharing this control block; 0 when empty.
    ///
    /// The value is only exact when no other thread is cloning or dropping
    /// handles to the same block.
    #[must_use]
    pub fn use_count(this: &Self) -> usize {
        // SAFETY: we hold a strong unit.
        this.parts
            .map_or(0, |parts| unsafe { parts.block() }.strong_count())
    }

    /// Number of `Weak` handles observing this control block; 0 when empty.
    ///
    /// A bound [`SelfCell`](crate::SelfCell) counts as one weak handle.
    #[must_use]
    pub fn weak_count(this: &Self) -> usize {
        // SAFETY: we hold a strong unit, so the strong side's weak unit is
        // still included in the raw count.
        this.parts.map_or(0, |parts| {
            unsafe { parts.block() }.weak_count().saturating_sub(1)
        })
    }

    /// Returns `true` if this is the only `Shared` handle to its block.
    #[must_use]
    pub fn unique(this: &Self) -> bool {
        Self::use_count(this) == 1
    }

    /// Creates a [`Weak`] handle observing the same block.
    ///
    /// Downgrading an empty handle yields an empty `Weak`.
    #[must_use]
    pub fn downgrade(this: &Self) -> Weak<T> {
        let Some(parts) = this.parts else {
            return Weak::new();
        };
        // SAFETY: we hold a strong unit.
        unsafe { parts.block() }.add_weak();
        Weak::from_parts(parts)
    }

    /// Releases this handle's ownership early, leaving it empty.
    pub fn reset(this: &mut Self) {
        drop(Self::take(this));
    }

    /// Moves the ownership out, leaving the handle empty.
    #[must_use]
    pub const fn take(this: &mut Self) -> Self {
        std::mem::replace(this, Self::empty())
    }

    /// Makes `this` own what `other` owns.
    ///
    /// The new state is installed before the previous strong unit is
    /// released, so assigning a handle to a clone of itself never destroys
    /// the payload.
    pub fn assign(this: &mut Self, other: Self) {
        let previous = std::mem::replace(this, other);
        drop(previous);
    }

    /// Exchanges what two handles own without touching any counter.
    pub fn swap(this: &mut Self, other: &mut Self) {
        std::mem::swap(this, other);
    }

    /// Returns a handle to part of the payload that shares this handle's
    /// control block.
    ///
    /// The result keeps the whole payload alive. This is also how to get an
    /// unsized view such as `Shared<dyn Trait>` or `Shared<[T]>`.
    ///
    /// # Examples
    ///
    /// ```
    /// use sharc::Shared;
    ///
    /// let pair = Shared::new((1, String::from("second")));
    /// let second = Shared::map(Shared::clone(&pair), |p| &p.1);
    /// assert_eq!(&*second, "second");
    /// assert_eq!(Shared::use_count(&pair), 2);
    /// assert!(Shared::owner_eq(&pair, &second));
    /// ```
    ///
    /// The projected handle can still destroy the whole payload, so the
    /// payload must be allowed to cross threads even if the projection is:
    ///
    /// ```compile_fail
    /// use sharc::Shared;
    /// use std::rc::Rc;
    ///
    /// let pair = Shared::new((Rc::new(()), 7_u32));
    /// let number = Shared::map(pair, |p| &p.1);
    /// std::thread::spawn(move || drop(number));
    /// ```
    pub fn map<U, F>(this: Self, f: F) -> Shared<U>
    where
        T: Send + Sync,
        U: ?Sized,
        F: FnOnce(&T) -> &U,
    {
        let Some(parts) = this.parts else {
            return Shared::empty();
        };
        // SAFETY: `this` holds a strong unit, so the payload is alive.
        let projected = NonNull::from(f(unsafe { parts.ptr.as_ref() }));
        // The strong unit moves to the projected handle.
        std::mem::forget(this);
        Shared::from_parts(RawParts {
            ptr: projected,
            block: parts.block,
            projected: true,
        })
    }

    /// Returns `true` if both handles point to the same payload address.
    ///
    /// Two empty handles compare equal.
    #[must_use]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Self::addr(this) == Self::addr(other)
    }

    /// Returns `true` if both handles share a control block.
    #[must_use]
    pub fn owner_eq<U: ?Sized>(this: &Self, other: &Shared<U>) -> bool {
        owner_addr(this.parts) == owner_addr(other.parts)
    }

    /// Orders handles by control block address, so that handles to different
    /// parts of one payload compare as equivalent.
    #[must_use]
    pub fn owner_before<U: ?Sized>(this: &Self, other: &Shared<U>) -> bool {
        owner_addr(this.parts) < owner_addr(other.parts)
    }

    fn addr(this: &Self) -> usize {
        this.parts
            .map_or(0, |parts| parts.ptr.as_ptr().cast::<()>().addr())
    }
}

/// Control block address of a handle, 0 when empty.
pub(crate) fn owner_addr<T: ?Sized>(parts: Option<RawParts<T>>) -> usize {
    parts.map_or(0, |parts| parts.block.as_ptr().addr())
}

impl<T: ?Sized> Deref for Shared<T> {
    type Target = T;

    #[track_caller]
    fn deref(&self) -> &Self::Target {
        match Self::try_get(self) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }
}

impl<T: ?Sized> Clone for Shared<T> {
    fn clone(&self) -> Self {
        if let Some(parts) = self.parts {
            // SAFETY: we hold a strong unit, so the count is at least one.
            unsafe { parts.block() }.add_strong();
        }
        Self {
            parts: self.parts,
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> Drop for Shared<T> {
    fn drop(&mut self) {
        if let Some(parts) = self.parts {
            // SAFETY: this handle owns exactly one strong unit and is going away.
            unsafe { ControlBlock::release_strong(parts.block) };
        }
    }
}

impl<T: ?Sized> Default for Shared<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> From<T> for Shared<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: ?Sized> From<Box<T>> for Shared<T> {
    fn from(value: Box<T>) -> Self {
        Self::from_box(value)
    }
}

impl<T: ?Sized> TryFrom<&Weak<T>> for Shared<T> {
    type Error = Error;

    /// Upgrades `weak`, failing with [`Error::Expired`] if the payload is gone.
    fn try_from(weak: &Weak<T>) -> Result<Self, Self::Error> {
        weak.upgrade().ok_or(Error::Expired)
    }
}

impl<T: ?Sized> AsRef<T> for Shared<T> {
    fn as_ref(&self) -> &T {
        self
    }
}

// Comparisons follow pointer identity, not payload equality.

impl<T: ?Sized> PartialEq for Shared<T> {
    fn eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other)
    }
}

impl<T: ?Sized> Eq for Shared<T> {}

impl<T: ?Sized> PartialOrd for Shared<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: ?Sized> Ord for Shared<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        Self::addr(self).cmp(&Self::addr(other))
    }
}

impl<T: ?Sized> std::hash::Hash for Shared<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Self::addr(self).hash(state);
    }
}

impl<T: ?Sized + std::fmt::Debug> std::fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match Self::get(self) {
            Some(value) => f.debug_tuple("Shared").field(&value).finish(),
            None => write!(f, "Shared(<empty>)"),
        }
    }
}

impl<T: ?Sized + std::fmt::Display> std::fmt::Display for Shared<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match Self::get(self) {
            Some(value) => std::fmt::Display::fmt(value, f),
            None => write!(f, "<empty>"),
        }
    }
}

impl<T: ?Sized> std::fmt::Pointer for Shared<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.parts {
            Some(parts) => std::fmt::Pointer::fmt(&parts.ptr, f),
            None => std::fmt::Pointer::fmt(&std::ptr::null::<()>(), f),
        }
    }
}

// ============================================================================
// Send + Sync trait implementations
// ============================================================================

// SAFETY: the counters are atomic, and the payload is only shared as `&T`
// and dropped on whichever thread releases the last strong unit.
unsafe impl<T: ?Sized + Send + Sync> Send for Shared<T> {}
// SAFETY: as above.
unsafe impl<T: ?Sized + Send + Sync> Sync for Shared<T> {}
