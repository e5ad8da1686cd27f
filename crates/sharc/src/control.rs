//! The shared counting record behind every [`Shared`](crate::Shared) and
//! [`Weak`](crate::Weak) handle.
//!
//! A control block starts life with `strong = 1, weak = 1`. The strong side
//! collectively holds one weak unit, so `weak` can only reach zero after the
//! payload has been destroyed:
//!
//! ```text
//! LIVE (strong > 0) --strong hits 0--> PAYLOAD_DESTROYED --weak hits 0--> FREED
//! ```
//!
//! Two concrete layouts exist. [`InlineBlock`] stores the payload next to the
//! counters (one allocation, used by `Shared::new`). [`AdoptedBlock`] stores a
//! pointer to a payload allocated elsewhere together with the operation that
//! destroys it. Handles only ever see the [`ControlBlock`] header; the layout
//! is recovered through the two function pointers stored in it.

use std::cell::UnsafeCell;
use std::mem::ManuallyDrop;
use std::ptr::{addr_of, NonNull};

use crossbeam::utils::Backoff;

use crate::loom::{spin_wait, AtomicUsize, Ordering};

/// Counts above this are treated as a leak of handles, not a valid state.
const MAX_REFCOUNT: usize = usize::MAX >> 1;

/// Value parked in `weak` while [`ControlBlock::is_unique`] inspects `strong`.
/// No weak unit can be taken while it is set.
const WEAK_LOCKED: usize = usize::MAX;

// ============================================================================
// ControlBlock - the type-erased header
// ============================================================================

/// Header shared by every block layout.
///
/// Handle code only touches the counters through the methods below; the
/// header is never written through a plain field store after allocation.
#[repr(C)]
pub(crate) struct ControlBlock {
    /// Number of `Shared` handles keeping the payload alive.
    strong: AtomicUsize,
    /// Number of `Weak` handles, plus one unit held by the strong side.
    weak: AtomicUsize,
    /// Destroys the payload. Called exactly once, when `strong` hits zero.
    destroy: unsafe fn(NonNull<ControlBlock>),
    /// Releases the block allocation. Called exactly once, when `weak` hits zero.
    free: unsafe fn(NonNull<ControlBlock>),
}

impl ControlBlock {
    fn new(destroy: unsafe fn(NonNull<Self>), free: unsafe fn(NonNull<Self>)) -> Self {
        Self {
            strong: AtomicUsize::new(1),
            weak: AtomicUsize::new(1),
            destroy,
            free,
        }
    }

    /// Current strong count. Advisory under concurrent mutation.
    pub(crate) fn strong_count(&self) -> usize {
        self.strong.load(Ordering::Acquire)
    }

    /// Current raw weak count, including the unit held by the strong side.
    pub(crate) fn weak_count(&self) -> usize {
        match self.weak.load(Ordering::Acquire) {
            // Only the strong side's unit exists while the count is locked.
            WEAK_LOCKED => 1,
            count => count,
        }
    }

    /// Whether the caller's strong unit is the only unit of either kind.
    ///
    /// Locking `weak` first closes the window in which another thread
    /// upgrades a `Weak` and then drops it between the two reads.
    pub(crate) fn is_unique(&self) -> bool {
        if self
            .weak
            .compare_exchange(1, WEAK_LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }
        let unique = self.strong.load(Ordering::Acquire) == 1;
        self.weak.store(1, Ordering::Release);
        unique
    }

    /// Unconditional strong increment.
    ///
    /// The caller must already hold a strong unit, so the count cannot be zero.
    pub(crate) fn add_strong(&self) {
        let previous = self.strong.fetch_add(1, Ordering::Relaxed);
        if previous == 0 || previous > MAX_REFCOUNT {
            counter_violation("strong", previous);
        }
    }

    /// Increments the strong count only if it is still non-zero.
    ///
    /// This is the only way to go from a weak unit to a strong one. A plain
    /// load followed by an increment could revive a payload that another
    /// thread is already destroying.
    pub(crate) fn try_add_strong(&self) -> bool {
        let backoff = Backoff::new();
        let mut current = self.strong.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                return false;
            }
            if current > MAX_REFCOUNT {
                counter_violation("strong", current);
            }
            match self.strong.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => {
                    current = actual;
                    spin_wait(&backoff);
                }
            }
        }
    }

    /// Weak increment.
    ///
    /// The caller must hold either a strong or a weak unit. Waits while
    /// [`is_unique`](Self::is_unique) holds the count locked.
    pub(crate) fn add_weak(&self) {
        let backoff = Backoff::new();
        let mut current = self.weak.load(Ordering::Relaxed);
        loop {
            if current == WEAK_LOCKED {
                spin_wait(&backoff);
                current = self.weak.load(Ordering::Relaxed);
                continue;
            }
            if current == 0 || current > MAX_REFCOUNT {
                counter_violation("weak", current);
            }
            match self.weak.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Releases one strong unit.
    ///
    /// The thread that drives `strong` to zero destroys the payload and then
    /// gives up the weak unit owned by the strong side, which may free the
    /// block.
    ///
    /// # Safety
    ///
    /// `this` must point to a live block and the caller must own the strong
    /// unit being released. The unit must not be used afterwards.
    pub(crate) unsafe fn release_strong(this: NonNull<Self>) {
        // SAFETY: the caller's strong unit keeps the block allocated.
        let previous = unsafe { this.as_ref() }
            .strong
            .fetch_sub(1, Ordering::AcqRel);
        if previous != 1 {
            if previous == 0 {
                counter_violation("strong", previous);
            }
            return;
        }

        crate::tracing::log_payload_destroyed(this.as_ptr().addr());

        // SAFETY: we observed the 1 -> 0 transition, so no other handle can
        // reach the payload any more, and the implicit weak unit still keeps
        // the block itself allocated.
        let destroy = unsafe { this.as_ref() }.destroy;
        unsafe { destroy(this) };

        // SAFETY: this is the weak unit held on behalf of the strong side.
        unsafe { Self::release_weak(this) };
    }

    /// Releases one weak unit, freeing the block if it was the last.
    ///
    /// # Safety
    ///
    /// `this` must point to a live block and the caller must own the weak
    /// unit being released. The unit must not be used afterwards.
    pub(crate) unsafe fn release_weak(this: NonNull<Self>) {
        // SAFETY: the caller's weak unit keeps the block allocated.
        let previous = unsafe { this.as_ref() }
            .weak
            .fetch_sub(1, Ordering::AcqRel);
        if previous != 1 {
            if previous == 0 {
                counter_violation("weak", previous);
            }
            return;
        }

        crate::tracing::log_block_freed(this.as_ptr().addr());

        // SAFETY: weak reached zero, which implies strong reached zero first.
        // Nothing else references the block.
        let free = unsafe { this.as_ref() }.free;
        unsafe { free(this) };
    }
}

/// A counter left its valid range. Continuing would risk a double free or a
/// use after free, so the process is aborted instead of unwinding.
#[cold]
#[inline(never)]
fn counter_violation(counter: &'static str, observed: usize) -> ! {
    crate::tracing::log_counter_violation(counter, observed);
    std::process::abort()
}

// ============================================================================
// RawParts - the (payload, block) pair stored by handles
// ============================================================================

/// The pointer pair every non-empty handle carries.
///
/// `ptr` is the payload owned by `block` unless `projected` is set, in which
/// case it came from [`Shared::map`](crate::Shared::map) and may point
/// anywhere the projection closure chose.
pub(crate) struct RawParts<T: ?Sized> {
    pub(crate) ptr: NonNull<T>,
    pub(crate) block: NonNull<ControlBlock>,
    pub(crate) projected: bool,
}

impl<T: ?Sized> RawParts<T> {
    /// Returns the header.
    ///
    /// # Safety
    ///
    /// The caller must hold a strong or weak unit on `block`.
    pub(crate) unsafe fn block(&self) -> &ControlBlock {
        // SAFETY: guaranteed by the caller.
        unsafe { self.block.as_ref() }
    }
}

impl<T: ?Sized> Clone for RawParts<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for RawParts<T> {}

// ============================================================================
// InlineBlock - header and payload in one allocation
// ============================================================================

/// Block layout used by `Shared::new`.
#[repr(C)]
pub(crate) struct InlineBlock<T> {
    header: ControlBlock,
    value: UnsafeCell<ManuallyDrop<T>>,
}

impl<T> InlineBlock<T> {
    /// Allocates a block owning `value`, with `strong = 1, weak = 1`.
    pub(crate) fn allocate(value: T) -> RawParts<T> {
        let block = Box::into_raw(Box::new(Self {
            header: ControlBlock::new(Self::destroy, Self::free),
            value: UnsafeCell::new(ManuallyDrop::new(value)),
        }));

        crate::tracing::log_block_allocated(block.addr(), "inline");

        // SAFETY: `Box::into_raw` never returns null. `ManuallyDrop<T>` is
        // `repr(transparent)`, so the cell's contents are a `T`.
        unsafe {
            let ptr = UnsafeCell::raw_get(addr_of!((*block).value)).cast::<T>();
            RawParts {
                ptr: NonNull::new_unchecked(ptr),
                block: NonNull::new_unchecked(block.cast::<ControlBlock>()),
                projected: false,
            }
        }
    }

    /// Type-erased payload destructor.
    unsafe fn destroy(header: NonNull<ControlBlock>) {
        let block = header.cast::<Self>().as_ptr();
        // SAFETY: `header` is the first field of a live `InlineBlock<T>` and
        // the caller drove the strong count to zero.
        unsafe {
            let value = UnsafeCell::raw_get(addr_of!((*block).value));
            ManuallyDrop::drop(&mut *value);
        }
    }

    /// Type-erased deallocation. The payload was already dropped.
    unsafe fn free(header: NonNull<ControlBlock>) {
        // SAFETY: the block came from `Box::into_raw` in `allocate`, and the
        // `ManuallyDrop` keeps the payload from being dropped twice.
        drop(unsafe { Box::from_raw(header.cast::<Self>().as_ptr()) });
    }
}

// ============================================================================
// AdoptedBlock - header plus a payload allocated elsewhere
// ============================================================================

/// Destroys an adopted payload.
pub(crate) trait Dispose<T: ?Sized> {
    /// # Safety
    ///
    /// `ptr` must be the pointer the block adopted, and this is called once.
    unsafe fn dispose(self, ptr: NonNull<T>);
}

/// Default destroy operation: the payload came from `Box::into_raw`.
pub(crate) struct DropBox;

impl<T: ?Sized> Dispose<T> for DropBox {
    unsafe fn dispose(self, ptr: NonNull<T>) {
        // SAFETY: adopted pointers without a custom deleter come from a `Box`.
        drop(unsafe { Box::from_raw(ptr.as_ptr()) });
    }
}

/// Caller-supplied deleter receiving the payload back as a `Box`.
pub(crate) struct BoxDeleter<D>(pub(crate) D);

impl<T: ?Sized, D: FnOnce(Box<T>)> Dispose<T> for BoxDeleter<D> {
    unsafe fn dispose(self, ptr: NonNull<T>) {
        // SAFETY: `Shared::from_box_with` adopts pointers from `Box::into_raw`.
        (self.0)(unsafe { Box::from_raw(ptr.as_ptr()) });
    }
}

/// Caller-supplied deleter receiving the raw pointer.
pub(crate) struct RawDeleter<D>(pub(crate) D);

impl<T: ?Sized, D: FnOnce(NonNull<T>)> Dispose<T> for RawDeleter<D> {
    unsafe fn dispose(self, ptr: NonNull<T>) {
        (self.0)(ptr);
    }
}

/// Block layout used when adopting an existing allocation.
#[repr(C)]
pub(crate) struct AdoptedBlock<T: ?Sized, D> {
    header: ControlBlock,
    ptr: NonNull<T>,
    deleter: UnsafeCell<ManuallyDrop<D>>,
}

impl<T: ?Sized, D: Dispose<T>> AdoptedBlock<T, D> {
    /// Allocates a block adopting `ptr`, with `strong = 1, weak = 1`.
    pub(crate) fn allocate(ptr: NonNull<T>, deleter: D) -> RawParts<T> {
        let block = Box::into_raw(Box::new(Self {
            header: ControlBlock::new(Self::destroy, Self::free),
            ptr,
            deleter: UnsafeCell::new(ManuallyDrop::new(deleter)),
        }));

        crate::tracing::log_block_allocated(block.addr(), "adopted");

        RawParts {
            ptr,
            // SAFETY: `Box::into_raw` never returns null.
            block: unsafe { NonNull::new_unchecked(block.cast::<ControlBlock>()) },
            projected: false,
        }
    }

    unsafe fn destroy(header: NonNull<ControlBlock>) {
        let block = header.cast::<Self>().as_ptr();
        // SAFETY: `header` is the first field of a live `AdoptedBlock` and the
        // strong count just reached zero, so the deleter is taken exactly once.
        unsafe {
            let ptr = *addr_of!((*block).ptr);
            let deleter = UnsafeCell::raw_get(addr_of!((*block).deleter));
            let deleter = ManuallyDrop::take(&mut *deleter);
            deleter.dispose(ptr);
        }
    }

    unsafe fn free(header: NonNull<ControlBlock>) {
        // SAFETY: the block came from `Box::into_raw` in `allocate`; the
        // deleter was moved out by `destroy`.
        drop(unsafe { Box::from_raw(header.cast::<Self>().as_ptr()) });
    }
}
