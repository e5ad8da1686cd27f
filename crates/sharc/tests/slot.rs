//! Tests for SharedSlot, the lockable handle shared between threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use sharc::{Shared, SharedSlot};

struct Versioned {
    version: usize,
    drops: Arc<AtomicUsize>,
}

impl Drop for Versioned {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_load_and_store() {
    let slot = SharedSlot::new(Shared::new(1));
    let first = slot.load();
    assert_eq!(*first, 1);
    assert_eq!(Shared::use_count(&first), 2);

    slot.store(Shared::new(2));
    assert_eq!(*slot.load(), 2);
    // The earlier reader keeps its payload.
    assert_eq!(*first, 1);
    assert!(Shared::unique(&first));
}

#[test]
fn test_empty_slot() {
    let slot: SharedSlot<String> = SharedSlot::empty();
    assert!(slot.is_empty());
    assert!(Shared::is_empty(&slot.load()));
    assert!(slot.downgrade().expired());

    let default: SharedSlot<str> = SharedSlot::default();
    assert!(default.is_empty());
}

#[test]
fn test_swap_and_take() {
    let slot = SharedSlot::from(Shared::new("a"));
    let previous = slot.swap(Shared::new("b"));
    assert_eq!(*previous, "a");
    assert_eq!(*slot.load(), "b");

    let taken = slot.take();
    assert_eq!(*taken, "b");
    assert!(slot.is_empty());

    let inner = SharedSlot::new(Shared::clone(&taken)).into_inner();
    assert!(Shared::ptr_eq(&inner, &taken));
}

#[test]
fn test_downgrade_tracks_stored_value() {
    let slot = SharedSlot::new(Shared::new(10));
    let weak = slot.downgrade();
    assert_eq!(*weak.lock(), 10);

    slot.store(Shared::new(11));
    assert!(weak.expired());
}

#[test]
fn test_debug() {
    let slot = SharedSlot::new(Shared::new(3));
    assert_eq!(format!("{slot:?}"), "SharedSlot(Shared(3))");
}

#[test]
fn test_concurrent_readers_and_writer() {
    let drops = Arc::new(AtomicUsize::new(0));
    let slot = SharedSlot::new(Shared::new(Versioned {
        version: 0,
        drops: Arc::clone(&drops),
    }));

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                let mut last = 0;
                for _ in 0..2_000 {
                    let current = slot.load();
                    // Versions only move forward.
                    assert!(current.version >= last);
                    last = current.version;
                }
            });
        }

        scope.spawn(|| {
            for version in 1..=1_000 {
                slot.store(Shared::new(Versioned {
                    version,
                    drops: Arc::clone(&drops),
                }));
            }
        });
    });

    assert_eq!(slot.load().version, 1_000);
    assert_eq!(drops.load(Ordering::SeqCst), 1_000);

    drop(slot);
    assert_eq!(drops.load(Ordering::SeqCst), 1_001);
}
