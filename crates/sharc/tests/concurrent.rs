//! Tests for handles shared across threads.
//!
//! These exercise the counter protocol under real contention: many threads
//! cloning and dropping strong handles, and weak upgrades racing the final
//! strong drop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use sharc::{Shared, Weak};

const MAGIC: u64 = 0x5AA7_ED00;

struct Payload {
    magic: u64,
    drops: Arc<AtomicUsize>,
}

impl Payload {
    fn new(drops: &Arc<AtomicUsize>) -> Self {
        Self {
            magic: MAGIC,
            drops: Arc::clone(drops),
        }
    }
}

impl Drop for Payload {
    fn drop(&mut self) {
        assert_eq!(self.magic, MAGIC, "payload dropped twice");
        self.magic = 0;
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Strong handles
// ============================================================================

#[test]
fn test_concurrent_clone_and_drop() {
    let drops = Arc::new(AtomicUsize::new(0));
    let shared = Shared::new(Payload::new(&drops));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let local = Shared::clone(&shared);
            thread::spawn(move || {
                for _ in 0..10_000 {
                    let copy = Shared::clone(&local);
                    assert_eq!(copy.magic, MAGIC);
                    drop(copy);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(Shared::use_count(&shared), 1);
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    drop(shared);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_last_drop_on_any_thread_destroys_once() {
    for _ in 0..1_000 {
        let drops = Arc::new(AtomicUsize::new(0));
        let shared = Shared::new(Payload::new(&drops));
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let local = Shared::clone(&shared);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    drop(local);
                })
            })
            .collect();

        drop(shared);
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}

// ============================================================================
// Weak upgrade racing the final strong drop
// ============================================================================

#[test]
fn test_lock_races_final_drop() {
    for _ in 0..10_000 {
        let drops = Arc::new(AtomicUsize::new(0));
        let strong = Shared::new(Payload::new(&drops));
        let weak = Shared::downgrade(&strong);
        let barrier = Barrier::new(2);

        thread::scope(|scope| {
            scope.spawn(|| {
                barrier.wait();
                drop(strong);
            });
            scope.spawn(|| {
                barrier.wait();
                let locked = weak.lock();
                if let Some(payload) = Shared::get(&locked) {
                    // A successful lock must see a live payload.
                    assert_eq!(payload.magic, MAGIC);
                    assert_eq!(drops.load(Ordering::SeqCst), 0);
                }
            });
        });

        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(weak.expired());
        assert!(Shared::is_empty(&weak.lock()));
    }
}

#[test]
fn test_many_observers_race_final_drop() {
    for _ in 0..500 {
        let drops = Arc::new(AtomicUsize::new(0));
        let strong = Shared::new(Payload::new(&drops));
        let weaks: Vec<Weak<Payload>> = (0..4).map(|_| Shared::downgrade(&strong)).collect();
        let start = Barrier::new(5);

        thread::scope(|scope| {
            for weak in &weaks {
                let start = &start;
                scope.spawn(move || {
                    start.wait();
                    for _ in 0..50 {
                        match weak.upgrade() {
                            Some(locked) => assert_eq!(locked.magic, MAGIC),
                            None => break,
                        }
                    }
                });
            }
            start.wait();
            drop(strong);
        });

        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(weaks.iter().all(Weak::expired));
    }
}

#[test]
fn test_weak_clone_and_drop_across_threads() {
    let strong = Shared::new(7_u32);
    let weak = Shared::downgrade(&strong);

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..5_000 {
                    let copy = weak.clone();
                    assert!(!copy.expired());
                }
            });
        }
    });

    assert_eq!(Shared::weak_count(&strong), 1);
    assert_eq!(*weak.lock(), 7);
}
