//! Per-thread pin counters for the Python thread state.
//!
//! A JVM thread that calls into Python repeatedly would otherwise create and
//! destroy a Python thread state on every call. `PythonVM.acquireThreadState`
//! pins the state for the calling thread and `releaseThreadState` unpins it.
//! The counter starts at 1 (the state exists) and each pin adds one.

use std::collections::HashMap;
use std::thread::{self, ThreadId};

use jbridge_shared::constants::NO_THREAD_STATE;
use parking_lot::Mutex;

const BASE_COUNT: i32 = 1;

/// The managed runtime's view of per-thread execution state.
pub trait ManagedThreadState: Send + Sync {
    /// Whether the runtime can have execution state for the calling thread.
    fn has_thread_state(&self) -> bool;

    /// Keep the calling thread's state alive past the current call.
    fn pin(&self);

    /// Undo one [`pin`](Self::pin).
    fn unpin(&self);
}

/// Explicit per-thread pin counters keyed by [`ThreadId`].
#[derive(Debug, Default)]
pub struct ThreadStateCounters {
    counts: Mutex<HashMap<ThreadId, i32>>,
}

impl ThreadStateCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the calling thread's state and return the new counter value,
    /// or [`NO_THREAD_STATE`] if the runtime has no state for it.
    pub fn acquire<R: ManagedThreadState + ?Sized>(&self, runtime: &R) -> i32 {
        if !runtime.has_thread_state() {
            return NO_THREAD_STATE;
        }

        runtime.pin();
        let mut counts = self.counts.lock();
        let count = counts.entry(thread::current().id()).or_insert(BASE_COUNT);
        *count += 1;
        *count
    }

    /// Unpin the calling thread's state and return the new counter value.
    ///
    /// Returns [`NO_THREAD_STATE`] when the runtime has no state for the
    /// thread or when nothing is pinned; the base state is never released
    /// from here.
    pub fn release<R: ManagedThreadState + ?Sized>(&self, runtime: &R) -> i32 {
        if !runtime.has_thread_state() {
            return NO_THREAD_STATE;
        }

        let id = thread::current().id();
        let remaining = {
            let mut counts = self.counts.lock();
            match counts.get_mut(&id) {
                Some(count) if *count > BASE_COUNT => {
                    *count -= 1;
                    let value = *count;
                    if value == BASE_COUNT {
                        counts.remove(&id);
                    }
                    value
                }
                _ => return NO_THREAD_STATE,
            }
        };

        runtime.unpin();
        remaining
    }

    /// Current counter for the calling thread, if it has pins.
    pub fn current(&self) -> Option<i32> {
        self.counts.lock().get(&thread::current().id()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

    struct FakeInterpreter {
        initialized: AtomicBool,
        pins: AtomicI32,
    }

    impl FakeInterpreter {
        fn new(initialized: bool) -> Self {
            Self {
                initialized: AtomicBool::new(initialized),
                pins: AtomicI32::new(0),
            }
        }
    }

    impl ManagedThreadState for FakeInterpreter {
        fn has_thread_state(&self) -> bool {
            self.initialized.load(Ordering::SeqCst)
        }

        fn pin(&self) {
            self.pins.fetch_add(1, Ordering::SeqCst);
        }

        fn unpin(&self) {
            self.pins.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_acquire_without_state_returns_minus_one() {
        let rt = FakeInterpreter::new(false);
        let counters = ThreadStateCounters::new();

        assert_eq!(counters.acquire(&rt), NO_THREAD_STATE);
        assert_eq!(rt.pins.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_acquire_release_round_trip() {
        let rt = FakeInterpreter::new(true);
        let counters = ThreadStateCounters::new();

        assert_eq!(counters.acquire(&rt), 2);
        assert_eq!(counters.acquire(&rt), 3);
        assert_eq!(rt.pins.load(Ordering::SeqCst), 2);

        assert_eq!(counters.release(&rt), 2);
        assert_eq!(counters.release(&rt), 1);
        assert_eq!(rt.pins.load(Ordering::SeqCst), 0);
        assert_eq!(counters.current(), None);
    }

    #[test]
    fn test_release_without_pin_never_unpins() {
        let rt = FakeInterpreter::new(true);
        let counters = ThreadStateCounters::new();

        assert_eq!(counters.release(&rt), NO_THREAD_STATE);
        assert_eq!(rt.pins.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_counters_are_per_thread() {
        let rt = std::sync::Arc::new(FakeInterpreter::new(true));
        let counters = std::sync::Arc::new(ThreadStateCounters::new());

        counters.acquire(rt.as_ref());

        let (rt2, counters2) = (rt.clone(), counters.clone());
        let other = std::thread::spawn(move || counters2.acquire(rt2.as_ref()))
            .join()
            .expect("thread panicked");

        assert_eq!(other, 2);
        assert_eq!(counters.current(), Some(2));
    }
}
