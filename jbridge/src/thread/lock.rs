//! Re-entrant execution lock.
//!
//! One OS thread at a time may run code that touches the handle table or
//! crosses from the JVM into Python. The owning thread may re-acquire the
//! lock any number of times (a Java call that re-enters Python that calls
//! back into Java); each nested acquisition bumps a depth counter and the
//! lock is only handed to another thread once the depth returns to zero.

use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

use super::guard::ScopedLock;

#[derive(Debug, Default)]
struct LockState {
    owner: Option<ThreadId>,
    depth: usize,
}

/// The shared execution lock.
///
/// Only ever handed out as a [`ScopedLock`]; there is no public release.
#[derive(Debug, Default)]
pub struct ExecutionLock {
    state: Mutex<LockState>,
    freed: Condvar,
}

impl ExecutionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock, blocking until it is free or already ours.
    pub fn acquire(&self) -> ScopedLock<'_> {
        let me = thread::current().id();
        let mut state = self.state.lock();

        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    break;
                }
                Some(owner) if owner == me => {
                    state.depth += 1;
                    break;
                }
                Some(_) => self.freed.wait(&mut state),
            }
        }

        ScopedLock::new(self)
    }

    /// Acquire the lock if it is free or already held by this thread.
    pub fn try_acquire(&self) -> Option<ScopedLock<'_>> {
        let me = thread::current().id();
        let mut state = self.state.lock();

        match state.owner {
            None => {
                state.owner = Some(me);
                state.depth = 1;
            }
            Some(owner) if owner == me => state.depth += 1,
            Some(_) => return None,
        }

        Some(ScopedLock::new(self))
    }

    /// Acquire the lock, calling `wait` each time another thread holds it.
    ///
    /// A caller that holds some other lock (the Python GIL) passes a `wait`
    /// that drops that lock around [`wait_until_free`](Self::wait_until_free),
    /// so the two locks are never waited on in opposite orders.
    pub fn acquire_or_wait<W>(&self, mut wait: W) -> ScopedLock<'_>
    where
        W: FnMut(&ExecutionLock),
    {
        loop {
            if let Some(guard) = self.try_acquire() {
                return guard;
            }
            wait(self);
        }
    }

    /// Block until no thread holds the lock. Does not acquire it.
    pub fn wait_until_free(&self) {
        let mut state = self.state.lock();
        while state.owner.is_some() {
            self.freed.wait(&mut state);
        }
    }

    /// Nesting depth held by the calling thread (0 if it does not own the lock).
    pub fn depth(&self) -> usize {
        let state = self.state.lock();
        if state.owner == Some(thread::current().id()) {
            state.depth
        } else {
            0
        }
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.depth() > 0
    }

    /// True when some thread, possibly the caller, holds the lock.
    pub fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    /// Called exactly once per [`ScopedLock`], from its `Drop`.
    pub(super) fn release(&self) {
        let mut state = self.state.lock();
        debug_assert_eq!(state.owner, Some(thread::current().id()));

        state.depth = state.depth.saturating_sub(1);
        if state.depth == 0 {
            state.owner = None;
            drop(state);
            self.freed.notify_all();
        }
    }
}
