//! Scoped acquisition of the execution lock.

use std::marker::PhantomData;

use super::lock::ExecutionLock;

/// Proof that the calling thread holds the execution lock.
///
/// Created by [`ExecutionLock::acquire`] and friends. Dropping it releases
/// one level of nesting, on every exit path including unwinding. The guard is
/// `!Send`: it must be dropped on the thread that acquired it.
///
/// Operations that require the lock (every [`HandleTable`](crate::refs::HandleTable)
/// method) take a `&ScopedLock` argument instead of re-checking ownership.
#[must_use = "the execution lock is released as soon as the guard is dropped"]
pub struct ScopedLock<'a> {
    lock: &'a ExecutionLock,
    _not_send: PhantomData<*const ()>,
}

impl<'a> ScopedLock<'a> {
    pub(super) fn new(lock: &'a ExecutionLock) -> Self {
        Self {
            lock,
            _not_send: PhantomData,
        }
    }

    /// Current nesting depth on this thread, including this guard.
    pub fn depth(&self) -> usize {
        self.lock.depth()
    }

    /// True if this guard was issued by `lock`.
    pub fn guards(&self, lock: &ExecutionLock) -> bool {
        std::ptr::eq(self.lock, lock)
    }
}

impl Drop for ScopedLock<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

impl std::fmt::Debug for ScopedLock<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedLock")
            .field("depth", &self.depth())
            .finish()
    }
}
