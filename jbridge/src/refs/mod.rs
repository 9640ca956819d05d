//! Counted table of JVM objects referenced from the Python side.
//!
//! Every Java object that crosses into Python is interned here exactly once:
//! the first crossing promotes the call-scoped handle to a global handle, and
//! later crossings of the same object only bump a counter. When the last
//! Python value observing the object goes away the counter reaches zero, the
//! entry is removed and the global handle is returned to the JVM.
//!
//! Entries are keyed by the object's identity hash. Distinct objects may share
//! a hash, so a key holds a small bucket and lookups compare objects with
//! [`ObjectHost::is_same_object`].
//!
//! Callers never see raw handles; they hold a [`RefId`]. All operations take a
//! [`ScopedLock`] as proof that the execution lock is held.

mod report;

pub use report::{DumpMode, RefReport};

use std::collections::BTreeMap;

use jbridge_shared::errors::{BridgeError, BridgeResult};
use parking_lot::Mutex;

use crate::runtime::backend::ObjectHost;
use crate::thread::ScopedLock;

/// Opaque key of a table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefId {
    hash: i32,
    slot: u64,
}

impl RefId {
    /// Identity hash of the referenced object.
    pub fn identity_hash(&self) -> i32 {
        self.hash
    }
}

struct CountedRef<G> {
    slot: u64,
    global: G,
    count: usize,
}

struct Inner<G> {
    buckets: BTreeMap<i32, Vec<CountedRef<G>>>,
    next_slot: u64,
}

/// Multimap from identity hash to counted global references.
pub struct HandleTable<G> {
    inner: Mutex<Inner<G>>,
}

impl<G> Default for HandleTable<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G> HandleTable<G> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                buckets: BTreeMap::new(),
                next_slot: 1,
            }),
        }
    }

    /// Track `obj`, returning its entry id.
    ///
    /// An object already in the table gets its count bumped. A new object is
    /// promoted to a global handle and inserted with a count of one. If any
    /// runtime call fails nothing is inserted or counted.
    pub fn intern<H>(&self, host: &H, _held: &ScopedLock<'_>, obj: &H::Local) -> BridgeResult<RefId>
    where
        H: ObjectHost<Global = G>,
    {
        let hash = host.identity_hash(obj)?;
        let mut inner = self.inner.lock();

        if let Some(bucket) = inner.buckets.get_mut(&hash) {
            for entry in bucket.iter_mut() {
                if host.is_same_object(obj, &entry.global)? {
                    entry.count += 1;
                    return Ok(RefId {
                        hash,
                        slot: entry.slot,
                    });
                }
            }
        }

        let global = host.promote(obj)?;
        let slot = inner.next_slot;
        inner.next_slot += 1;
        inner.buckets.entry(hash).or_default().push(CountedRef {
            slot,
            global,
            count: 1,
        });

        tracing::trace!(hash, slot, "Promoted object to global reference");
        Ok(RefId { hash, slot })
    }

    /// Drop one count from `id`, returning the remaining count.
    ///
    /// At zero the entry is removed and its global handle released exactly
    /// once. Releasing an id that is not in the table is an error.
    pub fn release<H>(&self, host: &H, _held: &ScopedLock<'_>, id: RefId) -> BridgeResult<usize>
    where
        H: ObjectHost<Global = G>,
    {
        let freed = {
            let mut inner = self.inner.lock();
            let bucket = inner
                .buckets
                .get_mut(&id.hash)
                .ok_or_else(|| unknown_ref(id))?;
            let pos = bucket
                .iter()
                .position(|entry| entry.slot == id.slot)
                .ok_or_else(|| unknown_ref(id))?;

            bucket[pos].count -= 1;
            if bucket[pos].count > 0 {
                return Ok(bucket[pos].count);
            }

            let entry = bucket.swap_remove(pos);
            if bucket.is_empty() {
                inner.buckets.remove(&id.hash);
            }
            entry.global
        };

        host.release_global(freed);
        tracing::trace!(hash = id.hash, slot = id.slot, "Released global reference");
        Ok(0)
    }

    /// Current count of `id`, or `None` if it is not tracked.
    pub fn count(&self, _held: &ScopedLock<'_>, id: RefId) -> Option<usize> {
        self.inner
            .lock()
            .buckets
            .get(&id.hash)
            .and_then(|bucket| bucket.iter().find(|entry| entry.slot == id.slot))
            .map(|entry| entry.count)
    }

    /// Number of distinct objects tracked.
    pub fn len(&self, _held: &ScopedLock<'_>) -> usize {
        self.inner.lock().buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self, held: &ScopedLock<'_>) -> bool {
        self.len(held) == 0
    }

    /// Run `f` on the global handle behind `id`.
    ///
    /// `f` runs with the table's internal mutex held and must not call back
    /// into the table.
    pub fn with_global<R>(&self, _held: &ScopedLock<'_>, id: RefId, f: impl FnOnce(&G) -> R) -> Option<R> {
        self.inner
            .lock()
            .buckets
            .get(&id.hash)
            .and_then(|bucket| bucket.iter().find(|entry| entry.slot == id.slot))
            .map(|entry| f(&entry.global))
    }
}

impl<G: Clone> HandleTable<G> {
    /// A clone of the global handle behind `id`.
    ///
    /// The clone is for use within the current call; the table entry keeps
    /// owning the reference.
    pub fn global(&self, _held: &ScopedLock<'_>, id: RefId) -> Option<G> {
        self.inner
            .lock()
            .buckets
            .get(&id.hash)
            .and_then(|bucket| bucket.iter().find(|entry| entry.slot == id.slot))
            .map(|entry| entry.global.clone())
    }

    /// Diagnostic report over all live entries. Does not modify the table.
    ///
    /// Kind names and string values come from the runtime, which may run
    /// arbitrary code; the table is snapshotted first so that code can
    /// re-enter the table on this thread.
    pub fn dump<H>(&self, host: &H, _held: &ScopedLock<'_>, mode: DumpMode) -> BridgeResult<RefReport>
    where
        H: ObjectHost<Global = G>,
    {
        let snapshot: Vec<(i32, usize, G)> = {
            let inner = self.inner.lock();
            inner
                .buckets
                .iter()
                .flat_map(|(hash, bucket)| {
                    bucket
                        .iter()
                        .map(move |entry| (*hash, entry.count, entry.global.clone()))
                })
                .collect()
        };

        let report = match mode {
            DumpMode::ByKind => {
                let mut kinds = BTreeMap::new();
                for (_, _, global) in &snapshot {
                    *kinds.entry(host.kind_name(global)?).or_insert(0) += 1;
                }
                RefReport::ByKind(kinds)
            }
            DumpMode::Values => RefReport::Values(
                snapshot
                    .iter()
                    .map(|(_, count, global)| -> BridgeResult<(String, usize)> {
                        Ok((host.describe(global)?, *count))
                    })
                    .collect::<BridgeResult<_>>()?,
            ),
            DumpMode::Hashes => RefReport::Hashes(
                snapshot
                    .iter()
                    .map(|(hash, count, _)| (*hash, *count))
                    .collect(),
            ),
        };

        Ok(report)
    }
}

fn unknown_ref(id: RefId) -> BridgeError {
    BridgeError::Handle(format!(
        "reference {:08x}/{} is not in the table",
        id.hash, id.slot
    ))
}
