//! Thread-state coordination between OS threads and the two runtimes.
//!
//! - [`ThreadStateBridge`]: per-thread attachment to the JVM plus the shared
//!   [`ExecutionLock`].
//! - [`ScopedLock`]: the only way to hold the execution lock.
//! - [`ThreadStateCounters`]: per-thread pin counters on the Python side,
//!   driven by the JVM through `PythonVM.acquireThreadState`.
//! - [`LockExport`]: one library's execution lock, borrowed by another.

mod counters;
mod guard;
mod lock;
mod shared;

pub use counters::{ManagedThreadState, ThreadStateCounters};
pub use guard::ScopedLock;
pub use lock::ExecutionLock;
pub use shared::{LockExport, LockedCallback};

use std::collections::HashMap;
use std::thread::{self, ThreadId};

use jbridge_shared::constants::status;
use parking_lot::Mutex;

use crate::runtime::backend::VmThreads;

/// Execution state of one OS thread with respect to the JVM.
#[derive(Debug)]
pub struct ThreadExecutionContext<E> {
    env: Option<E>,
    name: Option<String>,
    daemon: bool,
}

impl<E> ThreadExecutionContext<E> {
    pub fn is_attached(&self) -> bool {
        self.env.is_some()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_daemon(&self) -> bool {
        self.daemon
    }
}

/// Attaches OS threads to the JVM and owns the execution lock.
///
/// Contexts are kept in an explicit map keyed by [`ThreadId`]; at most one
/// context exists per thread. A thread that attaches and never detaches keeps
/// its entry until the process exits.
pub struct ThreadStateBridge<E> {
    contexts: Mutex<HashMap<ThreadId, ThreadExecutionContext<E>>>,
    lock: ExecutionLock,
}

impl<E: Send> Default for ThreadStateBridge<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Send> ThreadStateBridge<E> {
    pub fn new() -> Self {
        Self {
            contexts: Mutex::new(HashMap::new()),
            lock: ExecutionLock::new(),
        }
    }

    /// Attach the calling thread to `vm`.
    ///
    /// Returns the runtime's status code. On success the thread's context
    /// holds the new execution handle; on failure any previous context for
    /// the thread is left as it was.
    pub fn attach<T>(&self, vm: &T, name: Option<&str>, as_daemon: bool) -> i32
    where
        T: VmThreads<Env = E>,
    {
        match vm.attach_current_thread(name, as_daemon) {
            Ok(env) => {
                self.contexts.lock().insert(
                    thread::current().id(),
                    ThreadExecutionContext {
                        env: Some(env),
                        name: name.map(str::to_owned),
                        daemon: as_daemon,
                    },
                );
                tracing::debug!(thread = ?name, daemon = as_daemon, "Attached thread to JVM");
                status::JNI_OK
            }
            Err(code) => {
                tracing::warn!(thread = ?name, daemon = as_daemon, code, "Failed to attach thread to JVM");
                code
            }
        }
    }

    /// Detach the calling thread from `vm`.
    ///
    /// The context is dropped whatever the runtime answers. A thread that
    /// was never attached gets [`status::JNI_EDETACHED`] and the runtime is
    /// not called.
    pub fn detach<T>(&self, vm: &T) -> i32
    where
        T: VmThreads<Env = E>,
    {
        let context = self.contexts.lock().remove(&thread::current().id());

        match context {
            Some(ctx) if ctx.is_attached() => {
                let code = vm.detach_current_thread();
                tracing::debug!(thread = ?ctx.name, code, "Detached thread from JVM");
                code
            }
            _ => status::JNI_EDETACHED,
        }
    }

    /// Record the calling thread as attached if the runtime already has it
    /// attached. Returns whether a context was recorded.
    pub fn register_current<T>(&self, vm: &T) -> bool
    where
        T: VmThreads<Env = E>,
    {
        let Some(env) = vm.current_thread_env() else {
            return false;
        };
        self.contexts
            .lock()
            .entry(thread::current().id())
            .or_insert(ThreadExecutionContext {
                env: Some(env),
                name: None,
                daemon: false,
            });
        true
    }

    /// True iff the calling thread holds a non-null execution handle.
    pub fn is_attached(&self) -> bool {
        self.contexts
            .lock()
            .get(&thread::current().id())
            .is_some_and(ThreadExecutionContext::is_attached)
    }

    /// Number of threads currently attached through this bridge.
    pub fn attached_threads(&self) -> usize {
        self.contexts
            .lock()
            .values()
            .filter(|ctx| ctx.is_attached())
            .count()
    }

    /// Run `f` with the calling thread's context, if it has one.
    pub fn with_context<R>(&self, f: impl FnOnce(&ThreadExecutionContext<E>) -> R) -> Option<R> {
        self.contexts.lock().get(&thread::current().id()).map(f)
    }

    /// Acquire the execution lock (re-entrant, blocking).
    pub fn lock(&self) -> ScopedLock<'_> {
        self.lock.acquire()
    }

    pub fn execution_lock(&self) -> &ExecutionLock {
        &self.lock
    }
}
