//! The environment of a live JVM: the instance, its reference table and its
//! thread bookkeeping.

use std::sync::Arc;

use jbridge_shared::errors::{BridgeError, BridgeResult};

use super::backend::NativeVm;
use crate::refs::{DumpMode, HandleTable, RefId, RefReport};
use crate::thread::{ExecutionLock, ScopedLock, ThreadStateBridge};

/// The process-wide handle to the JVM environment.
pub type RuntimeHandle<V> = Arc<VmEnv<V>>;

/// A live JVM together with the state the bridge keeps about it.
pub struct VmEnv<V: NativeVm> {
    vm: V,
    refs: HandleTable<V::Global>,
    threads: ThreadStateBridge<V::Env>,
}

impl<V: NativeVm> VmEnv<V> {
    pub fn new(vm: V) -> Self {
        Self {
            vm,
            refs: HandleTable::new(),
            threads: ThreadStateBridge::new(),
        }
    }

    pub fn vm(&self) -> &V {
        &self.vm
    }

    pub fn refs(&self) -> &HandleTable<V::Global> {
        &self.refs
    }

    pub fn threads(&self) -> &ThreadStateBridge<V::Env> {
        &self.threads
    }

    pub fn attach_current_thread(&self, name: Option<&str>, as_daemon: bool) -> i32 {
        self.threads.attach(&self.vm, name, as_daemon)
    }

    pub fn detach_current_thread(&self) -> i32 {
        self.threads.detach(&self.vm)
    }

    pub fn is_current_thread_attached(&self) -> bool {
        self.threads.is_attached()
    }

    /// Acquire this environment's execution lock.
    pub fn lock(&self) -> ScopedLock<'_> {
        self.threads.lock()
    }

    pub fn execution_lock(&self) -> &ExecutionLock {
        self.threads.execution_lock()
    }

    /// Track a JVM object crossing into the managed side.
    pub fn intern(&self, held: &ScopedLock<'_>, obj: &V::Local) -> BridgeResult<RefId> {
        self.check_held(held)?;
        self.refs.intern(&self.vm, held, obj)
    }

    /// Drop one managed-side observer of `id`.
    pub fn release(&self, held: &ScopedLock<'_>, id: RefId) -> BridgeResult<usize> {
        self.check_held(held)?;
        self.refs.release(&self.vm, held, id)
    }

    /// Append `paths` to the running JVM's classpath. Empty input is ignored.
    pub fn add_classpath(&self, paths: &str) -> BridgeResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        self.vm.append_classpath(paths)?;
        tracing::info!(paths, "Appended to JVM classpath");
        Ok(())
    }

    pub fn classpath(&self) -> BridgeResult<Option<String>> {
        self.vm.classpath()
    }

    pub fn jni_version(&self) -> BridgeResult<i32> {
        self.vm.jni_version()
    }

    pub fn java_version(&self) -> BridgeResult<String> {
        self.vm.java_version()
    }

    fn check_held(&self, held: &ScopedLock<'_>) -> BridgeResult<()> {
        if held.guards(self.execution_lock()) {
            Ok(())
        } else {
            Err(BridgeError::Thread(
                "guard belongs to a different execution lock".into(),
            ))
        }
    }
}

impl<V> VmEnv<V>
where
    V: NativeVm,
    V::Global: Clone,
{
    pub fn dump_refs(&self, held: &ScopedLock<'_>, mode: DumpMode) -> BridgeResult<RefReport> {
        self.check_held(held)?;
        self.refs.dump(&self.vm, held, mode)
    }
}

impl<V: NativeVm> std::fmt::Debug for VmEnv<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmEnv")
            .field("attached_threads", &self.threads.attached_threads())
            .finish_non_exhaustive()
    }
}
