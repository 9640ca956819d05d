//! Native runtime abstraction: the seam between the bridge core and the JVM.
//!
//! The core never calls JNI directly. Everything it needs from the JVM goes
//! through these traits, implemented for real by
//! [`JniVm`](crate::vm::JniVm) and by in-memory fakes in tests.

use jbridge_shared::errors::BridgeResult;

use super::option_list::OptionList;

/// Registration of OS threads with the native runtime.
pub trait VmThreads: Send + Sync {
    /// Per-thread execution handle handed out by the runtime (a `JNIEnv*`).
    ///
    /// Stored in the calling thread's context and only used on that thread.
    type Env: Send;

    /// Attach the calling thread, returning its execution handle or the
    /// runtime's negative status code.
    fn attach_current_thread(&self, name: Option<&str>, as_daemon: bool) -> Result<Self::Env, i32>;

    /// Detach the calling thread, returning the runtime's status code.
    fn detach_current_thread(&self) -> i32;

    /// Execution handle of the calling thread if the runtime already
    /// considers it attached (the thread that created the runtime is).
    fn current_thread_env(&self) -> Option<Self::Env>;
}

/// Object operations the handle table needs.
pub trait ObjectHost: Send + Sync {
    /// A raw, call-scoped handle as received from the runtime.
    type Local;

    /// A promoted handle valid until explicitly released.
    type Global: Send + Sync;

    /// Identity hash of the object; stable for the object's lifetime.
    fn identity_hash(&self, obj: &Self::Local) -> BridgeResult<i32>;

    /// Promote a raw handle to a global one.
    fn promote(&self, obj: &Self::Local) -> BridgeResult<Self::Global>;

    /// Whether `obj` and `global` refer to the same object.
    fn is_same_object(&self, obj: &Self::Local, global: &Self::Global) -> BridgeResult<bool>;

    /// Hand a global handle back to the runtime.
    fn release_global(&self, global: Self::Global);

    /// Registered type name of the object (its class name).
    fn kind_name(&self, global: &Self::Global) -> BridgeResult<String>;

    /// String conversion of the object.
    fn describe(&self, global: &Self::Global) -> BridgeResult<String>;
}

/// A live native runtime instance.
pub trait NativeVm: VmThreads + ObjectHost + 'static {
    /// Append a path list to the effective classpath of the running instance.
    fn append_classpath(&self, paths: &str) -> BridgeResult<()>;

    /// Effective classpath, if the runtime reports one.
    fn classpath(&self) -> BridgeResult<Option<String>>;

    /// JNI interface version of the runtime.
    fn jni_version(&self) -> BridgeResult<i32>;

    /// `java.version` of the runtime.
    fn java_version(&self) -> BridgeResult<String>;
}

/// Creates native runtime instances.
///
/// The lifecycle owns exactly one backend; `create` is called at most once
/// per successful creation and never while an instance exists.
pub trait VmBackend: Send + Sync {
    type Vm: NativeVm;

    /// Create a runtime from a fully built option list.
    ///
    /// The option list is borrowed: its buffers are freed by the caller as
    /// soon as this returns, whatever the outcome.
    fn create(&self, options: &OptionList) -> BridgeResult<Self::Vm>;
}
