//! Reference and thread-state coordination between a JVM and a Python
//! interpreter sharing one process.
//!
//! The core is written against the traits in [`runtime::backend`]; the JNI
//! implementation lives in [`vm`] behind the `jni-backend` feature, and the
//! Python side lives in the SDK crates.

pub mod embed;
pub mod exception;
pub mod refs;
pub mod runtime;
pub mod thread;
pub mod util;
#[cfg(feature = "jni-backend")]
pub mod vm;

pub use exception::{CapturedError, ErrorSink, ErrorSource, ExceptionBridge, ExceptionState};
pub use jbridge_shared::errors::{BridgeError, BridgeResult, EmbedFailure};
pub use refs::{DumpMode, HandleTable, RefId, RefReport};
pub use runtime::{RuntimeHandle, RuntimeLifecycle, VmEnv, VmOptions};
pub use thread::{ExecutionLock, ScopedLock, ThreadStateBridge, ThreadStateCounters};
