//! `jbridge` Python extension: start a JVM inside the interpreter and work
//! with its objects.

mod env;
mod errors;
mod vm_options;

use std::ffi::c_void;

use jbridge::embed::InitOnce;
use jbridge::thread::{LockExport, LockedCallback};
use jbridge::vm::{JniBackend, JniVm};
use jbridge::{RuntimeLifecycle, VmOptions};
use jbridge_shared::constants::status;
use once_cell::sync::Lazy;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::env::{PyJObject, PyVmEnv, lock_env};
use crate::errors::map_err;
use crate::vm_options::PyVmOptions;

pyo3::create_exception!(
    jbridge,
    JavaError,
    pyo3::exceptions::PyException,
    "A Java exception raised across the bridge."
);

static LIFECYCLE: Lazy<RuntimeLifecycle<JniBackend>> = Lazy::new(|| RuntimeLifecycle::new(JniBackend));
static MODULE_INIT: InitOnce = InitOnce::new();
static EXECUTION_LOCK: LockExport = LockExport {
    with_lock: with_execution_lock,
};

/// Runs a native library's callback under this module's execution lock, so a
/// JVM hosting the interpreter serializes with the module's handle table.
unsafe extern "C" fn with_execution_lock(callback: LockedCallback, data: *mut c_void) -> i32 {
    let Some(handle) = LIFECYCLE.attached_handle() else {
        return status::JNI_EDETACHED;
    };
    Python::attach(|py| {
        let _held = lock_env(py, &handle);
        // SAFETY: `callback` and `data` come from `LockExport::run`, which
        // keeps `data` alive until this returns.
        unsafe { callback(data) };
    });
    status::JNI_OK
}

/// Classpath shipped with the package, if the package sets one.
fn module_classpath(py: Python<'_>) -> Option<String> {
    py.import("jbridge")
        .and_then(|m| m.getattr("CLASSPATH"))
        .and_then(|cp| cp.extract::<String>())
        .ok()
        .filter(|cp| !cp.is_empty())
}

/// Start the JVM, or return the running one.
///
/// Heap and stack sizes and `vmargs` only apply when the JVM is created;
/// passing them once it runs raises `ValueError`. A classpath passed to a
/// running JVM is appended to it; without one the module `CLASSPATH` is.
#[pyfunction]
#[pyo3(
    name = "initVM",
    signature = (classpath=None, initialheap=None, maxheap=None, maxstack=None, vmargs=None, options=None)
)]
fn init_vm(
    py: Python<'_>,
    classpath: Option<String>,
    initialheap: Option<String>,
    maxheap: Option<String>,
    maxstack: Option<String>,
    vmargs: Option<String>,
    options: Option<PyVmOptions>,
) -> PyResult<PyVmEnv> {
    let explicit = PyVmOptions {
        classpath,
        initialheap,
        maxheap,
        maxstack,
        vmargs,
    };
    let mut opts: VmOptions = options.unwrap_or_default().overridden_by(explicit).into();
    opts.base_classpath = module_classpath(py);

    let handle = py
        .detach(|| LIFECYCLE.create_or_attach(&opts))
        .map_err(map_err)?;
    Ok(PyVmEnv::new(handle))
}

/// The running JVM, or `None`. Never starts one.
#[pyfunction]
#[pyo3(name = "getVMEnv")]
fn get_vm_env() -> Option<PyVmEnv> {
    LIFECYCLE.attached_handle().map(PyVmEnv::new)
}

/// Publish a JVM that already runs in this process, given the address of
/// its `JavaVM`. Used when a JVM embeds this interpreter.
#[pyfunction]
#[pyo3(name = "_adoptVM")]
fn adopt_vm(address: usize) -> PyResult<PyVmEnv> {
    if let Some(handle) = LIFECYCLE.attached_handle() {
        return Ok(PyVmEnv::new(handle));
    }
    if address == 0 {
        return Err(PyValueError::new_err("JavaVM address is null"));
    }
    // SAFETY: the caller passes the address of the `JavaVM` that loaded it,
    // which stays valid for the life of the process.
    let vm = unsafe { jni::JavaVM::from_raw(address as *mut jni::sys::JavaVM) }
        .map_err(|e| PyValueError::new_err(e.to_string()))?;
    LIFECYCLE.adopt(JniVm::new(vm)).map(PyVmEnv::new).map_err(map_err)
}

/// Address of this module's execution-lock entry points, for a native
/// library in the same process to borrow.
#[pyfunction]
#[pyo3(name = "_executionLock")]
fn execution_lock() -> usize {
    EXECUTION_LOCK.address()
}

/// One-time module bring-up. Returns `True` only on the call that ran it.
#[pyfunction]
#[pyo3(name = "_init_once")]
fn init_once() -> PyResult<bool> {
    MODULE_INIT
        .run(|| {
            jbridge::util::init_logging();
            tracing::debug!(version = env!("CARGO_PKG_VERSION"), "jbridge module initialized");
            Ok(())
        })
        .map_err(map_err)
}

#[pymodule(name = "jbridge")]
fn jbridge_python(m: &Bound<'_, PyModule>) -> PyResult<()> {
    jbridge::util::init_logging();

    m.add_function(wrap_pyfunction!(init_vm, m)?)?;
    m.add_function(wrap_pyfunction!(get_vm_env, m)?)?;
    m.add_function(wrap_pyfunction!(init_once, m)?)?;
    m.add_function(wrap_pyfunction!(adopt_vm, m)?)?;
    m.add_function(wrap_pyfunction!(execution_lock, m)?)?;

    m.add_class::<PyVmEnv>()?;
    m.add_class::<PyJObject>()?;
    m.add_class::<PyVmOptions>()?;
    m.add("JavaError", m.py().get_type::<JavaError>())?;

    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}
