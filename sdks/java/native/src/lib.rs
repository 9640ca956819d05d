//! JNI library that hosts CPython inside a running JVM.
//!
//! Backs `org.jbridge.PythonVM` (interpreter bring-up, instantiating Python
//! classes that proxy Java objects, thread-state pinning) and the natives of
//! `org.jbridge.PythonException`.

mod exception;
mod python;

use std::ffi::c_void;
use std::ptr;

use jbridge::embed::{self, InitOnce};
use jbridge::exception::CaptureSlots;
use jbridge::thread::{ExecutionLock, LockExport};
use jbridge::vm::{JniResultExt, java_string};
use jbridge::{BridgeError, BridgeResult, ThreadStateCounters};
use jbridge_shared::constants::java_classes::PYTHON_EXCEPTION;
use jbridge_shared::constants::status;
use jni::objects::{JObject, JObjectArray, JString};
use jni::sys::{JNI_VERSION_1_8, jint, jobject};
use jni::{JNIEnv, JavaVM, NativeMethod};
use once_cell::sync::{Lazy, OnceCell};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::exception::{FieldSink, throw_bridge_error};
use crate::python::{Interpreter, PyErrSource, PyResolver, py_err};

/// The JVM that loaded this library.
static HOST_VM: OnceCell<JavaVM> = OnceCell::new();
/// The `jbridge` Python module's execution lock, once the JVM is shared with it.
static SHARED_LOCK: OnceCell<&'static LockExport> = OnceCell::new();
/// Used only while no `jbridge` module shares the JVM, when there is no
/// handle table to guard.
static LOCAL_LOCK: Lazy<ExecutionLock> = Lazy::new(ExecutionLock::new);
static PYTHON_INIT: InitOnce = InitOnce::new();
static THREAD_STATES: Lazy<ThreadStateCounters> = Lazy::new(ThreadStateCounters::new);
static CAPTURES: Lazy<CaptureSlots> = Lazy::new(CaptureSlots::new);

/// Run `f` with the GIL and then the execution lock held.
fn with_python<R>(f: impl FnOnce(Python<'_>) -> R) -> BridgeResult<R> {
    if !python::is_initialized() {
        return Err(BridgeError::Internal(
            "Python is not initialized, call PythonVM.init first".into(),
        ));
    }

    Python::attach(|py| match SHARED_LOCK.get() {
        Some(shared) => shared.run(|| f(py)),
        None => {
            let _held = LOCAL_LOCK.acquire_or_wait(|lock| py.detach(|| lock.wait_until_free()));
            Ok(f(py))
        }
    })
}

fn required_string(env: &mut JNIEnv<'_>, obj: JObject<'_>, what: &str) -> BridgeResult<String> {
    java_string(env, obj)?.ok_or_else(|| BridgeError::Config(format!("{what} must not be null")))
}

fn read_argv(
    env: &mut JNIEnv<'_>,
    program_name: JString<'_>,
    args: &JObjectArray<'_>,
) -> BridgeResult<Vec<String>> {
    let mut argv = vec![required_string(env, program_name.into(), "program name")?];
    if args.is_null() {
        return Ok(argv);
    }

    let len = env.get_array_length(args).bridged()?;
    for i in 0..len {
        let arg = env.get_object_array_element(args, i).bridged()?;
        argv.push(java_string(env, arg)?.unwrap_or_default());
    }
    Ok(argv)
}

/// Make the hosting JVM known to the `jbridge` Python extension, when it is
/// installed, and take over its execution lock so both sides share one.
fn share_vm(py: Python<'_>) {
    let Some(vm) = HOST_VM.get() else {
        return;
    };
    let module = match py.import("jbridge") {
        Ok(module) => module,
        Err(e) => {
            tracing::warn!(error = %e, "jbridge Python module not available, the JVM is not shared with Python");
            return;
        }
    };

    let address = vm.get_java_vm_pointer() as usize;
    let lock_address = module
        .call_method1("_adoptVM", (address,))
        .and_then(|_| module.call_method0("_executionLock"))
        .and_then(|lock| lock.extract::<usize>());
    let lock_address = match lock_address {
        Ok(lock_address) => lock_address,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to share the JVM with the jbridge Python module");
            return;
        }
    };

    // SAFETY: `_executionLock` returns the address of a static in the
    // extension module, which CPython never unloads.
    match unsafe { LockExport::from_address(lock_address) } {
        Some(export) => {
            if SHARED_LOCK.set(export).is_ok() {
                tracing::debug!("Sharing the jbridge Python module's execution lock");
            }
        }
        None => tracing::warn!("jbridge Python module returned a null execution lock"),
    }
}

fn start_python(argv: Vec<String>) -> BridgeResult<()> {
    #[cfg(target_os = "linux")]
    if let Err(e) = python::promote_libpython() {
        tracing::warn!(error = %e, "Python extension modules may fail to load");
    }

    Python::initialize();
    Python::attach(|py| -> PyResult<()> {
        py.import("sys")?.setattr("argv", argv.clone())?;
        share_vm(py);
        Ok(())
    })
    .map_err(py_err)?;

    tracing::info!(program = ?argv.first(), "Python interpreter started");
    Ok(())
}

fn instantiate<'local>(
    env: &mut JNIEnv<'local>,
    module: JString<'local>,
    class: JString<'local>,
) -> BridgeResult<JObject<'local>> {
    let module = required_string(env, module.into(), "module name")?;
    let class = required_string(env, class.into(), "class name")?;

    with_python(|py| {
        let mut resolver = PyResolver::new(py);
        let result = embed::instantiate(&mut resolver, &module, &class, |_, attr| {
            let address = attr.extract::<usize>()?;
            if address == 0 {
                return Err(PyValueError::new_err("_jobject is null"));
            }
            // SAFETY: the address is the proxy's global reference, and the
            // proxy is alive until this closure returns.
            let global = unsafe { JObject::from_raw(address as jobject) };
            env.new_local_ref(&global)
                .map_err(|e| PyRuntimeError::new_err(e.to_string()))
        });

        result.map_err(|err| {
            CAPTURES.with_current(|bridge| {
                if let Some(stale) = bridge.clear() {
                    tracing::debug!(kind = %stale.kind_name, "Dropped unreported Python error");
                }
                let mut source = PyErrSource::new(py, err.cause);
                if let Err(e) = bridge.capture(&mut source) {
                    tracing::warn!(error = %e, "Failed to capture Python error");
                }
            });
            BridgeError::CrossRuntime(err.failure)
        })
    })?
}

#[unsafe(no_mangle)]
pub extern "system" fn Java_org_jbridge_PythonVM_init<'local>(
    mut env: JNIEnv<'local>,
    _this: JObject<'local>,
    program_name: JString<'local>,
    args: JObjectArray<'local>,
) {
    let result = read_argv(&mut env, program_name, &args)
        .and_then(|argv| PYTHON_INIT.run(|| start_python(argv)));
    match result {
        Ok(true) => {}
        Ok(false) => tracing::debug!("Python interpreter already started"),
        Err(e) => throw_bridge_error(&mut env, &e),
    }
}

#[unsafe(no_mangle)]
pub extern "system" fn Java_org_jbridge_PythonVM_instantiate<'local>(
    mut env: JNIEnv<'local>,
    _this: JObject<'local>,
    module_name: JString<'local>,
    class_name: JString<'local>,
) -> jobject {
    match instantiate(&mut env, module_name, class_name) {
        Ok(obj) => obj.into_raw(),
        Err(e) => {
            throw_bridge_error(&mut env, &e);
            ptr::null_mut()
        }
    }
}

#[unsafe(no_mangle)]
pub extern "system" fn Java_org_jbridge_PythonVM_acquireThreadState(
    _env: JNIEnv<'_>,
    _this: JObject<'_>,
) -> jint {
    THREAD_STATES.acquire(&Interpreter)
}

#[unsafe(no_mangle)]
pub extern "system" fn Java_org_jbridge_PythonVM_releaseThreadState(
    _env: JNIEnv<'_>,
    _this: JObject<'_>,
) -> jint {
    THREAD_STATES.release(&Interpreter)
}

extern "system" fn python_exception_get_error_info<'local>(
    mut env: JNIEnv<'local>,
    this: JObject<'local>,
) {
    let result = with_python(|py| {
        CAPTURES.with_current(|bridge| {
            if bridge.captured().is_none() {
                // Python code called back from Java may have left one pending.
                if let Err(e) = bridge.capture(&mut PyErrSource::new(py, None)) {
                    tracing::warn!(error = %e, "Failed to capture Python error");
                }
            }
            let mut sink = FieldSink::new(&mut env, &this);
            if let Err(e) = bridge.propagate(&mut sink) {
                tracing::debug!(error = %e, "Python error reported as capture failure");
            }
        })
    });
    if let Err(e) = result {
        throw_bridge_error(&mut env, &e);
    }
}

extern "system" fn python_exception_clear<'local>(_env: JNIEnv<'local>, _this: JObject<'local>) {
    CAPTURES.with_current(|bridge| bridge.clear());
    if python::is_initialized() {
        Python::attach(|py| drop(PyErr::take(py)));
    }
}

fn register_natives(env: &mut JNIEnv<'_>) -> jni::errors::Result<()> {
    let methods = [
        NativeMethod {
            name: "getErrorInfo".into(),
            sig: "()V".into(),
            fn_ptr: python_exception_get_error_info as *mut c_void,
        },
        NativeMethod {
            name: "clear".into(),
            sig: "()V".into(),
            fn_ptr: python_exception_clear as *mut c_void,
        },
    ];
    env.register_native_methods(PYTHON_EXCEPTION, &methods)
}

#[unsafe(no_mangle)]
pub extern "system" fn JNI_OnLoad(vm: *mut jni::sys::JavaVM, _reserved: *mut c_void) -> jint {
    jbridge::util::init_logging();

    // SAFETY: the JVM passes its own `JavaVM`, valid for as long as this
    // library stays loaded.
    let java_vm = match unsafe { JavaVM::from_raw(vm) } {
        Ok(vm) => vm,
        Err(e) => {
            tracing::error!(error = %e, "JNI_OnLoad received an invalid JavaVM");
            return status::JNI_ERR;
        }
    };
    let java_vm = HOST_VM.get_or_init(|| java_vm);

    let mut env = match java_vm.get_env() {
        Ok(env) => env,
        Err(e) => {
            tracing::error!(error = %e, "JNI_OnLoad called on a detached thread");
            return status::JNI_ERR;
        }
    };
    if let Err(e) = register_natives(&mut env) {
        // PythonException is optional for callers that only use PythonVM.
        let _ = env.exception_clear();
        tracing::warn!(error = %e, class = PYTHON_EXCEPTION, "Failed to register natives");
    }

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "jbridge native library loaded");
    JNI_VERSION_1_8
}
