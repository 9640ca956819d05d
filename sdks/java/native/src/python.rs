//! The embedded interpreter, seen through the bridge's traits.

use jbridge::embed::NameResolver;
use jbridge::exception::{DiagnosticStream, ErrorSource, capture_output};
use jbridge::thread::ManagedThreadState;
use jbridge::{BridgeError, BridgeResult};
use pyo3::ffi;
use pyo3::prelude::*;

pub(crate) fn is_initialized() -> bool {
    // SAFETY: `Py_IsInitialized` may be called at any time, with or without
    // the GIL.
    unsafe { ffi::Py_IsInitialized() != 0 }
}

/// Path of the shared object that holds the interpreter.
#[cfg(target_os = "linux")]
fn libpython_path() -> Option<std::ffi::CString> {
    let symbol = ffi::Py_IsInitialized as *const libc::c_void;
    let mut info = std::mem::MaybeUninit::<libc::Dl_info>::zeroed();

    // SAFETY: `symbol` is a function of the loaded interpreter and `info`
    // is writable.
    if unsafe { libc::dladdr(symbol, info.as_mut_ptr()) } == 0 {
        return None;
    }
    // SAFETY: `dladdr` succeeded, so it filled in `info`.
    let info = unsafe { info.assume_init() };
    if info.dli_fname.is_null() {
        return None;
    }
    // SAFETY: `dli_fname` is a NUL-terminated path owned by the loader.
    Some(unsafe { std::ffi::CStr::from_ptr(info.dli_fname) }.to_owned())
}

/// Re-open the interpreter with global symbol scope.
///
/// The JVM loads this library with local scope, which hides the `Py*`
/// symbols from extension modules Python loads later (`_ctypes`, `jbridge`).
/// The handle is never closed.
#[cfg(target_os = "linux")]
pub(crate) fn promote_libpython() -> BridgeResult<()> {
    let path = libpython_path()
        .ok_or_else(|| BridgeError::Internal("cannot locate the loaded libpython".into()))?;

    // SAFETY: `path` names an object that is already loaded, and
    // `RTLD_NOLOAD` keeps the loader from mapping anything new.
    let handle = unsafe {
        libc::dlopen(
            path.as_ptr(),
            libc::RTLD_NOW | libc::RTLD_GLOBAL | libc::RTLD_NOLOAD,
        )
    };
    if handle.is_null() {
        // SAFETY: `dlerror` returns null or a NUL-terminated message.
        let reason = unsafe { libc::dlerror() };
        let reason = if reason.is_null() {
            "unknown error".to_string()
        } else {
            // SAFETY: checked non-null above.
            unsafe { std::ffi::CStr::from_ptr(reason) }.to_string_lossy().into_owned()
        };
        return Err(BridgeError::Internal(format!(
            "cannot re-open {}: {reason}",
            path.to_string_lossy()
        )));
    }

    tracing::debug!(path = %path.to_string_lossy(), "libpython symbols made global");
    Ok(())
}

pub(crate) fn py_err(err: PyErr) -> BridgeError {
    BridgeError::Python(err.to_string())
}

/// Name lookup against the live interpreter.
pub(crate) struct PyResolver<'py> {
    py: Python<'py>,
}

impl<'py> PyResolver<'py> {
    pub(crate) fn new(py: Python<'py>) -> Self {
        Self { py }
    }
}

impl<'py> NameResolver for PyResolver<'py> {
    type Object = Bound<'py, PyAny>;
    type Error = PyErr;

    fn import_module(&mut self, name: &str) -> PyResult<Self::Object> {
        self.py.import(name).map(Bound::into_any)
    }

    fn get_attr(&mut self, obj: &Self::Object, name: &str) -> PyResult<Self::Object> {
        obj.getattr(name)
    }

    fn call0(&mut self, callable: &Self::Object) -> PyResult<Self::Object> {
        callable.call0()
    }
}

/// A Python error, either handed over by the caller or left pending in the
/// interpreter.
pub(crate) struct PyErrSource<'py> {
    py: Python<'py>,
    err: Option<PyErr>,
}

impl<'py> PyErrSource<'py> {
    pub(crate) fn new(py: Python<'py>, err: Option<PyErr>) -> Self {
        Self { py, err }
    }
}

impl ErrorSource for PyErrSource<'_> {
    type Pending = PyErr;

    fn take_pending(&mut self) -> Option<PyErr> {
        self.err.take().or_else(|| PyErr::take(self.py))
    }

    fn kind_name(&mut self, pending: &PyErr) -> BridgeResult<String> {
        pending
            .get_type(self.py)
            .name()
            .map(|name| name.to_string())
            .map_err(py_err)
    }

    fn message(&mut self, pending: &PyErr) -> BridgeResult<String> {
        pending
            .value(self.py)
            .str()
            .map(|s| s.to_string())
            .map_err(py_err)
    }

    fn formatted_trace(&mut self, pending: PyErr) -> BridgeResult<String> {
        let py = self.py;
        let mut stderr = PyStderr::new(py);
        capture_output(&mut stderr, |_| {
            pending.print(py);
            Ok(())
        })
    }
}

/// `sys.stderr`, swapped for an `io.StringIO` while a traceback prints.
pub(crate) struct PyStderr<'py> {
    py: Python<'py>,
    buffer: Option<Bound<'py, PyAny>>,
}

impl<'py> PyStderr<'py> {
    pub(crate) fn new(py: Python<'py>) -> Self {
        Self { py, buffer: None }
    }
}

impl<'py> DiagnosticStream for PyStderr<'py> {
    type Saved = Bound<'py, PyAny>;

    fn redirect(&mut self) -> BridgeResult<Self::Saved> {
        let sys = self.py.import("sys").map_err(py_err)?;
        let original = sys.getattr("stderr").map_err(py_err)?;
        let buffer = self
            .py
            .import("io")
            .and_then(|io| io.getattr("StringIO"))
            .and_then(|cls| cls.call0())
            .map_err(py_err)?;
        sys.setattr("stderr", &buffer).map_err(py_err)?;
        self.buffer = Some(buffer);
        Ok(original)
    }

    fn contents(&mut self) -> BridgeResult<String> {
        let buffer = self
            .buffer
            .as_ref()
            .ok_or_else(|| BridgeError::Internal("stderr is not redirected".into()))?;
        buffer
            .call_method0("getvalue")
            .and_then(|v| v.extract::<String>())
            .map_err(py_err)
    }

    fn restore(&mut self, saved: Self::Saved) {
        self.buffer = None;
        let result = self
            .py
            .import("sys")
            .and_then(|sys| sys.setattr("stderr", saved));
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to restore sys.stderr");
        }
    }
}

/// CPython thread states, pinned through the `PyGILState` counter.
///
/// A pin is one extra `PyGILState_Ensure` with no matching release, taken
/// while the GIL is already held so the GIL itself is not kept.
pub(crate) struct Interpreter;

impl ManagedThreadState for Interpreter {
    fn has_thread_state(&self) -> bool {
        is_initialized()
    }

    fn pin(&self) {
        Python::attach(|_| {
            // SAFETY: the GIL is held, so this only bumps the thread-state
            // counter; `unpin` balances it.
            let _ = unsafe { ffi::PyGILState_Ensure() };
        });
    }

    fn unpin(&self) {
        // SAFETY: only called for a pin taken by `pin`. Releasing with
        // `LOCKED` drops the counter without giving up the GIL that
        // `attach` holds.
        Python::attach(|_| unsafe {
            ffi::PyGILState_Release(ffi::PyGILState_STATE::PyGILState_LOCKED);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jbridge::{ExceptionBridge, ThreadStateCounters};
    use jbridge_shared::constants::NO_THREAD_STATE;
    use pyo3::exceptions::PyKeyError;

    fn raise_from_function(py: Python<'_>) -> PyErr {
        py.run(c"def parse():\n    raise ValueError('bad input')\nparse()\n", None, None)
            .unwrap_err()
    }

    // ========================================================================
    // ERROR CAPTURE
    // ========================================================================

    #[test]
    fn test_handed_over_error_is_captured_with_traceback() {
        Python::attach(|py| {
            let sys = py.import("sys").unwrap();
            let stderr_before = sys.getattr("stderr").unwrap();
            let err = raise_from_function(py);

            let mut bridge = ExceptionBridge::default();
            assert!(bridge.capture(&mut PyErrSource::new(py, Some(err))).unwrap());

            let captured = bridge.captured().unwrap();
            assert_eq!(captured.kind_name, "ValueError");
            assert_eq!(captured.message, "bad input");
            assert!(captured.formatted_trace.contains("Traceback"));
            assert!(captured.formatted_trace.contains("in parse"));
            assert!(captured.formatted_trace.contains("ValueError: bad input"));

            let stderr_after = sys.getattr("stderr").unwrap();
            assert!(stderr_after.is(&stderr_before), "sys.stderr must be restored");
        });
    }

    #[test]
    fn test_pending_error_is_taken_from_interpreter() {
        Python::attach(|py| {
            PyKeyError::new_err("missing").restore(py);

            let mut bridge = ExceptionBridge::default();
            assert!(bridge.capture(&mut PyErrSource::new(py, None)).unwrap());

            assert_eq!(bridge.captured().unwrap().kind_name, "KeyError");
            assert!(PyErr::take(py).is_none(), "pending error is consumed");
        });
    }

    #[test]
    fn test_nothing_pending_captures_nothing() {
        Python::attach(|py| {
            let mut bridge = ExceptionBridge::default();
            assert!(!bridge.capture(&mut PyErrSource::new(py, None)).unwrap());
            assert!(bridge.is_clear());
        });
    }

    #[test]
    fn test_stderr_contents_require_redirect() {
        Python::attach(|py| {
            let mut stderr = PyStderr::new(py);
            assert!(stderr.contents().is_err());

            let saved = stderr.redirect().unwrap();
            py.import("sys")
                .unwrap()
                .getattr("stderr")
                .unwrap()
                .call_method1("write", ("hello",))
                .unwrap();
            assert_eq!(stderr.contents().unwrap(), "hello");

            stderr.restore(saved);
            assert!(stderr.contents().is_err());
        });
    }

    // ========================================================================
    // NAME RESOLUTION AND THREAD STATES
    // ========================================================================

    #[test]
    fn test_resolver_walks_real_modules() {
        Python::attach(|py| {
            let mut resolver = PyResolver::new(py);
            let module = resolver.import_module("collections").unwrap();
            let class = resolver.get_attr(&module, "OrderedDict").unwrap();
            let instance = resolver.call0(&class).unwrap();
            assert_eq!(instance.len().unwrap(), 0);

            assert!(resolver.import_module("no_such_module_here").is_err());
        });
    }

    #[test]
    fn test_pins_balance_on_live_interpreter() {
        Python::attach(|_| {});
        let counters = ThreadStateCounters::new();

        assert_eq!(counters.acquire(&Interpreter), 2);
        assert_eq!(counters.acquire(&Interpreter), 3);
        assert_eq!(counters.release(&Interpreter), 2);
        assert_eq!(counters.release(&Interpreter), 1);
        assert_eq!(counters.release(&Interpreter), NO_THREAD_STATE);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_libpython_is_found_on_disk() {
        Python::attach(|_| {});
        let path = libpython_path().unwrap();
        let path = std::path::PathBuf::from(path.to_string_lossy().into_owned());
        assert!(path.exists(), "{} does not exist", path.display());
    }
}
