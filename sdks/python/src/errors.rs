//! Turning bridge and Java failures into Python exceptions.

use jbridge::vm::{JavaErrorSource, JniVm};
use jbridge::{BridgeError, BridgeResult, CapturedError, ErrorSink, ExceptionBridge};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::JavaError;

/// Configuration problems are `ValueError`, everything else `RuntimeError`.
pub(crate) fn map_err(err: BridgeError) -> PyErr {
    if err.is_config() {
        PyValueError::new_err(err.to_string())
    } else {
        PyRuntimeError::new_err(err.to_string())
    }
}

/// Convert `err`, preferring a pending Java exception on this thread.
///
/// A JNI call that failed because Java threw leaves the throwable pending;
/// it is captured (clearing it in the JVM) and raised as `JavaError`.
pub(crate) fn java_or_bridge_err(py: Python<'_>, vm: &JniVm, err: BridgeError) -> PyErr {
    let Ok(mut env) = vm.env() else {
        return map_err(err);
    };
    if !env.exception_check().unwrap_or(false) {
        return map_err(err);
    }

    let mut source = JavaErrorSource::new(&mut env);
    let mut sink = PyErrSink::new(py);
    if let Err(e) = ExceptionBridge::new().forward(&mut source, &mut sink) {
        tracing::debug!(error = %e, "Java exception could not be rebuilt in Python");
    }
    sink.into_raised().unwrap_or_else(|| map_err(err))
}

/// Builds `jbridge.JavaError` instances.
pub(crate) struct PyErrSink<'py> {
    py: Python<'py>,
    raised: Option<PyErr>,
}

impl<'py> PyErrSink<'py> {
    pub(crate) fn new(py: Python<'py>) -> Self {
        Self { py, raised: None }
    }

    pub(crate) fn into_raised(self) -> Option<PyErr> {
        self.raised
    }

    fn build(&self, error: &CapturedError) -> PyResult<PyErr> {
        let err = JavaError::new_err(format!("{}: {}", error.kind_name, error.message));
        let value = err.value(self.py);
        value.setattr("kind_name", &error.kind_name)?;
        value.setattr("message", &error.message)?;
        value.setattr("formatted_trace", &error.formatted_trace)?;
        Ok(err)
    }
}

impl ErrorSink for PyErrSink<'_> {
    fn raise(&mut self, error: &CapturedError) -> BridgeResult<()> {
        let err = self
            .build(error)
            .map_err(|e| BridgeError::Python(e.to_string()))?;
        self.raised = Some(err);
        Ok(())
    }

    fn raise_capture_failure(&mut self, reason: &str) {
        self.raised = Some(PyRuntimeError::new_err(format!(
            "failed to convert Java exception: {reason}"
        )));
    }
}
