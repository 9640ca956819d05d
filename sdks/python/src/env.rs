//! Python view of the running JVM.

use jbridge::refs::{DumpMode, RefId, RefReport};
use jbridge::runtime::backend::ObjectHost;
use jbridge::vm::JniVm;
use jbridge::{RuntimeHandle, ScopedLock, VmEnv};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::errors::{java_or_bridge_err, map_err};

/// Take the execution lock, letting other Python threads run while waiting.
pub(crate) fn lock_env<'a>(py: Python<'_>, env: &'a VmEnv<JniVm>) -> ScopedLock<'a> {
    env.execution_lock()
        .acquire_or_wait(|lock| py.detach(|| lock.wait_until_free()))
}

/// An integer flag argument: `True`, `1` and any non-zero int are set.
fn flag(value: Option<&Bound<'_, PyAny>>) -> PyResult<bool> {
    match value {
        Some(value) => Ok(value.extract::<i64>()? != 0),
        None => Ok(false),
    }
}

/// The process JVM environment.
#[pyclass(name = "VmEnv", frozen)]
pub(crate) struct PyVmEnv {
    pub(crate) handle: RuntimeHandle<JniVm>,
}

impl PyVmEnv {
    pub(crate) fn new(handle: RuntimeHandle<JniVm>) -> Self {
        Self { handle }
    }
}

#[pymethods]
impl PyVmEnv {
    /// Attach the calling thread to the JVM. Returns the JNI status code.
    #[pyo3(signature = (name=None, asDaemon=None))]
    #[allow(non_snake_case)]
    fn attachCurrentThread(
        &self,
        py: Python<'_>,
        name: Option<String>,
        asDaemon: Option<&Bound<'_, PyAny>>,
    ) -> PyResult<i32> {
        let as_daemon = flag(asDaemon)?;
        let handle = &self.handle;
        Ok(py.detach(|| handle.attach_current_thread(name.as_deref(), as_daemon)))
    }

    #[allow(non_snake_case)]
    fn detachCurrentThread(&self, py: Python<'_>) -> i32 {
        let handle = &self.handle;
        py.detach(|| handle.detach_current_thread())
    }

    #[allow(non_snake_case)]
    fn isCurrentThreadAttached(&self) -> bool {
        self.handle.is_current_thread_attached()
    }

    /// Hex form of `hash(obj)`, zero-padded to the pointer width.
    fn strhash(&self, obj: &Bound<'_, PyAny>) -> PyResult<String> {
        let hash = obj.hash()? as usize;
        Ok(format!("{:0width$x}", hash, width = std::mem::size_of::<usize>() * 2))
    }

    /// Live Java references held from Python.
    ///
    /// `classes=True` gives `{class name: instances}`; `values=True` gives
    /// `[(str(obj), refcount)]`; otherwise `[(identity hash, refcount)]`.
    #[pyo3(signature = (classes=None, values=None))]
    #[allow(non_snake_case)]
    fn _dumpRefs(
        &self,
        py: Python<'_>,
        classes: Option<&Bound<'_, PyAny>>,
        values: Option<&Bound<'_, PyAny>>,
    ) -> PyResult<Py<PyAny>> {
        let (classes, values) = (flag(classes)?, flag(values)?);
        let env = self.handle.as_ref();
        let report = {
            let held = lock_env(py, env);
            env.dump_refs(&held, DumpMode::from_flags(classes, values))
        }
        .map_err(|e| java_or_bridge_err(py, env.vm(), e))?;

        let out = match report {
            RefReport::ByKind(kinds) => {
                let dict = PyDict::new(py);
                for (kind, count) in kinds {
                    dict.set_item(kind, count)?;
                }
                dict.into_any()
            }
            RefReport::Values(rows) => PyList::new(py, rows)?.into_any(),
            RefReport::Hashes(rows) => PyList::new(py, rows)?.into_any(),
        };
        Ok(out.unbind())
    }

    #[allow(non_snake_case)]
    fn _addClassPath(&self, py: Python<'_>, paths: &str) -> PyResult<()> {
        self.handle
            .add_classpath(paths)
            .map_err(|e| java_or_bridge_err(py, self.handle.vm(), e))
    }

    /// Look up a class and return a counted reference to it.
    #[allow(non_snake_case)]
    fn findClass(&self, py: Python<'_>, name: &str) -> PyResult<PyJObject> {
        let env = self.handle.as_ref();
        let id = {
            let held = lock_env(py, env);
            env.vm().with_class(name, |class| env.intern(&held, &class))
        }
        .map_err(|e| java_or_bridge_err(py, env.vm(), e))?;

        Ok(PyJObject {
            env: self.handle.clone(),
            id,
        })
    }

    #[getter]
    fn jni_version(&self) -> PyResult<i32> {
        self.handle.jni_version().map_err(map_err)
    }

    #[getter]
    fn java_version(&self, py: Python<'_>) -> PyResult<String> {
        self.handle
            .java_version()
            .map_err(|e| java_or_bridge_err(py, self.handle.vm(), e))
    }

    #[getter]
    fn classpath(&self, py: Python<'_>) -> PyResult<Option<String>> {
        self.handle
            .classpath()
            .map_err(|e| java_or_bridge_err(py, self.handle.vm(), e))
    }

    fn __repr__(&self) -> String {
        format!("<VmEnv {:?}>", self.handle)
    }
}

/// A Java object seen from Python.
///
/// Holds one count in the reference table; the count is dropped when the
/// Python object is collected.
#[pyclass(name = "JObject", frozen)]
pub(crate) struct PyJObject {
    env: RuntimeHandle<JniVm>,
    id: RefId,
}

#[pymethods]
impl PyJObject {
    /// Raw JNI global reference, as an integer.
    #[getter]
    fn _jobject(&self, py: Python<'_>) -> PyResult<usize> {
        let held = lock_env(py, &self.env);
        self.env
            .refs()
            .with_global(&held, self.id, |global| global.as_obj().as_raw() as usize)
            .ok_or_else(|| pyo3::exceptions::PyRuntimeError::new_err("reference already released"))
    }

    #[allow(non_snake_case)]
    fn toString(&self, py: Python<'_>) -> PyResult<String> {
        let held = lock_env(py, &self.env);
        let global = self
            .env
            .refs()
            .global(&held, self.id)
            .ok_or_else(|| pyo3::exceptions::PyRuntimeError::new_err("reference already released"))?;
        drop(held);

        self.env
            .vm()
            .describe(&global)
            .map_err(|e| java_or_bridge_err(py, self.env.vm(), e))
    }

    fn __hash__(&self) -> isize {
        self.id.identity_hash() as isize
    }

    fn __str__(&self, py: Python<'_>) -> PyResult<String> {
        self.toString(py)
    }
}

impl Drop for PyJObject {
    fn drop(&mut self) {
        Python::attach(|py| {
            let held = lock_env(py, &self.env);
            if let Err(e) = self.env.release(&held, self.id) {
                tracing::warn!(error = %e, "Failed to release Java reference");
            }
        });
    }
}
