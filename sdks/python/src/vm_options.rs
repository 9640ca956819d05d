//! Python binding for JVM startup options.

use jbridge::VmOptions;
use pyo3::prelude::*;

/// Options for `initVM`.
#[pyclass(name = "VmOptions")]
#[derive(Clone, Debug, Default)]
pub(crate) struct PyVmOptions {
    #[pyo3(get, set)]
    pub classpath: Option<String>,
    #[pyo3(get, set)]
    pub initialheap: Option<String>,
    #[pyo3(get, set)]
    pub maxheap: Option<String>,
    #[pyo3(get, set)]
    pub maxstack: Option<String>,
    #[pyo3(get, set)]
    pub vmargs: Option<String>,
}

#[pymethods]
impl PyVmOptions {
    #[new]
    #[pyo3(signature = (classpath=None, initialheap=None, maxheap=None, maxstack=None, vmargs=None))]
    fn new(
        classpath: Option<String>,
        initialheap: Option<String>,
        maxheap: Option<String>,
        maxstack: Option<String>,
        vmargs: Option<String>,
    ) -> Self {
        Self {
            classpath,
            initialheap,
            maxheap,
            maxstack,
            vmargs,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "VmOptions(classpath={:?}, initialheap={:?}, maxheap={:?}, maxstack={:?}, vmargs={:?})",
            self.classpath, self.initialheap, self.maxheap, self.maxstack, self.vmargs
        )
    }
}

impl PyVmOptions {
    /// Fields set in `other` replace the ones here.
    pub(crate) fn overridden_by(mut self, other: PyVmOptions) -> Self {
        self.classpath = other.classpath.or(self.classpath);
        self.initialheap = other.initialheap.or(self.initialheap);
        self.maxheap = other.maxheap.or(self.maxheap);
        self.maxstack = other.maxstack.or(self.maxstack);
        self.vmargs = other.vmargs.or(self.vmargs);
        self
    }
}

impl From<PyVmOptions> for VmOptions {
    fn from(py: PyVmOptions) -> Self {
        VmOptions {
            classpath: py.classpath,
            initial_heap_size: py.initialheap,
            max_heap_size: py.maxheap,
            max_stack_size: py.maxstack,
            extra_options: py.vmargs,
            base_classpath: None,
        }
    }
}
