//! Constants shared between the bridge core and the SDKs.
//!
//! Names that both the Python extension and the JNI library must agree on
//! live here so neither SDK depends on the other.

/// JNI status codes returned by the invocation interface.
pub mod status {
    /// Success.
    pub const JNI_OK: i32 = 0;
    /// Unknown error.
    pub const JNI_ERR: i32 = -1;
    /// Thread detached from the VM.
    pub const JNI_EDETACHED: i32 = -2;
    /// JNI version error.
    pub const JNI_EVERSION: i32 = -3;
}

/// Java classes the bridge touches by name.
pub mod java_classes {
    /// Exception thrown into Java for failures on the Python side.
    pub const PYTHON_EXCEPTION: &str = "org/jbridge/PythonException";

    /// Bridge-internal failures that are not Python errors.
    pub const ILLEGAL_STATE: &str = "java/lang/IllegalStateException";
}

/// Field names on `org.jbridge.PythonException`.
pub mod exception_fields {
    pub const ERROR_NAME: &str = "errorName";
    pub const MESSAGE: &str = "message";
    pub const TRACEBACK: &str = "traceback";

    /// JNI signature of all three fields.
    pub const STRING_SIG: &str = "Ljava/lang/String;";
}

/// Python attribute holding the raw JNI global handle of a proxy instance.
pub const EMBEDDED_HANDLE_ATTR: &str = "_jobject";

/// Thread-state counter value meaning "no Python execution state".
pub const NO_THREAD_STATE: i32 = -1;
