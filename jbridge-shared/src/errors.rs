//! Error taxonomy shared by the bridge core and both SDKs.

use std::fmt;

/// Why a reverse-direction instantiation failed.
///
/// Each step of `PythonVM.instantiate` has its own reason string; the Java
/// side sees it as the message of the thrown `PythonException`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedFailure {
    /// The named module could not be imported.
    ImportFailed,
    /// The module has no attribute with the requested class name.
    ClassNotFound,
    /// Calling the class with no arguments raised.
    InstantiationFailed,
    /// The instance carries no embedded Java handle field.
    NotAProxy,
}

impl EmbedFailure {
    pub fn reason(self) -> &'static str {
        match self {
            EmbedFailure::ImportFailed => "import failed",
            EmbedFailure::ClassNotFound => "class not found",
            EmbedFailure::InstantiationFailed => "instantiation failed",
            EmbedFailure::NotAProxy => "instance does not proxy a java object",
        }
    }
}

impl fmt::Display for EmbedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Errors produced anywhere in the bridge.
///
/// Variants follow the failure categories of the bridge: configuration
/// problems are caught before any runtime is touched, creation failures come
/// from the JVM refusing to start, cross-runtime failures carry a reason for
/// the other side, and capture failures are reported instead of dropping an
/// in-flight error.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Bad or conflicting startup options.
    #[error("{0}")]
    Config(String),

    /// The native runtime refused to start.
    #[error("An error occurred while creating Java VM: {0}")]
    Creation(String),

    /// A failure on one side reported to the other side.
    #[error("{0}")]
    CrossRuntime(EmbedFailure),

    /// Building the destination-side error object failed.
    #[error("error capture failed: {0}")]
    Capture(String),

    /// Thread attachment or execution-lock misuse.
    #[error("thread state error: {0}")]
    Thread(String),

    /// Unknown or already released reference.
    #[error("handle error: {0}")]
    Handle(String),

    /// A JNI call failed.
    #[error("JNI error: {0}")]
    Jni(String),

    /// A Python C-API call failed.
    #[error("Python error: {0}")]
    Python(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// True for errors detected before any runtime state was changed.
    pub fn is_config(&self) -> bool {
        matches!(self, BridgeError::Config(_))
    }
}

impl From<EmbedFailure> for BridgeError {
    fn from(failure: EmbedFailure) -> Self {
        BridgeError::CrossRuntime(failure)
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
