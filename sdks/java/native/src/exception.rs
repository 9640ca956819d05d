//! Filling in `org.jbridge.PythonException` from a captured Python error.

use jbridge::vm::JniResultExt;
use jbridge::{BridgeError, BridgeResult, CapturedError, ErrorSink};
use jbridge_shared::constants::exception_fields::{ERROR_NAME, MESSAGE, STRING_SIG, TRACEBACK};
use jbridge_shared::constants::java_classes::{ILLEGAL_STATE, PYTHON_EXCEPTION};
use jni::JNIEnv;
use jni::objects::{JObject, JValue};

/// Throw `class` with `message` on the calling thread.
pub(crate) fn throw_exception(env: &mut JNIEnv<'_>, class: &str, message: impl AsRef<str>) {
    let _ = env.throw_new(class, message.as_ref());
}

/// Python-side failures surface as `PythonException`; anything else is a
/// bridge fault.
pub(crate) fn throw_bridge_error(env: &mut JNIEnv<'_>, err: &BridgeError) {
    if env.exception_check().unwrap_or(false) {
        return;
    }
    match err {
        BridgeError::CrossRuntime(failure) => throw_exception(env, PYTHON_EXCEPTION, failure.reason()),
        BridgeError::Python(_) => throw_exception(env, PYTHON_EXCEPTION, err.to_string()),
        _ => throw_exception(env, ILLEGAL_STATE, err.to_string()),
    }
}

/// Writes a captured error into the `errorName`, `message` and `traceback`
/// fields of a `PythonException`.
pub(crate) struct FieldSink<'a, 'local> {
    env: &'a mut JNIEnv<'local>,
    target: &'a JObject<'local>,
}

impl<'a, 'local> FieldSink<'a, 'local> {
    pub(crate) fn new(env: &'a mut JNIEnv<'local>, target: &'a JObject<'local>) -> Self {
        Self { env, target }
    }

    fn set(&mut self, field: &str, value: &str) -> BridgeResult<()> {
        let value = self.env.new_string(value).bridged()?;
        self.env
            .set_field(self.target, field, STRING_SIG, JValue::Object(&value))
            .bridged()?;
        self.env.delete_local_ref(value).bridged()
    }
}

impl ErrorSink for FieldSink<'_, '_> {
    fn raise(&mut self, error: &CapturedError) -> BridgeResult<()> {
        self.set(ERROR_NAME, &error.kind_name)?;
        self.set(MESSAGE, &error.message)?;
        self.set(TRACEBACK, &error.formatted_trace)
    }

    fn raise_capture_failure(&mut self, reason: &str) {
        if self.env.exception_check().unwrap_or(false) {
            let _ = self.env.exception_clear();
        }
        throw_exception(
            self.env,
            ILLEGAL_STATE,
            format!("failed to report Python error: {reason}"),
        );
    }
}
