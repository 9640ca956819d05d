//! Reading a pending Java exception out of the JVM.

use jbridge_shared::errors::BridgeResult;
use jni::JNIEnv;
use jni::objects::{JObject, JThrowable, JValue};
use jni::sys;

use super::{JniResultExt, class_name, java_string, to_java_string};
use crate::exception::{DiagnosticStream, ErrorSource, capture_output};
use crate::runtime::constants::java;

/// The pending Java exception on the calling thread.
pub struct JavaErrorSource<'a, 'local> {
    env: &'a mut JNIEnv<'local>,
}

impl<'a, 'local> JavaErrorSource<'a, 'local> {
    pub fn new(env: &'a mut JNIEnv<'local>) -> Self {
        Self { env }
    }
}

impl<'local> ErrorSource for JavaErrorSource<'_, 'local> {
    type Pending = JThrowable<'local>;

    fn take_pending(&mut self) -> Option<JThrowable<'local>> {
        if !self.env.exception_check().unwrap_or(false) {
            return None;
        }
        let throwable = self.env.exception_occurred().ok();
        if let Err(e) = self.env.exception_clear() {
            tracing::warn!(error = %e, "Failed to clear pending Java exception");
        }
        throwable.filter(|t| !t.is_null())
    }

    fn kind_name(&mut self, pending: &JThrowable<'local>) -> BridgeResult<String> {
        class_name(self.env, pending)
    }

    /// `getMessage()`, empty when the throwable has none.
    fn message(&mut self, pending: &JThrowable<'local>) -> BridgeResult<String> {
        let message = self
            .env
            .call_method(pending, "getMessage", "()Ljava/lang/String;", &[])
            .and_then(|v| v.l())
            .bridged()?;
        Ok(java_string(self.env, message)?.unwrap_or_default())
    }

    fn formatted_trace(&mut self, pending: JThrowable<'local>) -> BridgeResult<String> {
        let mut stderr = JavaStderr::new(self.env);
        let trace = capture_output(&mut stderr, |s| {
            s.env
                .call_method(&pending, "printStackTrace", "()V", &[])
                .bridged()?;
            Ok(())
        });
        if self.env.exception_check().unwrap_or(false) {
            let _ = self.env.exception_clear();
        }
        trace
    }
}

/// `System.err`, redirectable into a `ByteArrayOutputStream`.
pub struct JavaStderr<'a, 'local> {
    env: &'a mut JNIEnv<'local>,
    buffer: Option<JObject<'local>>,
}

impl<'a, 'local> JavaStderr<'a, 'local> {
    pub fn new(env: &'a mut JNIEnv<'local>) -> Self {
        Self { env, buffer: None }
    }
}

impl<'local> DiagnosticStream for JavaStderr<'_, 'local> {
    type Saved = JObject<'local>;

    fn redirect(&mut self) -> BridgeResult<JObject<'local>> {
        let original = self
            .env
            .get_static_field(java::SYSTEM, "err", "Ljava/io/PrintStream;")
            .and_then(|v| v.l())
            .bridged()?;
        let buffer = self
            .env
            .new_object(java::BYTE_ARRAY_OUTPUT_STREAM, "()V", &[])
            .bridged()?;
        let stream = self
            .env
            .new_object(
                java::PRINT_STREAM,
                "(Ljava/io/OutputStream;Z)V",
                &[JValue::Object(&buffer), JValue::Bool(sys::JNI_TRUE)],
            )
            .bridged()?;
        self.env
            .call_static_method(
                java::SYSTEM,
                "setErr",
                "(Ljava/io/PrintStream;)V",
                &[JValue::Object(&stream)],
            )
            .bridged()?;

        self.buffer = Some(buffer);
        Ok(original)
    }

    fn contents(&mut self) -> BridgeResult<String> {
        match self.buffer.take() {
            Some(buffer) => {
                let text = to_java_string(self.env, &buffer);
                self.buffer = Some(buffer);
                text
            }
            None => Ok(String::new()),
        }
    }

    fn restore(&mut self, saved: JObject<'local>) {
        if self.env.exception_check().unwrap_or(false) {
            let _ = self.env.exception_clear();
        }
        let restored = self.env.call_static_method(
            java::SYSTEM,
            "setErr",
            "(Ljava/io/PrintStream;)V",
            &[JValue::Object(&saved)],
        );
        if let Err(e) = restored {
            tracing::warn!(error = %e, "Failed to restore System.err");
            let _ = self.env.exception_clear();
        }
    }
}
