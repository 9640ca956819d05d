//! Moving errors between the two runtimes.
//!
//! An [`ExceptionBridge`] walks one error through
//! `Clear → Captured → Propagated` (or back to `Clear` when the caller decides
//! the error is not fatal). Capture reads the error out of the source runtime
//! through an [`ErrorSource`]; propagation rebuilds it on the destination
//! through an [`ErrorSink`].
//!
//! Capturing clears the source runtime's error state once. A captured error is
//! either propagated or explicitly cleared; if building the destination error
//! fails, the sink raises a capture-failure error instead.

mod redirect;
mod slots;

pub use redirect::{DiagnosticStream, Redirected, capture_output};
pub use slots::CaptureSlots;

use jbridge_shared::errors::{BridgeError, BridgeResult};

/// Kind name recorded when the source cannot name its error.
pub const UNKNOWN_KIND: &str = "<unknown>";

/// An error lifted out of one runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedError {
    /// Registered type name of the error (`ValueError`, `java.io.IOException`).
    pub kind_name: String,
    /// String conversion of the error value.
    pub message: String,
    /// Full trace as the source runtime prints it.
    pub formatted_trace: String,
}

/// Where an [`ExceptionBridge`] is in its cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExceptionState {
    #[default]
    Clear,
    Captured(CapturedError),
    Propagated,
}

/// Read access to a runtime's outstanding error.
pub trait ErrorSource {
    /// The runtime's own representation of an outstanding error.
    type Pending;

    /// Take the outstanding error, clearing the runtime's error state.
    fn take_pending(&mut self) -> Option<Self::Pending>;

    fn kind_name(&mut self, pending: &Self::Pending) -> BridgeResult<String>;

    fn message(&mut self, pending: &Self::Pending) -> BridgeResult<String>;

    /// Print the trace and return it. Consumes the error and must leave the
    /// runtime's error state clear, whether or not formatting succeeds.
    fn formatted_trace(&mut self, pending: Self::Pending) -> BridgeResult<String>;
}

/// Write access to a runtime's error facility.
pub trait ErrorSink {
    /// Build an error carrying `error`'s fields and raise it.
    fn raise(&mut self, error: &CapturedError) -> BridgeResult<()>;

    /// Raise an error saying the previous [`raise`](Self::raise) failed.
    fn raise_capture_failure(&mut self, reason: &str);
}

/// One error's trip across the boundary.
#[derive(Debug, Default)]
pub struct ExceptionBridge {
    state: ExceptionState,
}

impl ExceptionBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ExceptionState {
        &self.state
    }

    pub fn captured(&self) -> Option<&CapturedError> {
        match &self.state {
            ExceptionState::Captured(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_clear(&self) -> bool {
        self.state == ExceptionState::Clear
    }

    /// Capture the source's outstanding error, if any.
    ///
    /// Returns `Ok(false)` and stays put when nothing is outstanding. A field
    /// the source cannot produce is replaced by a placeholder; the error is
    /// still captured. Capturing over an earlier capture is refused and the
    /// source is left untouched.
    pub fn capture<S>(&mut self, source: &mut S) -> BridgeResult<bool>
    where
        S: ErrorSource + ?Sized,
    {
        if let ExceptionState::Captured(previous) = &self.state {
            return Err(BridgeError::Internal(format!(
                "an error of kind {} is already captured on this thread",
                previous.kind_name
            )));
        }

        let Some(pending) = source.take_pending() else {
            return Ok(false);
        };

        let kind_name = source.kind_name(&pending).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read error kind");
            UNKNOWN_KIND.to_string()
        });
        let message = source.message(&pending).unwrap_or_else(|e| {
            tracing::warn!(kind = %kind_name, error = %e, "Failed to read error message");
            String::new()
        });
        let formatted_trace = source.formatted_trace(pending).unwrap_or_else(|e| {
            tracing::warn!(kind = %kind_name, error = %e, "Failed to format error trace");
            String::new()
        });

        tracing::debug!(kind = %kind_name, "Captured error");
        self.state = ExceptionState::Captured(CapturedError {
            kind_name,
            message,
            formatted_trace,
        });
        Ok(true)
    }

    /// Raise the captured error on `sink`.
    ///
    /// Returns `Ok(false)` when nothing is captured. If the sink cannot build
    /// the error it is asked to raise a capture-failure error instead and
    /// [`BridgeError::Capture`] is returned; either way the bridge ends in
    /// `Propagated`.
    pub fn propagate<D>(&mut self, sink: &mut D) -> BridgeResult<bool>
    where
        D: ErrorSink + ?Sized,
    {
        let error = match std::mem::replace(&mut self.state, ExceptionState::Propagated) {
            ExceptionState::Captured(error) => error,
            other => {
                self.state = other;
                return Ok(false);
            }
        };

        if let Err(e) = sink.raise(&error) {
            let reason = format!("could not rebuild {}: {}", error.kind_name, e);
            tracing::warn!(kind = %error.kind_name, error = %e, "Failed to propagate captured error");
            sink.raise_capture_failure(&reason);
            return Err(BridgeError::Capture(reason));
        }

        tracing::debug!(kind = %error.kind_name, "Propagated captured error");
        Ok(true)
    }

    /// Discard any captured error without raising it.
    pub fn clear(&mut self) -> Option<CapturedError> {
        match std::mem::take(&mut self.state) {
            ExceptionState::Captured(error) => {
                tracing::debug!(kind = %error.kind_name, "Cleared captured error");
                Some(error)
            }
            _ => None,
        }
    }

    /// Capture from `source` and, if something was captured, raise it on `sink`.
    pub fn forward<S, D>(&mut self, source: &mut S, sink: &mut D) -> BridgeResult<bool>
    where
        S: ErrorSource + ?Sized,
        D: ErrorSink + ?Sized,
    {
        if !self.capture(source)? {
            return Ok(false);
        }
        self.propagate(sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An error slot that behaves like a runtime's "current exception".
    #[derive(Default)]
    struct FakeSource {
        pending: Option<(String, String)>,
        takes: usize,
        trace_fails: bool,
    }

    impl FakeSource {
        fn raising(kind: &str, message: &str) -> Self {
            Self {
                pending: Some((kind.to_string(), message.to_string())),
                ..Default::default()
            }
        }
    }

    impl ErrorSource for FakeSource {
        type Pending = (String, String);

        fn take_pending(&mut self) -> Option<Self::Pending> {
            let pending = self.pending.take();
            if pending.is_some() {
                self.takes += 1;
            }
            pending
        }

        fn kind_name(&mut self, pending: &Self::Pending) -> BridgeResult<String> {
            Ok(pending.0.clone())
        }

        fn message(&mut self, pending: &Self::Pending) -> BridgeResult<String> {
            Ok(pending.1.clone())
        }

        fn formatted_trace(&mut self, pending: Self::Pending) -> BridgeResult<String> {
            if self.trace_fails {
                return Err(BridgeError::Python("stderr unavailable".into()));
            }
            Ok(format!("Traceback:\n{}: {}\n", pending.0, pending.1))
        }
    }

    #[derive(Default)]
    struct FakeSink {
        raised: Vec<CapturedError>,
        failures: Vec<String>,
        broken: bool,
    }

    impl ErrorSink for FakeSink {
        fn raise(&mut self, error: &CapturedError) -> BridgeResult<()> {
            if self.broken {
                return Err(BridgeError::Jni("OutOfMemoryError".into()));
            }
            self.raised.push(error.clone());
            Ok(())
        }

        fn raise_capture_failure(&mut self, reason: &str) {
            self.failures.push(reason.to_string());
        }
    }

    #[test]
    fn test_capture_with_nothing_outstanding_is_noop() {
        let mut bridge = ExceptionBridge::new();
        let mut source = FakeSource::default();
        let mut sink = FakeSink::default();

        assert!(!bridge.capture(&mut source).unwrap());
        assert!(bridge.is_clear());
        assert!(!bridge.propagate(&mut sink).unwrap());
        assert!(sink.raised.is_empty());
        assert!(bridge.is_clear());
    }

    #[test]
    fn test_capture_then_propagate_preserves_fields() {
        let mut bridge = ExceptionBridge::new();
        let mut source = FakeSource::raising("ValueError", "bad input");
        let mut sink = FakeSink::default();

        assert!(bridge.capture(&mut source).unwrap());
        assert_eq!(source.takes, 1);
        assert!(source.pending.is_none(), "source error state must be cleared");

        let captured = bridge.captured().cloned().unwrap();
        assert!(bridge.propagate(&mut sink).unwrap());

        assert_eq!(bridge.state(), &ExceptionState::Propagated);
        assert_eq!(sink.raised, vec![captured.clone()]);
        assert_eq!(captured.kind_name, "ValueError");
        assert_eq!(captured.message, "bad input");
        assert_eq!(captured.formatted_trace, "Traceback:\nValueError: bad input\n");
    }

    #[test]
    fn test_clear_discards_capture() {
        let mut bridge = ExceptionBridge::new();
        let mut source = FakeSource::raising("KeyError", "'x'");
        let mut sink = FakeSink::default();

        bridge.capture(&mut source).unwrap();
        let discarded = bridge.clear().unwrap();
        assert_eq!(discarded.kind_name, "KeyError");
        assert!(bridge.is_clear());

        assert!(!bridge.propagate(&mut sink).unwrap());
        assert!(sink.raised.is_empty());
    }

    #[test]
    fn test_trace_failure_still_captures() {
        let mut bridge = ExceptionBridge::new();
        let mut source = FakeSource {
            trace_fails: true,
            ..FakeSource::raising("OSError", "disk gone")
        };

        assert!(bridge.capture(&mut source).unwrap());
        let captured = bridge.captured().unwrap();
        assert_eq!(captured.message, "disk gone");
        assert!(captured.formatted_trace.is_empty());
    }

    #[test]
    fn test_sink_failure_raises_capture_failure() {
        let mut bridge = ExceptionBridge::new();
        let mut source = FakeSource::raising("RuntimeError", "boom");
        let mut sink = FakeSink {
            broken: true,
            ..Default::default()
        };

        bridge.capture(&mut source).unwrap();
        let err = bridge.propagate(&mut sink).unwrap_err();

        assert!(matches!(err, BridgeError::Capture(_)));
        assert_eq!(sink.failures.len(), 1);
        assert!(sink.failures[0].contains("RuntimeError"));
        assert_eq!(bridge.state(), &ExceptionState::Propagated);
    }

    #[test]
    fn test_second_capture_leaves_source_untouched() {
        let mut bridge = ExceptionBridge::new();
        bridge
            .capture(&mut FakeSource::raising("TypeError", "first"))
            .unwrap();

        let mut second = FakeSource::raising("TypeError", "second");
        assert!(bridge.capture(&mut second).is_err());
        assert!(second.pending.is_some());
        assert_eq!(bridge.captured().unwrap().message, "first");
    }

    #[test]
    fn test_forward_after_propagated_starts_new_cycle() {
        let mut bridge = ExceptionBridge::new();
        let mut sink = FakeSink::default();

        bridge
            .forward(&mut FakeSource::raising("A", "1"), &mut sink)
            .unwrap();
        bridge
            .forward(&mut FakeSource::raising("B", "2"), &mut sink)
            .unwrap();

        let kinds: Vec<_> = sink.raised.iter().map(|e| e.kind_name.as_str()).collect();
        assert_eq!(kinds, ["A", "B"]);
    }
}
