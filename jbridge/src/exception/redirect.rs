//! Scoped redirection of a runtime's diagnostic stream.
//!
//! Both runtimes only know how to print a trace, so the trace is captured by
//! pointing the error stream at an in-memory buffer, printing, and reading the
//! buffer back. [`Redirected`] puts the original stream back when dropped.

use jbridge_shared::errors::BridgeResult;

/// A runtime error stream that can be swapped for an in-memory buffer.
pub trait DiagnosticStream {
    /// Whatever is needed to put the original stream back.
    type Saved;

    /// Point the stream at a fresh buffer, returning the original.
    fn redirect(&mut self) -> BridgeResult<Self::Saved>;

    /// Everything written to the buffer so far.
    fn contents(&mut self) -> BridgeResult<String>;

    /// Reinstall the original stream. Must not fail.
    fn restore(&mut self, saved: Self::Saved);
}

/// A live redirection. Dropping it restores the original stream.
pub struct Redirected<'a, S: DiagnosticStream> {
    stream: &'a mut S,
    saved: Option<S::Saved>,
}

impl<'a, S: DiagnosticStream> Redirected<'a, S> {
    pub fn install(stream: &'a mut S) -> BridgeResult<Self> {
        let saved = stream.redirect()?;
        Ok(Self {
            stream,
            saved: Some(saved),
        })
    }

    pub fn stream(&mut self) -> &mut S {
        self.stream
    }

    pub fn contents(&mut self) -> BridgeResult<String> {
        self.stream.contents()
    }
}

impl<S: DiagnosticStream> Drop for Redirected<'_, S> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.stream.restore(saved);
        }
    }
}

/// Run `print` with `stream` redirected and return what it wrote.
pub fn capture_output<S, F>(stream: &mut S, print: F) -> BridgeResult<String>
where
    S: DiagnosticStream,
    F: FnOnce(&mut S) -> BridgeResult<()>,
{
    let mut redirected = Redirected::install(stream)?;
    print(redirected.stream())?;
    redirected.contents()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jbridge_shared::errors::BridgeError;

    /// `current` is the installed stream; "stderr" is the original.
    struct FakeStderr {
        current: String,
        buffer: String,
        fail_redirect: bool,
    }

    impl FakeStderr {
        fn new() -> Self {
            Self {
                current: "stderr".into(),
                buffer: String::new(),
                fail_redirect: false,
            }
        }

        fn write(&mut self, text: &str) {
            if self.current == "buffer" {
                self.buffer.push_str(text);
            }
        }
    }

    impl DiagnosticStream for FakeStderr {
        type Saved = String;

        fn redirect(&mut self) -> BridgeResult<String> {
            if self.fail_redirect {
                return Err(BridgeError::Python("no io module".into()));
            }
            self.buffer.clear();
            Ok(std::mem::replace(&mut self.current, "buffer".into()))
        }

        fn contents(&mut self) -> BridgeResult<String> {
            Ok(self.buffer.clone())
        }

        fn restore(&mut self, saved: String) {
            self.current = saved;
        }
    }

    #[test]
    fn test_capture_output_restores_stream() {
        let mut stream = FakeStderr::new();

        let out = capture_output(&mut stream, |s| {
            s.write("Traceback (most recent call last):\n");
            Ok(())
        })
        .unwrap();

        assert_eq!(out, "Traceback (most recent call last):\n");
        assert_eq!(stream.current, "stderr");
    }

    #[test]
    fn test_stream_restored_when_print_fails() {
        let mut stream = FakeStderr::new();

        let result = capture_output(&mut stream, |s| {
            s.write("partial");
            Err(BridgeError::Python("print failed".into()))
        });

        assert!(result.is_err());
        assert_eq!(stream.current, "stderr");
    }

    #[test]
    fn test_failed_redirect_leaves_stream_alone() {
        let mut stream = FakeStderr {
            fail_redirect: true,
            ..FakeStderr::new()
        };

        assert!(capture_output(&mut stream, |_| Ok(())).is_err());
        assert_eq!(stream.current, "stderr");
    }
}
