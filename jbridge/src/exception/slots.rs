//! Per-thread [`ExceptionBridge`] storage.
//!
//! The Java side reports a Python failure in two steps: the failing native
//! call captures the error and throws, and later `PythonException.getErrorInfo`
//! on the same thread asks for the captured fields. The capture lives here in
//! between.

use std::collections::HashMap;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use super::ExceptionBridge;

#[derive(Debug, Default)]
pub struct CaptureSlots {
    slots: Mutex<HashMap<ThreadId, ExceptionBridge>>,
}

impl CaptureSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` on the calling thread's bridge.
    ///
    /// The bridge is taken out of the map while `f` runs, so `f` may call back
    /// into the runtimes (and into these slots) freely. Only a bridge still
    /// holding a capture is stored; a propagated one is done with.
    pub fn with_current<R>(&self, f: impl FnOnce(&mut ExceptionBridge) -> R) -> R {
        let id = thread::current().id();
        let mut bridge = self.slots.lock().remove(&id).unwrap_or_default();

        let result = f(&mut bridge);

        if bridge.captured().is_some() {
            self.slots.lock().insert(id, bridge);
        }
        result
    }

    /// Whether the calling thread has a capture that has not been cleared.
    pub fn has_current(&self) -> bool {
        self.slots.lock().contains_key(&thread::current().id())
    }

    /// Number of threads with a stored bridge.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
