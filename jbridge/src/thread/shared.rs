//! Lending one library's execution lock to another library in the process.
//!
//! Each native library built on this crate carries its own statics. The
//! library that owns the handle table publishes a [`LockExport`], a plain C
//! table, and the other library runs its critical sections through it instead
//! of keeping a second lock.

use std::ffi::c_void;

use jbridge_shared::constants::status;
use jbridge_shared::errors::{BridgeError, BridgeResult};

/// Callback run while the owner's lock is held.
pub type LockedCallback = unsafe extern "C" fn(data: *mut c_void);

/// Entry points of an execution lock owned by another library.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct LockExport {
    /// Run `callback(data)` with the owner's execution lock held. Returns
    /// [`status::JNI_OK`] once the callback has run, or a negative status
    /// when the lock cannot be taken, in which case the callback never runs.
    pub with_lock: unsafe extern "C" fn(callback: LockedCallback, data: *mut c_void) -> i32,
}

struct Frame<F, R> {
    call: Option<F>,
    result: Option<R>,
}

unsafe extern "C" fn trampoline<F, R>(data: *mut c_void)
where
    F: FnOnce() -> R,
{
    // SAFETY: `data` is the `Frame<F, R>` that `LockExport::run` keeps on its
    // stack for the duration of the `with_lock` call.
    let frame = unsafe { &mut *data.cast::<Frame<F, R>>() };
    if let Some(call) = frame.call.take() {
        frame.result = Some(call());
    }
}

impl LockExport {
    /// Address to hand to the borrowing library.
    pub fn address(&'static self) -> usize {
        self as *const Self as usize
    }

    /// Recover an export from [`address`](Self::address). Null gives `None`.
    ///
    /// # Safety
    ///
    /// `address` must be zero or come from [`address`](Self::address) on an
    /// export that lives until the process exits.
    pub unsafe fn from_address(address: usize) -> Option<&'static Self> {
        // SAFETY: guaranteed by the caller.
        unsafe { (address as *const Self).as_ref() }
    }

    /// Run `f` while the owner's lock is held.
    pub fn run<F, R>(&self, f: F) -> BridgeResult<R>
    where
        F: FnOnce() -> R,
    {
        let mut frame = Frame {
            call: Some(f),
            result: None,
        };
        let data = (&mut frame as *mut Frame<F, R>).cast::<c_void>();

        // SAFETY: the trampoline matches the frame's types and the frame
        // outlives the call.
        let code = unsafe { (self.with_lock)(trampoline::<F, R>, data) };
        if code != status::JNI_OK {
            return Err(BridgeError::Thread(format!(
                "shared execution lock unavailable (status {code})"
            )));
        }
        frame
            .result
            .ok_or_else(|| BridgeError::Internal("shared execution lock skipped the call".into()))
    }
}
