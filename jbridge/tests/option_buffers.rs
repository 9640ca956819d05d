//! Option buffers must not outlive a creation attempt.
//!
//! This binary installs a counting global allocator, so it holds a single
//! test: a second test running in parallel would disturb the counts.

mod common;

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicIsize, Ordering};

use common::FakeBackend;
use jbridge::{RuntimeLifecycle, VmOptions};

struct CountingAlloc;

static LIVE_BYTES: AtomicIsize = AtomicIsize::new(0);

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        LIVE_BYTES.fetch_add(layout.size() as isize, Ordering::SeqCst);
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        LIVE_BYTES.fetch_sub(layout.size() as isize, Ordering::SeqCst);
        unsafe { System.dealloc(ptr, layout) }
    }
}

#[global_allocator]
static GLOBAL: CountingAlloc = CountingAlloc;

fn live_bytes() -> isize {
    LIVE_BYTES.load(Ordering::SeqCst)
}

fn attempt(lifecycle: &RuntimeLifecycle<FakeBackend>, options: &VmOptions) {
    let result = lifecycle.create_or_attach(options);
    assert!(result.is_err());
}

#[test]
fn failed_attempts_free_option_buffers() {
    let lifecycle = RuntimeLifecycle::new(FakeBackend::default());
    let vmargs = (0..40).map(|i| format!("-Dopt{i}=value")).collect::<Vec<_>>().join(",");
    let too_many = VmOptions::new()
        .with_classpath("/a:/b")
        .with_max_heap_size("512m")
        .with_extra_options(vmargs);

    // Warm up lazily initialized statics before measuring.
    attempt(&lifecycle, &too_many);

    let before = live_bytes();
    for _ in 0..10 {
        attempt(&lifecycle, &too_many);
    }
    assert_eq!(live_bytes(), before, "too-many-options path leaked");
    assert_eq!(lifecycle.backend().attempts(), 0);

    // A creation the backend refuses: the option list is freed too. The
    // backend keeps a copy of what it saw, so clear that before comparing.
    let refusing = RuntimeLifecycle::new(FakeBackend::default());
    let small = VmOptions::new().with_max_heap_size("64m");
    refusing.backend().fail_next.store(true, Ordering::SeqCst);
    attempt(&refusing, &small);
    refusing.backend().seen_options.lock().clear();
    refusing.backend().seen_options.lock().shrink_to_fit();

    let before = live_bytes();
    for _ in 0..10 {
        refusing.backend().fail_next.store(true, Ordering::SeqCst);
        attempt(&refusing, &small);
        let mut seen = refusing.backend().seen_options.lock();
        seen.clear();
        seen.shrink_to_fit();
    }
    assert_eq!(live_bytes(), before, "refused creation leaked");
    assert!(refusing.attached_handle().is_none());
}
