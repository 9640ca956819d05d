//! In-memory JVM used by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

use jbridge::runtime::OptionList;
use jbridge::runtime::backend::{NativeVm, ObjectHost, VmBackend, VmThreads};
use jbridge::{BridgeError, BridgeResult};
use parking_lot::Mutex;

/// A Java object as the fake JVM hands it out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FakeObject {
    pub id: u32,
    pub class: &'static str,
    pub hash: i32,
}

impl FakeObject {
    pub fn new(id: u32, class: &'static str) -> Self {
        Self {
            id,
            class,
            hash: id as i32 * 31,
        }
    }

    /// Same hash as `other`, different identity.
    pub fn colliding_with(id: u32, class: &'static str, other: &FakeObject) -> Self {
        Self {
            id,
            class,
            hash: other.hash,
        }
    }
}

pub struct FakeVm {
    creator: ThreadId,
    next_env: AtomicU64,
    pub live_globals: AtomicUsize,
    pub attaches: AtomicUsize,
    pub detaches: AtomicUsize,
    pub classpath: Mutex<Vec<String>>,
    pub options: Vec<String>,
}

impl FakeVm {
    pub fn new(options: Vec<String>) -> Self {
        let initial = options
            .iter()
            .find_map(|opt| opt.strip_prefix("-Djava.class.path="))
            .map(str::to_owned);
        Self {
            creator: thread::current().id(),
            next_env: AtomicU64::new(1),
            live_globals: AtomicUsize::new(0),
            attaches: AtomicUsize::new(0),
            detaches: AtomicUsize::new(0),
            classpath: Mutex::new(initial.into_iter().collect()),
            options,
        }
    }

    pub fn live_globals(&self) -> usize {
        self.live_globals.load(Ordering::SeqCst)
    }
}

impl VmThreads for FakeVm {
    type Env = u64;

    fn attach_current_thread(&self, _name: Option<&str>, _as_daemon: bool) -> Result<u64, i32> {
        self.attaches.fetch_add(1, Ordering::SeqCst);
        Ok(self.next_env.fetch_add(1, Ordering::SeqCst))
    }

    fn detach_current_thread(&self) -> i32 {
        self.detaches.fetch_add(1, Ordering::SeqCst);
        0
    }

    fn current_thread_env(&self) -> Option<u64> {
        (thread::current().id() == self.creator).then_some(0)
    }
}

impl ObjectHost for FakeVm {
    type Local = FakeObject;
    type Global = FakeObject;

    fn identity_hash(&self, obj: &FakeObject) -> BridgeResult<i32> {
        Ok(obj.hash)
    }

    fn promote(&self, obj: &FakeObject) -> BridgeResult<FakeObject> {
        self.live_globals.fetch_add(1, Ordering::SeqCst);
        Ok(obj.clone())
    }

    fn is_same_object(&self, obj: &FakeObject, global: &FakeObject) -> BridgeResult<bool> {
        Ok(obj.id == global.id)
    }

    fn release_global(&self, _global: FakeObject) {
        self.live_globals.fetch_sub(1, Ordering::SeqCst);
    }

    fn kind_name(&self, global: &FakeObject) -> BridgeResult<String> {
        Ok(global.class.to_string())
    }

    fn describe(&self, global: &FakeObject) -> BridgeResult<String> {
        Ok(format!("{}@{:x}", global.class, global.hash))
    }
}

impl NativeVm for FakeVm {
    fn append_classpath(&self, paths: &str) -> BridgeResult<()> {
        self.classpath.lock().push(paths.to_string());
        Ok(())
    }

    fn classpath(&self) -> BridgeResult<Option<String>> {
        let parts = self.classpath.lock();
        Ok((!parts.is_empty()).then(|| parts.join(":")))
    }

    fn jni_version(&self) -> BridgeResult<i32> {
        Ok(0x0001_0008)
    }

    fn java_version(&self) -> BridgeResult<String> {
        Ok("17.0.9".into())
    }
}

/// Records every creation attempt.
#[derive(Default)]
pub struct FakeBackend {
    pub attempts: AtomicUsize,
    pub fail_next: AtomicBool,
    pub seen_options: Mutex<Vec<Vec<String>>>,
}

impl FakeBackend {
    pub fn failing_once() -> Self {
        Self {
            fail_next: AtomicBool::new(true),
            ..Default::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl VmBackend for FakeBackend {
    type Vm = FakeVm;

    fn create(&self, options: &OptionList) -> BridgeResult<FakeVm> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let options: Vec<String> = options.iter().map(str::to_owned).collect();
        self.seen_options.lock().push(options.clone());

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(BridgeError::Creation("JNI_CreateJavaVM returned -1".into()));
        }
        Ok(FakeVm::new(options))
    }
}
