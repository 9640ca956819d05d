//! JNI implementation of the runtime traits.
//!
//! [`JniVm`] wraps a [`JavaVM`] and implements [`NativeVm`]. With the
//! `jvm-invocation` feature, [`JniBackend`] creates the JVM in-process.

#[cfg(feature = "jvm-invocation")]
mod backend;
mod error;

#[cfg(feature = "jvm-invocation")]
pub use backend::JniBackend;
pub use error::{JavaErrorSource, JavaStderr};

use std::ffi::{CString, c_char, c_void};
use std::ptr::{self, NonNull};

use jbridge_shared::constants::status;
use jbridge_shared::errors::{BridgeError, BridgeResult};
use jni::objects::{GlobalRef, JObject, JString, JValue};
use jni::sys::{self, jobject};
use jni::{JNIEnv, JavaVM};
use parking_lot::Mutex;

use crate::runtime::backend::{NativeVm, ObjectHost, VmThreads};
use crate::runtime::constants::{PATH_SEPARATOR, java};

/// Local reference slots reserved for one bridge call.
const LOCAL_FRAME_CAPACITY: i32 = 16;

/// Convert JNI results into bridge results.
pub trait JniResultExt<T> {
    fn bridged(self) -> BridgeResult<T>;
}

impl<T> JniResultExt<T> for jni::errors::Result<T> {
    fn bridged(self) -> BridgeResult<T> {
        self.map_err(|e| BridgeError::Jni(e.to_string()))
    }
}

/// The `JNIEnv*` of a thread attached through the bridge.
#[derive(Debug)]
pub struct AttachedEnv(NonNull<sys::JNIEnv>);

impl AttachedEnv {
    pub fn as_raw(&self) -> *mut sys::JNIEnv {
        self.0.as_ptr()
    }
}

// SAFETY: the pointer is stored in its thread's context and only handed back
// to that same thread.
unsafe impl Send for AttachedEnv {}

/// A running JVM.
pub struct JniVm {
    vm: JavaVM,
    /// Class loader over classpath appended after creation.
    loader: Mutex<Option<GlobalRef>>,
}

impl JniVm {
    pub fn new(vm: JavaVM) -> Self {
        Self {
            vm,
            loader: Mutex::new(None),
        }
    }

    pub fn java_vm(&self) -> &JavaVM {
        &self.vm
    }

    /// The calling thread's `JNIEnv`. Fails if the thread is not attached.
    pub fn env(&self) -> BridgeResult<JNIEnv<'_>> {
        self.vm
            .get_env()
            .map_err(|_| BridgeError::Thread("current thread is not attached to the JVM".into()))
    }

    /// Run `f` inside a fresh JNI local frame.
    ///
    /// Local references made by `f` are freed when it returns. A Java
    /// exception thrown inside `f` is left pending for the caller.
    pub fn in_frame<T>(&self, f: impl FnOnce(&mut JNIEnv<'_>) -> BridgeResult<T>) -> BridgeResult<T> {
        let mut env = self.env()?;
        env.push_local_frame(LOCAL_FRAME_CAPACITY).bridged()?;

        let result = f(&mut env);

        // SAFETY: pairs with the push above; nothing created in the frame
        // escapes except through global references.
        if let Err(e) = unsafe { env.pop_local_frame(&JObject::null()) } {
            tracing::warn!(error = %e, "Failed to pop JNI local frame");
        }
        result
    }

    /// Load `name` (`java/util/List` or `java.util.List`) and run `f` on the
    /// class reference, which is valid until `f` returns.
    pub fn with_class<R>(&self, name: &str, f: impl FnOnce(jobject) -> BridgeResult<R>) -> BridgeResult<R> {
        self.in_frame(|env| {
            let class = self.load_class(env, name)?;
            f(class.as_raw())
        })
    }

    fn load_class<'local>(&self, env: &mut JNIEnv<'local>, name: &str) -> BridgeResult<JObject<'local>> {
        let loader = self.loader.lock().clone();
        match loader {
            None => Ok(env.find_class(name.replace('.', "/")).bridged()?.into()),
            Some(loader) => {
                let binary_name = env.new_string(name.replace('/', ".")).bridged()?;
                env.call_static_method(
                    java::CLASS,
                    "forName",
                    "(Ljava/lang/String;ZLjava/lang/ClassLoader;)Ljava/lang/Class;",
                    &[
                        JValue::Object(&binary_name),
                        JValue::Bool(sys::JNI_TRUE),
                        JValue::Object(loader.as_obj()),
                    ],
                )
                .and_then(|v| v.l())
                .bridged()
            }
        }
    }
}

/// Read a Java string into Rust; `null` reads as `None`.
pub fn java_string(env: &mut JNIEnv<'_>, obj: JObject<'_>) -> BridgeResult<Option<String>> {
    if obj.is_null() {
        return Ok(None);
    }
    let jstr = JString::from(obj);
    let value: String = env.get_string(&jstr).bridged()?.into();
    Ok(Some(value))
}

/// `obj.toString()`, with `null` for a null result.
pub fn to_java_string(env: &mut JNIEnv<'_>, obj: &JObject<'_>) -> BridgeResult<String> {
    let text = env
        .call_method(obj, "toString", "()Ljava/lang/String;", &[])
        .and_then(|v| v.l())
        .bridged()?;
    Ok(java_string(env, text)?.unwrap_or_else(|| "null".to_string()))
}

/// `obj.getClass().getName()`.
pub fn class_name(env: &mut JNIEnv<'_>, obj: &JObject<'_>) -> BridgeResult<String> {
    let class = env.get_object_class(obj).bridged()?;
    let name = env
        .call_method(&class, "getName", "()Ljava/lang/String;", &[])
        .and_then(|v| v.l())
        .bridged()?;
    java_string(env, name)?.ok_or_else(|| BridgeError::Jni("Class.getName returned null".into()))
}

fn system_property(env: &mut JNIEnv<'_>, key: &str) -> BridgeResult<Option<String>> {
    let key = env.new_string(key).bridged()?;
    let value = env
        .call_static_method(
            java::SYSTEM,
            "getProperty",
            "(Ljava/lang/String;)Ljava/lang/String;",
            &[JValue::Object(&key)],
        )
        .and_then(|v| v.l())
        .bridged()?;
    java_string(env, value)
}

fn set_system_property(env: &mut JNIEnv<'_>, key: &str, value: &str) -> BridgeResult<()> {
    let key = env.new_string(key).bridged()?;
    let value = env.new_string(value).bridged()?;
    env.call_static_method(
        java::SYSTEM,
        "setProperty",
        "(Ljava/lang/String;Ljava/lang/String;)Ljava/lang/String;",
        &[JValue::Object(&key), JValue::Object(&value)],
    )
    .bridged()?;
    Ok(())
}

impl VmThreads for JniVm {
    type Env = AttachedEnv;

    fn attach_current_thread(&self, name: Option<&str>, as_daemon: bool) -> Result<AttachedEnv, i32> {
        let name = name
            .map(CString::new)
            .transpose()
            .map_err(|_| status::JNI_ERR)?;
        let raw_vm = self.vm.get_java_vm_pointer();
        let mut args = sys::JavaVMAttachArgs {
            version: sys::JNI_VERSION_1_8,
            name: name
                .as_ref()
                .map_or(ptr::null_mut(), |n| n.as_ptr() as *mut c_char),
            group: ptr::null_mut(),
        };
        let mut env: *mut c_void = ptr::null_mut();

        // SAFETY: raw_vm is the live JavaVM owned by self.vm; `args` and the
        // name buffer outlive the call.
        let code = unsafe {
            let interface = &**raw_vm;
            let attach = if as_daemon {
                interface.AttachCurrentThreadAsDaemon
            } else {
                interface.AttachCurrentThread
            };
            match attach {
                Some(attach) => attach(
                    raw_vm,
                    &mut env,
                    &mut args as *mut sys::JavaVMAttachArgs as *mut c_void,
                ),
                None => status::JNI_ERR,
            }
        };

        if code != status::JNI_OK {
            return Err(code);
        }
        NonNull::new(env as *mut sys::JNIEnv)
            .map(AttachedEnv)
            .ok_or(status::JNI_ERR)
    }

    fn detach_current_thread(&self) -> i32 {
        let raw_vm = self.vm.get_java_vm_pointer();
        // SAFETY: raw_vm is the live JavaVM owned by self.vm.
        unsafe {
            match (**raw_vm).DetachCurrentThread {
                Some(detach) => detach(raw_vm),
                None => status::JNI_ERR,
            }
        }
    }

    fn current_thread_env(&self) -> Option<AttachedEnv> {
        let env = self.vm.get_env().ok()?;
        NonNull::new(env.get_raw()).map(AttachedEnv)
    }
}

impl ObjectHost for JniVm {
    type Local = jobject;
    type Global = GlobalRef;

    fn identity_hash(&self, obj: &jobject) -> BridgeResult<i32> {
        let raw = *obj;
        self.in_frame(|env| {
            // SAFETY: the caller passes a reference that is live on this thread.
            let obj = unsafe { JObject::from_raw(raw) };
            env.call_static_method(
                java::SYSTEM,
                "identityHashCode",
                "(Ljava/lang/Object;)I",
                &[JValue::Object(&obj)],
            )
            .and_then(|v| v.i())
            .bridged()
        })
    }

    fn promote(&self, obj: &jobject) -> BridgeResult<GlobalRef> {
        let raw = *obj;
        let env = self.env()?;
        // SAFETY: as above.
        let obj = unsafe { JObject::from_raw(raw) };
        env.new_global_ref(&obj).bridged()
    }

    fn is_same_object(&self, obj: &jobject, global: &GlobalRef) -> BridgeResult<bool> {
        let raw = *obj;
        let env = self.env()?;
        // SAFETY: as above.
        let obj = unsafe { JObject::from_raw(raw) };
        env.is_same_object(&obj, global.as_obj()).bridged()
    }

    fn release_global(&self, global: GlobalRef) {
        drop(global);
    }

    fn kind_name(&self, global: &GlobalRef) -> BridgeResult<String> {
        self.in_frame(|env| class_name(env, global.as_obj()))
    }

    fn describe(&self, global: &GlobalRef) -> BridgeResult<String> {
        self.in_frame(|env| to_java_string(env, global.as_obj()))
    }
}

impl NativeVm for JniVm {
    /// Chains a `URLClassLoader` over `paths` onto the current loader and
    /// extends `java.class.path` to match.
    fn append_classpath(&self, paths: &str) -> BridgeResult<()> {
        let entries: Vec<&str> = paths.split(PATH_SEPARATOR).filter(|p| !p.is_empty()).collect();
        if entries.is_empty() {
            return Ok(());
        }

        let mut loader = self.loader.lock();
        self.in_frame(|env| {
            let urls = env
                .new_object_array(entries.len() as i32, "java/net/URL", JObject::null())
                .bridged()?;
            for (i, entry) in entries.iter().enumerate() {
                let path = env.new_string(entry).bridged()?;
                let file = env
                    .new_object("java/io/File", "(Ljava/lang/String;)V", &[JValue::Object(&path)])
                    .bridged()?;
                let uri = env
                    .call_method(&file, "toURI", "()Ljava/net/URI;", &[])
                    .and_then(|v| v.l())
                    .bridged()?;
                let url = env
                    .call_method(&uri, "toURL", "()Ljava/net/URL;", &[])
                    .and_then(|v| v.l())
                    .bridged()?;
                env.set_object_array_element(&urls, i as i32, url).bridged()?;
            }

            let parent = match loader.as_ref() {
                Some(current) => env.new_local_ref(current.as_obj()).bridged()?,
                None => env
                    .call_static_method(
                        "java/lang/ClassLoader",
                        "getSystemClassLoader",
                        "()Ljava/lang/ClassLoader;",
                        &[],
                    )
                    .and_then(|v| v.l())
                    .bridged()?,
            };
            let next = env
                .new_object(
                    "java/net/URLClassLoader",
                    "([Ljava/net/URL;Ljava/lang/ClassLoader;)V",
                    &[JValue::Object(&urls), JValue::Object(&parent)],
                )
                .bridged()?;
            let next = env.new_global_ref(&next).bridged()?;

            let classpath = match system_property(env, java::CLASSPATH_PROPERTY)? {
                Some(current) if !current.is_empty() => format!("{current}{PATH_SEPARATOR}{paths}"),
                _ => paths.to_string(),
            };
            set_system_property(env, java::CLASSPATH_PROPERTY, &classpath)?;

            *loader = Some(next);
            Ok(())
        })
    }

    fn classpath(&self) -> BridgeResult<Option<String>> {
        self.in_frame(|env| system_property(env, java::CLASSPATH_PROPERTY))
    }

    fn jni_version(&self) -> BridgeResult<i32> {
        let env = self.env()?;
        Ok(env.get_version().bridged()?.into())
    }

    fn java_version(&self) -> BridgeResult<String> {
        self.in_frame(|env| system_property(env, java::VERSION_PROPERTY))
            .map(Option::unwrap_or_default)
    }
}
