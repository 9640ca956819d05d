//! Reverse direction: the JVM reaching into Python.
//!
//! `PythonVM.instantiate(module, class)` resolves a class by name, calls it
//! and pulls the Java handle out of the instance. Each step fails with its
//! own [`EmbedFailure`] reason. Name resolution goes through
//! [`NameResolver`] so the steps can run against a fake interpreter.

use jbridge_shared::constants::EMBEDDED_HANDLE_ATTR;
use jbridge_shared::errors::{BridgeResult, EmbedFailure};
use once_cell::sync::OnceCell;

/// Dynamic lookup in the managed runtime.
pub trait NameResolver {
    type Object;
    type Error;

    fn import_module(&mut self, name: &str) -> Result<Self::Object, Self::Error>;

    fn get_attr(&mut self, obj: &Self::Object, name: &str) -> Result<Self::Object, Self::Error>;

    /// Call `callable` with no arguments.
    fn call0(&mut self, callable: &Self::Object) -> Result<Self::Object, Self::Error>;
}

/// A failed instantiation step and the runtime error behind it, if any.
#[derive(Debug)]
pub struct EmbedError<E> {
    pub failure: EmbedFailure,
    pub cause: Option<E>,
}

impl<E> EmbedError<E> {
    fn new(failure: EmbedFailure, cause: E) -> Self {
        Self {
            failure,
            cause: Some(cause),
        }
    }
}

/// Import `module`, instantiate `class` from it and extract its Java handle.
///
/// `extract` turns the instance's handle attribute into the caller's handle
/// type; a failure there counts as the instance not proxying a Java object.
pub fn instantiate<R, T, F>(
    resolver: &mut R,
    module: &str,
    class: &str,
    extract: F,
) -> Result<T, EmbedError<R::Error>>
where
    R: NameResolver,
    F: FnOnce(&mut R, R::Object) -> Result<T, R::Error>,
{
    let module_obj = resolver.import_module(module).map_err(|e| {
        tracing::warn!(module, "Import failed");
        EmbedError::new(EmbedFailure::ImportFailed, e)
    })?;

    let class_obj = resolver.get_attr(&module_obj, class).map_err(|e| {
        tracing::warn!(module, class, "Class not found");
        EmbedError::new(EmbedFailure::ClassNotFound, e)
    })?;

    let instance = resolver.call0(&class_obj).map_err(|e| {
        tracing::warn!(module, class, "Instantiation failed");
        EmbedError::new(EmbedFailure::InstantiationFailed, e)
    })?;

    let handle = resolver
        .get_attr(&instance, EMBEDDED_HANDLE_ATTR)
        .and_then(|attr| extract(resolver, attr))
        .map_err(|e| {
            tracing::warn!(module, class, "Instance does not proxy a Java object");
            EmbedError::new(EmbedFailure::NotAProxy, e)
        })?;

    tracing::debug!(module, class, "Instantiated Python object");
    Ok(handle)
}

/// Runs process bring-up exactly once.
#[derive(Debug, Default)]
pub struct InitOnce {
    done: OnceCell<()>,
}

impl InitOnce {
    pub const fn new() -> Self {
        Self {
            done: OnceCell::new(),
        }
    }

    /// Run `init` unless it already succeeded. Returns whether this call
    /// ran it. A failed `init` can be retried.
    pub fn run(&self, init: impl FnOnce() -> BridgeResult<()>) -> BridgeResult<bool> {
        let mut ran = false;
        self.done.get_or_try_init(|| {
            ran = true;
            init()
        })?;
        Ok(ran)
    }

    pub fn is_done(&self) -> bool {
        self.done.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jbridge_shared::errors::BridgeError;
    use std::collections::HashMap;

    #[derive(Clone, Debug, PartialEq)]
    enum Obj {
        Module(&'static str),
        Class(&'static str),
        Instance(&'static str),
        Handle(i64),
    }

    /// `mymod` has `Proxy` (with a handle), `Plain` (no handle) and
    /// `Broken` (constructor raises).
    struct FakePython {
        modules: HashMap<&'static str, Vec<&'static str>>,
    }

    impl FakePython {
        fn new() -> Self {
            Self {
                modules: HashMap::from([("mymod", vec!["Proxy", "Plain", "Broken"])]),
            }
        }
    }

    impl NameResolver for FakePython {
        type Object = Obj;
        type Error = String;

        fn import_module(&mut self, name: &str) -> Result<Obj, String> {
            self.modules
                .get_key_value(name)
                .map(|(k, _)| Obj::Module(*k))
                .ok_or_else(|| format!("ModuleNotFoundError: {name}"))
        }

        fn get_attr(&mut self, obj: &Obj, name: &str) -> Result<Obj, String> {
            match obj {
                Obj::Module(m) => self.modules[m]
                    .iter()
                    .find(|c| **c == name)
                    .map(|c| Obj::Class(*c))
                    .ok_or_else(|| format!("AttributeError: {name}")),
                Obj::Instance("Proxy") if name == EMBEDDED_HANDLE_ATTR => Ok(Obj::Handle(0x7f00)),
                _ => Err(format!("AttributeError: {name}")),
            }
        }

        fn call0(&mut self, callable: &Obj) -> Result<Obj, String> {
            match callable {
                Obj::Class("Broken") => Err("TypeError: nope".into()),
                Obj::Class(c) => Ok(Obj::Instance(*c)),
                _ => Err("TypeError: not callable".into()),
            }
        }
    }

    fn to_handle(_: &mut FakePython, obj: Obj) -> Result<i64, String> {
        match obj {
            Obj::Handle(h) => Ok(h),
            other => Err(format!("not a handle: {other:?}")),
        }
    }

    #[test]
    fn test_instantiate_proxy() {
        let mut py = FakePython::new();
        assert_eq!(instantiate(&mut py, "mymod", "Proxy", to_handle).unwrap(), 0x7f00);
    }

    #[test]
    fn test_failure_reasons() {
        let cases = [
            ("nomod", "Proxy", EmbedFailure::ImportFailed),
            ("mymod", "Missing", EmbedFailure::ClassNotFound),
            ("mymod", "Broken", EmbedFailure::InstantiationFailed),
            ("mymod", "Plain", EmbedFailure::NotAProxy),
        ];

        for (module, class, expected) in cases {
            let mut py = FakePython::new();
            let err = instantiate(&mut py, module, class, to_handle).unwrap_err();
            assert_eq!(err.failure, expected, "{module}.{class}");
            assert!(err.cause.is_some());
        }
    }

    #[test]
    fn test_init_once_runs_once() {
        let once = InitOnce::new();
        let mut calls = 0;

        assert!(once.run(|| {
            calls += 1;
            Ok(())
        })
        .unwrap());
        assert!(!once.run(|| {
            calls += 1;
            Ok(())
        })
        .unwrap());

        assert_eq!(calls, 1);
        assert!(once.is_done());
    }

    #[test]
    fn test_init_once_retries_after_failure() {
        let once = InitOnce::new();

        assert!(once.run(|| Err(BridgeError::Python("no encodings".into()))).is_err());
        assert!(!once.is_done());
        assert!(once.run(|| Ok(())).unwrap());
    }
}
