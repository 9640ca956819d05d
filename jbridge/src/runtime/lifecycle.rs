//! Creation and publication of the process JVM.
//!
//! A process has at most one JVM. [`RuntimeLifecycle`] creates it on the first
//! successful [`create_or_attach`](RuntimeLifecycle::create_or_attach) (or
//! takes one created elsewhere through [`adopt`](RuntimeLifecycle::adopt)) and
//! hands out the same [`RuntimeHandle`] from then on. Later calls can only
//! extend the classpath.

use std::sync::Arc;

use jbridge_shared::errors::{BridgeError, BridgeResult};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use super::backend::VmBackend;
use super::env::{RuntimeHandle, VmEnv};
use super::options::VmOptions;

const ALREADY_RUNNING: &str = "JVM is already running, options are ineffective";

pub struct RuntimeLifecycle<B: VmBackend> {
    backend: B,
    handle: OnceCell<RuntimeHandle<B::Vm>>,
    /// Serializes creation; holds classpath added before the JVM exists.
    pending_classpath: Mutex<Vec<String>>,
}

impl<B: VmBackend> RuntimeLifecycle<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            handle: OnceCell::new(),
            pending_classpath: Mutex::new(Vec::new()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Create the JVM, or configure the one that already exists.
    ///
    /// With no JVM the option list is built and handed to the backend; the
    /// list is freed as soon as the backend returns. A failed creation leaves
    /// no JVM behind, so the call can be retried.
    ///
    /// With a JVM present, instance-only options are rejected with a
    /// configuration error and the caller's classpath, or the base classpath
    /// when the caller gave none, is appended to the running instance.
    pub fn create_or_attach(&self, options: &VmOptions) -> BridgeResult<RuntimeHandle<B::Vm>> {
        if let Some(handle) = self.handle.get() {
            return Self::configure_existing(handle, options);
        }

        let mut pending = self.pending_classpath.lock();
        if let Some(handle) = self.handle.get() {
            drop(pending);
            return Self::configure_existing(handle, options);
        }

        let created = {
            let list = options.to_option_list(&pending)?;
            tracing::info!(options = list.len(), "Creating JVM");
            self.backend.create(&list)
        };

        let vm = created.inspect_err(|e| {
            tracing::error!(error = %e, "JVM creation failed");
        })?;

        pending.clear();
        let handle = self.publish(vm)?;
        // Creating the JVM attaches the creating thread.
        handle.threads().register_current(handle.vm());
        tracing::info!("JVM created");
        Ok(handle)
    }

    /// The published handle, if any. Never blocks and never creates.
    pub fn attached_handle(&self) -> Option<RuntimeHandle<B::Vm>> {
        self.handle.get().cloned()
    }

    /// Publish a JVM created outside this lifecycle.
    ///
    /// Classpath recorded before the JVM existed is appended to it.
    pub fn adopt(&self, vm: B::Vm) -> BridgeResult<RuntimeHandle<B::Vm>> {
        let mut pending = self.pending_classpath.lock();
        if self.handle.get().is_some() {
            return Err(BridgeError::Internal(
                "a JVM is already published for this process".into(),
            ));
        }

        let handle = self.publish(vm)?;
        // The adopting thread is running inside the JVM already.
        handle.threads().register_current(handle.vm());
        for paths in pending.drain(..) {
            handle.add_classpath(&paths)?;
        }

        tracing::info!("Adopted running JVM");
        Ok(handle)
    }

    /// Extend the classpath of the running JVM, or of the one to be created.
    pub fn add_classpath(&self, paths: &str) -> BridgeResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        if let Some(handle) = self.handle.get() {
            return handle.add_classpath(paths);
        }

        let mut pending = self.pending_classpath.lock();
        match self.handle.get() {
            Some(handle) => {
                drop(pending);
                handle.add_classpath(paths)
            }
            None => {
                tracing::debug!(paths, "Recorded classpath for JVM creation");
                pending.push(paths.to_string());
                Ok(())
            }
        }
    }

    /// Caller must hold `pending_classpath`.
    fn publish(&self, vm: B::Vm) -> BridgeResult<RuntimeHandle<B::Vm>> {
        let handle = Arc::new(VmEnv::new(vm));
        self.handle
            .set(handle.clone())
            .map_err(|_| BridgeError::Internal("JVM handle published twice".into()))?;
        Ok(handle)
    }

    fn configure_existing(
        handle: &RuntimeHandle<B::Vm>,
        options: &VmOptions,
    ) -> BridgeResult<RuntimeHandle<B::Vm>> {
        if options.has_instance_only_options() {
            tracing::warn!(?options, "Instance-only options passed to running JVM");
            return Err(BridgeError::Config(ALREADY_RUNNING.into()));
        }
        let classpath = options
            .classpath
            .as_deref()
            .or(options.base_classpath.as_deref());
        if let Some(classpath) = classpath {
            handle.add_classpath(classpath)?;
        }
        Ok(handle.clone())
    }
}
