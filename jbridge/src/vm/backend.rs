//! In-process JVM creation through the JNI invocation API.

use jbridge_shared::errors::{BridgeError, BridgeResult};
use jni::{InitArgsBuilder, JNIVersion, JavaVM};

use super::JniVm;
use crate::runtime::OptionList;
use crate::runtime::backend::VmBackend;

/// Creates the JVM with `JNI_CreateJavaVM`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JniBackend;

impl VmBackend for JniBackend {
    type Vm = JniVm;

    fn create(&self, options: &OptionList) -> BridgeResult<JniVm> {
        let args = options
            .iter()
            .fold(
                InitArgsBuilder::new()
                    .version(JNIVersion::V8)
                    .ignore_unrecognized(false),
                |builder, option| builder.option(option),
            )
            .build()
            .map_err(|e| BridgeError::Creation(e.to_string()))?;

        let vm = JavaVM::new(args).map_err(|e| BridgeError::Creation(e.to_string()))?;
        Ok(JniVm::new(vm))
    }
}
