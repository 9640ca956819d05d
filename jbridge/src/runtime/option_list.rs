//! Bounded list of JVM creation options.

use jbridge_shared::errors::{BridgeError, BridgeResult};

use super::constants::vm_options::MAX_OPTIONS;

/// Options handed to the JVM at creation.
///
/// The buffers are owned by the list and freed when it is dropped, so a list
/// that fails to build or is only borrowed for the creation call never
/// outlives that call.
#[derive(Debug, Default)]
pub struct OptionList {
    options: Vec<String>,
}

impl OptionList {
    pub fn new() -> Self {
        Self {
            options: Vec::with_capacity(MAX_OPTIONS),
        }
    }

    /// Append one option.
    ///
    /// Fails once the list holds [`MAX_OPTIONS`] entries, or if the option
    /// contains a NUL byte.
    pub fn push(&mut self, option: String) -> BridgeResult<()> {
        if self.options.len() >= MAX_OPTIONS {
            return Err(BridgeError::Config(format!(
                "Too many options (> {})",
                MAX_OPTIONS
            )));
        }
        if option.contains('\0') {
            return Err(BridgeError::Config(format!(
                "JVM option contains a NUL byte: {:?}",
                option
            )));
        }

        self.options.push(option);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.options.iter().map(String::as_str)
    }
}
