//! JVM creation, configuration and the per-process environment.

pub mod backend;
pub mod constants;
mod env;
mod lifecycle;
mod option_list;
mod options;

pub use env::{RuntimeHandle, VmEnv};
pub use lifecycle::RuntimeLifecycle;
pub use option_list::OptionList;
pub use options::VmOptions;
