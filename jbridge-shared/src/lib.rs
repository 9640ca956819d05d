//! Shared types for the jbridge Java/Python bridge.

pub mod constants;
pub mod errors;
