//! Status reporting for external monitors

pub mod phase;
pub mod recorder;
