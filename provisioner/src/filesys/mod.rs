//! Async filesystem wrappers

pub mod dir;
pub mod file;
