//! Greengrass provisioning library
//!
//! Core modules of the one-shot edge device provisioning service.

pub mod app;
pub mod detect;
pub mod errors;
pub mod filesys;
pub mod installer;
pub mod logs;
pub mod materialize;
pub mod network;
pub mod records;
pub mod status;
pub mod storage;
pub mod utils;
