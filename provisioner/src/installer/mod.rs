//! Runtime activation

pub mod activator;
pub mod dry_run;
pub mod nucleus;
