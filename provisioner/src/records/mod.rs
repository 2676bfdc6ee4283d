//! Device record lookup

pub mod record;
pub mod sqlite;
pub mod store;
