//! Network reachability

pub mod probe;
