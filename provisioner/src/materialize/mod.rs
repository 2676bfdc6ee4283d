//! On-disk materialization of device records

pub mod generator;
