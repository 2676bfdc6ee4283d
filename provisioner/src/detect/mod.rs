//! Detection of existing installations

pub mod checker;
