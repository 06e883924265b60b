//! CLI command implementations

pub mod azcli;
pub mod run;
pub mod spn;
