//! Device configuration handling

pub mod device;
pub mod tree;
