//! Workspace storage layout

pub mod layout;
