//! Provisioning pipeline
//!
//! Composite actions expand into ordered external-command steps, executed
//! in sequence on a background task with progress forwarded to the caller.

pub mod action;
pub mod fsm;
pub mod plan;
pub mod task;
