//! Utilities

pub mod metrics;
pub mod targets;
pub mod workspace;
