//! Business logic services

pub mod maintenance;
pub mod orchestrator;
pub mod runner;
pub mod scheduler;
pub mod status_reporter;
