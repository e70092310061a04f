//! Jarvis CI
//!
//! A webhook-triggered CI runner: each push is cloned into a throwaway
//! workspace, its build targets are run with output streamed into an
//! in-memory cache, and the outcome of every target is reported back as a
//! commit status.

// Core modules
pub mod config;
pub mod models;

// Routes and middleware
pub mod middleware;
pub mod routes;

// Services
pub mod services;

// Storage
pub mod stores;

// Utilities
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use models::error::{GitError, JobError, RunnerError};
pub use models::types::{CommitState, JobReport, PushEvent, PushJob, TargetOutcome, TargetResult};
pub use services::orchestrator::Orchestrator;
pub use services::runner::Runner;
pub use stores::output::OutputStore;
