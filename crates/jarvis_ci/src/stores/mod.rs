//! Storage implementations

pub mod output;
