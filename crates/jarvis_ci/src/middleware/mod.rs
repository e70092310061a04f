//! Request verification

pub mod signature;
