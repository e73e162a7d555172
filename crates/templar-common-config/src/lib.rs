//! Configuration types for Templar.
//!
//! This crate provides the types stored in `templar.yaml`: data profiles,
//! global commands and run profiles, plus loading, saving and `extends`
//! resolution.

pub mod loader;
pub mod resolve;
pub mod types;

pub use loader::*;
pub use types::*;
