//! Templar CLI library.
//!
//! Argument definitions and command implementations behind the `templar`
//! binary.

pub mod args;
pub mod cli;
pub mod commands;
pub mod error;

pub use error::{CliError, Exit};
