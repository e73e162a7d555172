//! Templar CLI
//!
//! Main entry point for the `templar` binary.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use templar_cli::cli::Cli;
use templar_cli::{CliError, Exit};

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = templar_common_log::init(cli.log_config()) {
        eprintln!("warning: logging disabled: {e}");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to create Tokio runtime: {e}");
            return Exit::GeneralError.into();
        }
    };

    match runtime.block_on(cli.execute()) {
        Ok(()) => Exit::Success.into(),
        Err(e) => report(&e),
    }
}

fn report(e: &CliError) -> ExitCode {
    error!("{e}");
    if let Some(hint) = e.hint() {
        eprintln!("hint: {hint}");
    }
    e.exit_code()
}
