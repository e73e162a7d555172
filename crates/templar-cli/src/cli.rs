//! CLI argument definitions using clap derive macros.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use templar_common_log::{LogConfig, LogFormat, LogLevel};

use crate::commands::{PublishCommand, ServeCommand};
use crate::error::CliError;

/// Templar - develop templates against a live output project
///
/// Renders a template into an output project, re-renders it whenever the
/// template changes, and can replay commits made in the output back onto
/// the template.
#[derive(Debug, Parser)]
#[command(
    name = "templar",
    author,
    version,
    about,
    long_about = None,
    propagate_version = true,
    arg_required_else_help = true,
    help_template = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
"
)]
pub struct Cli {
    /// Increase verbosity level (-v, -vv, -vvv)
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        global = true,
        help = "Increase verbosity level"
    )]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(
        short,
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Suppress non-error output"
    )]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        global = true,
        value_enum,
        env = "TEMPLAR_LOG_FORMAT",
        help = "Log format (pretty, compact, json)"
    )]
    pub log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

/// Available subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Render a template and keep the output in sync until Ctrl-C
    Serve(ServeCommand),

    /// Render a template once into a lasting output project
    Publish(PublishCommand),
}

impl Cli {
    /// Logging setup: environment first, then command-line flags.
    pub fn log_config(&self) -> LogConfig {
        let mut config = LogConfig::from_env();
        if self.verbose > 0 || self.quiet {
            config.level = LogLevel::from_verbosity(self.verbose, self.quiet);
        }
        if let Some(format) = self.log_format {
            config.format = format.into();
        }
        config
    }

    /// Execute the selected command
    pub async fn execute(self) -> Result<(), CliError> {
        match self.command {
            Command::Serve(cmd) => cmd.execute().await,
            Command::Publish(cmd) => cmd.execute().await,
        }
    }
}
