//! Argument parsing utilities and common argument types.

mod parsers;

pub use parsers::*;

use std::path::PathBuf;

use clap::{Args, ValueHint};
use templar_common_config::{ConfigLoader, TemplarConfig};

use crate::error::CliError;

/// Arguments every command that renders a template takes.
#[derive(Debug, Clone, Args)]
pub struct TemplateArgs {
    /// Run profile from the config file
    #[arg(value_name = "RUN_CONFIG", help = "Run configuration to use (default: \"default\")")]
    pub run_config: Option<String>,

    /// Template directory
    #[arg(
        short = 't',
        long,
        default_value = ".",
        value_hint = ValueHint::DirPath,
        help = "Template directory"
    )]
    pub template: PathBuf,

    /// Config file
    #[arg(
        short = 'c',
        long,
        env = "TEMPLAR_CONFIG",
        value_hint = ValueHint::FilePath,
        help = "Config file (default: templar.yaml in the current directory)"
    )]
    pub config: Option<PathBuf>,

    /// Never prompt for template data
    #[arg(short = 'n', long, help = "Never prompt for template data")]
    pub no_input: bool,

    /// Save rendered data back to the config file
    #[arg(short = 's', long, help = "Save rendered data to the config file")]
    pub save: bool,
}

impl TemplateArgs {
    /// Load the config file, or an empty config bound to where it would be.
    pub fn load_config(&self) -> Result<TemplarConfig, CliError> {
        Ok(ConfigLoader::new(self.config.as_deref()).load()?)
    }
}
