//! CLI error handling.

use std::io;
use std::process::ExitCode;

use templar_common_config::ConfigError;
use templar_sync::SyncError;
use thiserror::Error;

/// Application exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Exit {
    /// Finished normally.
    Success = 0,
    /// Anything not covered below.
    GeneralError = 1,
    /// Bad configuration or a reference to something that does not exist.
    ConfigError = 2,
    /// Filesystem failure.
    IoError = 3,
    /// Bad command-line input.
    ValidationError = 5,
    /// The output needs a human before it can be updated.
    Conflict = 6,
    /// Stopped by Ctrl-C.
    Interrupted = 130,
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        ExitCode::from(exit as u8)
    }
}

/// CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// The configuration file could not be used.
    #[error("{message}")]
    Config {
        message: String,
        #[source]
        source: ConfigError,
        hint: Option<String>,
    },

    /// Invalid arguments.
    #[error("{message}")]
    Validation { message: String, hint: Option<String> },

    /// A sync engine failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Filesystem failure outside the engines.
    #[error("{message}")]
    Io {
        message: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// Exit code for this error.
    pub fn exit(&self) -> Exit {
        match self {
            Self::Config { .. } => Exit::ConfigError,
            Self::Validation { .. } => Exit::ValidationError,
            Self::Sync(err) if err.is_user_input() => Exit::ConfigError,
            Self::Sync(err) if err.is_conflict() => Exit::Conflict,
            Self::Sync(_) | Self::Other(_) => Exit::GeneralError,
            Self::Io { .. } => Exit::IoError,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> ExitCode {
        self.exit().into()
    }

    /// Suggested fix, if there is an obvious one.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Config { hint, .. } | Self::Validation { hint, .. } => hint.as_deref(),
            Self::Sync(SyncError::NoSuchRunConfig(_)) => Some("Check run_configs in templar.yaml"),
            Self::Sync(SyncError::NoSuchData(_)) => Some("Check data in templar.yaml"),
            Self::Sync(SyncError::NoSuchCommand(_)) => Some("Check commands in templar.yaml"),
            _ => None,
        }
    }

    /// Create a validation error with hint.
    pub fn validation(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }

    /// Create an IO error.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoSuchRunConfig(_)
            | ConfigError::NoSuchData(_)
            | ConfigError::NoSuchCommand(_)
            | ConfigError::ExtendsCycle { .. } => Self::Sync(err.into()),
            other => Self::Config {
                message: format!("Configuration error: {other}"),
                source: other,
                hint: Some("Check your templar.yaml".to_string()),
            },
        }
    }
}
