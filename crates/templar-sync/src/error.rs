//! Error types for the sync engines.

use crate::render::RenderError;
use std::path::PathBuf;
use templar_common_config::ConfigError;
use templar_common_thread::ThreadError;
use templar_git::GitError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised by forward-sync, back-sync and the pieces they share.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A run profile that does not exist was requested.
    #[error("no run configuration named '{0}'")]
    NoSuchRunConfig(String),

    /// A data profile that does not exist was referenced.
    #[error("no data configuration named '{0}'")]
    NoSuchData(String),

    /// A hook referenced an unknown global command.
    #[error("no global command with id '{0}'")]
    NoSuchCommand(String),

    /// `extends` references loop back on themselves.
    #[error("extends cycle in configuration: {chain}")]
    ExtendsCycle {
        /// Profiles visited, e.g. `a -> b -> a`.
        chain: String,
    },

    /// Any other configuration problem.
    #[error(transparent)]
    Config(ConfigError),

    /// The output project has uncommitted manual changes and auto-commit is
    /// off.
    #[error(
        "project at {} has uncommitted changes; commit or stash them, or enable auto-commit",
        project.display()
    )]
    DirtyWorkTree {
        /// Project directory.
        project: PathBuf,
    },

    /// Template tracking does not declare exactly one template source.
    #[error("expected exactly one template source in {}, found {count}", project.display())]
    MultipleTemplateSources {
        /// Project directory.
        project: PathBuf,
        /// Number of sources found.
        count: usize,
    },

    /// Replaying an output commit into the template failed.
    #[error("failed to replay commit {commit}: {source}")]
    Replay {
        /// Short SHA of the original commit.
        commit: String,
        /// What went wrong.
        #[source]
        source: Box<SyncError>,
    },

    /// A file diff the applier cannot handle.
    #[error("unsupported diff: {description}")]
    UnsupportedDiff {
        /// The offending diff header.
        description: String,
    },

    /// Patch text that could not be parsed.
    #[error("malformed diff at line {line}: {message}")]
    DiffParse {
        /// 1-based line in the patch text.
        line: usize,
        /// What was wrong.
        message: String,
    },

    /// A hunk did not match the target file.
    #[error("failed to apply patch to {}: {reason}", path.display())]
    PatchFailed {
        /// File being patched.
        path: PathBuf,
        /// Why it failed.
        reason: String,
    },

    /// A hook command failed.
    #[error("command '{command}' failed: {reason}")]
    Hook {
        /// Display name of the command.
        command: String,
        /// Why it failed.
        reason: String,
    },

    /// The renderer failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Git error.
    #[error(transparent)]
    Git(#[from] GitError),

    /// Filesystem watcher error.
    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// A worker thread could not be spawned or joined.
    #[error(transparent)]
    Thread(#[from] ThreadError),

    /// IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for SyncError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoSuchRunConfig(name) => Self::NoSuchRunConfig(name),
            ConfigError::NoSuchData(name) => Self::NoSuchData(name),
            ConfigError::NoSuchCommand(id) => Self::NoSuchCommand(id),
            ConfigError::ExtendsCycle { chain } => Self::ExtendsCycle { chain },
            other => Self::Config(other),
        }
    }
}

impl SyncError {
    /// Bad configuration references. Reported once, never retried.
    pub fn is_user_input(&self) -> bool {
        matches!(
            self,
            Self::NoSuchRunConfig(_)
                | Self::NoSuchData(_)
                | Self::NoSuchCommand(_)
                | Self::ExtendsCycle { .. }
                | Self::Config(_)
                | Self::MultipleTemplateSources { .. }
        )
    }

    /// Conflicts a human (or auto-commit) can resolve.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::DirtyWorkTree { .. } => true,
            Self::Render(err) => matches!(err, RenderError::ConflictAborted),
            Self::Git(err) => err.is_conflict(),
            Self::Replay { source, .. } => source.is_conflict(),
            _ => false,
        }
    }

    pub(crate) fn replay(commit: &templar_git::GitOid, source: SyncError) -> Self {
        Self::Replay {
            commit: commit.short(),
            source: Box::new(source),
        }
    }
}
