//! Git error types.

use thiserror::Error;

/// Git operation error.
#[derive(Debug, Error)]
pub enum GitError {
    /// Not a git repository.
    #[error("not a git repository: {path}")]
    NotARepo { path: String },

    /// Reference not found.
    #[error("reference not found: {name}")]
    RefNotFound { name: String },

    /// Branch not found.
    #[error("branch not found: {name}")]
    BranchNotFound { name: String },

    /// Commit not found.
    #[error("commit not found: {oid}")]
    CommitNotFound { oid: String },

    /// Replaying a commit produced conflicts.
    #[error("cherry-pick of {commit} conflicts in {files:?}")]
    CherryPickConflict { commit: String, files: Vec<String> },

    /// Repository has no working directory.
    #[error("repository at {path} is bare")]
    Bare { path: String },

    /// Invalid operation.
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },

    /// Git2 library error.
    #[error("git error: {0}")]
    Git2(#[from] git2::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Git operations.
pub type GitResult<T> = Result<T, GitError>;

impl GitError {
    /// Check if this is a conflict error.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::CherryPickConflict { .. } => true,
            Self::Git2(e) => e.code() == git2::ErrorCode::Conflict,
            _ => false,
        }
    }

    /// Check if this means something named was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::RefNotFound { .. } | Self::BranchNotFound { .. } | Self::CommitNotFound { .. } => true,
            Self::Git2(e) => e.code() == git2::ErrorCode::NotFound,
            _ => false,
        }
    }
}
