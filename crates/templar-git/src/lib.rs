//! Git integration for Templar.
//!
//! Safe wrappers around the git2 library covering what the sync engines
//! need: commits, branches, history ranges, in-memory cherry-picks, patch
//! text between commits and a scoped temporary branch.

#![warn(missing_docs)]

pub mod branch;
pub mod cherry_pick;
pub mod commit;
pub mod diff;
pub mod error;
pub mod history;
pub mod oid;
pub mod repository;
pub mod temp_branch;

pub use commit::{GitCommit, GitSignature};
pub use diff::{DiffOptions, DiffStats};
pub use error::{GitError, GitResult};
pub use oid::{GitOid, GitOidError};
pub use repository::GitRepository;
pub use temp_branch::TemporaryBranch;

// Re-export git2 for advanced usage
pub use git2;
