//! Git branch operations.

use crate::{GitError, GitOid, GitRepository, GitResult};
use git2::BranchType;

impl GitRepository {
    /// Short name of the checked-out branch, `None` when detached or unborn.
    pub fn current_branch(&self) -> GitResult<Option<String>> {
        self.with_repo(|repo| match repo.head() {
            Ok(head) if head.is_branch() => Ok(head.shorthand().map(String::from)),
            Ok(_) => Ok(None),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(None),
            Err(e) => Err(e.into()),
        })
    }

    /// Whether a local branch exists.
    pub fn branch_exists(&self, name: &str) -> GitResult<bool> {
        self.with_repo(|repo| Ok(repo.find_branch(name, BranchType::Local).is_ok()))
    }

    /// Tip commit of a local branch, `None` if the branch does not exist.
    pub fn branch_tip(&self, name: &str) -> GitResult<Option<GitOid>> {
        self.with_repo(|repo| match repo.find_branch(name, BranchType::Local) {
            Ok(branch) => Ok(branch.get().target().map(GitOid::from_git2)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        })
    }

    /// Create a local branch pointing at `target`.
    pub fn create_branch(&self, name: &str, target: &GitOid) -> GitResult<()> {
        self.with_repo(|repo| {
            let commit = repo
                .find_commit(target.as_git2())
                .map_err(|_| GitError::CommitNotFound { oid: target.to_hex() })?;
            repo.branch(name, &commit, false)?;
            Ok(())
        })
    }

    /// Delete a local branch, merged or not.
    pub fn delete_branch(&self, name: &str) -> GitResult<()> {
        self.with_repo(|repo| {
            let mut branch = repo
                .find_branch(name, BranchType::Local)
                .map_err(|_| GitError::BranchNotFound { name: name.to_string() })?;

            if branch.is_head() {
                return Err(GitError::InvalidOperation {
                    message: "Cannot delete the current branch".to_string(),
                });
            }

            branch.delete()?;
            Ok(())
        })
    }
}
