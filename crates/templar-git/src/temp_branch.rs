//! Scoped temporary branch.

use crate::{GitOid, GitRepository, GitResult};
use tracing::{debug, warn};

/// A local branch that exists for the lifetime of this value. It is never
/// checked out, and it is deleted on drop whatever happened in between.
#[derive(Debug)]
pub struct TemporaryBranch {
    repo: GitRepository,
    name: String,
    tip: GitOid,
}

impl TemporaryBranch {
    /// Create a branch at `base`, named after the commits it will receive.
    /// A leftover branch with the same name is replaced.
    pub fn create(repo: &GitRepository, base: &GitOid, for_commits: &[GitOid]) -> GitResult<Self> {
        let name = branch_name(for_commits);
        if repo.branch_exists(&name)? {
            debug!(branch = %name, "removing stale temporary branch");
            repo.delete_branch(&name)?;
        }
        repo.create_branch(&name, base)?;
        debug!(branch = %name, base = %base.short(), "created temporary branch");

        Ok(Self {
            repo: repo.clone(),
            name,
            tip: *base,
        })
    }

    /// Branch name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current tip.
    pub fn tip(&self) -> GitOid {
        self.tip
    }

    /// Replay `commit` onto the branch, returning the new commit.
    pub fn cherry_pick(&mut self, commit: &GitOid) -> GitResult<GitOid> {
        let replayed = self.repo.cherry_pick_onto_branch(&self.name, commit)?;
        self.tip = replayed;
        Ok(replayed)
    }
}

impl Drop for TemporaryBranch {
    fn drop(&mut self) {
        match self.repo.delete_branch(&self.name) {
            Ok(()) => debug!(branch = %self.name, "deleted temporary branch"),
            Err(e) => warn!(branch = %self.name, error = %e, "failed to delete temporary branch"),
        }
    }
}

fn branch_name(commits: &[GitOid]) -> String {
    let shorts: Vec<String> = match commits {
        [] => vec!["empty".to_string()],
        [only] => vec![only.short()],
        [first, .., last] => vec![first.short(), last.short(), commits.len().to_string()],
    };
    format!("templar-replay-{}", shorts.join("-"))
}
