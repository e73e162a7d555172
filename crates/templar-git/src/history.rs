//! Commit ranges.

use crate::{GitCommit, GitOid, GitRepository, GitResult};

impl GitRepository {
    /// Commits reachable from `to` but not from `from`, oldest first.
    pub fn commits_between(&self, from: &GitOid, to: &GitOid) -> GitResult<Vec<GitCommit>> {
        self.with_repo(|repo| {
            let mut revwalk = repo.revwalk()?;
            revwalk.push(to.as_git2())?;
            revwalk.hide(from.as_git2())?;
            revwalk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::REVERSE)?;

            let mut commits = Vec::new();
            for oid in revwalk {
                let commit = repo.find_commit(oid?)?;
                commits.push(GitCommit::from_git2(&commit));
            }
            Ok(commits)
        })
    }

    /// Whether `ancestor` is reachable from `descendant` (or equal to it).
    pub fn is_ancestor(&self, ancestor: &GitOid, descendant: &GitOid) -> GitResult<bool> {
        if ancestor == descendant {
            return Ok(true);
        }
        self.with_repo(|repo| {
            Ok(repo.graph_descendant_of(descendant.as_git2(), ancestor.as_git2())?)
        })
    }
}
