//! In-memory cherry-picks onto a branch.
//!
//! Nothing here touches HEAD, the index file or the working tree, so a
//! replay can run while the user keeps working in the repository.

use crate::commit::default_signature;
use crate::{GitError, GitOid, GitRepository, GitResult};

impl GitRepository {
    /// Replay `commit` on top of local branch `branch`, advancing the branch
    /// to the new commit. Merge commits are replayed against their first
    /// parent. The original author and message are kept.
    pub fn cherry_pick_onto_branch(&self, branch: &str, commit: &GitOid) -> GitResult<GitOid> {
        self.with_repo(|repo| {
            let refname = format!("refs/heads/{branch}");
            let onto = repo
                .find_reference(&refname)
                .map_err(|_| GitError::BranchNotFound {
                    name: branch.to_string(),
                })?
                .peel_to_commit()?;
            let pick = repo
                .find_commit(commit.as_git2())
                .map_err(|_| GitError::CommitNotFound { oid: commit.to_hex() })?;

            let mainline = if pick.parent_count() > 1 { 1 } else { 0 };
            let mut index = repo.cherrypick_commit(&pick, &onto, mainline, None)?;

            if index.has_conflicts() {
                let files = index
                    .conflicts()?
                    .filter_map(Result::ok)
                    .filter_map(|conflict| conflict.our.or(conflict.their).or(conflict.ancestor))
                    .map(|entry| String::from_utf8_lossy(&entry.path).into_owned())
                    .collect();
                return Err(GitError::CherryPickConflict {
                    commit: commit.short(),
                    files,
                });
            }

            let tree = repo.find_tree(index.write_tree_to(repo)?)?;
            let committer = default_signature(repo)?;
            let message = String::from_utf8_lossy(pick.message_bytes()).into_owned();
            let new_oid = repo.commit(
                Some(&refname),
                &pick.author(),
                &committer,
                &message,
                &tree,
                &[&onto],
            )?;

            tracing::debug!(original = %commit.short(), replayed = %new_oid, branch, "cherry-picked");
            Ok(GitOid::from_git2(new_oid))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_cherry_pick_leaves_head_and_workdir_alone() {
        let dir = tempdir().unwrap();
        let repo = GitRepository::init(dir.path()).unwrap();
        fs::write(dir.path().join("a.txt"), "a\n").unwrap();
        let base = repo.commit_all("base").unwrap();
        fs::write(dir.path().join("b.txt"), "b\n").unwrap();
        let second = repo.commit_all("add b").unwrap();

        repo.create_branch("replay", &base).unwrap();
        let replayed = repo.cherry_pick_onto_branch("replay", &second).unwrap();

        assert_ne!(replayed, second);
        assert_eq!(repo.branch_tip("replay").unwrap(), Some(replayed));
        assert_eq!(repo.head_oid().unwrap(), second);
        assert!(!repo.is_dirty().unwrap());

        let commit = repo.get_commit(&replayed).unwrap();
        assert_eq!(commit.summary, "add b");
        assert_eq!(commit.parents, vec![base]);
        assert_eq!(commit.tree, repo.get_commit(&second).unwrap().tree);
    }

    #[test]
    fn test_conflicting_pick_reports_files() {
        let dir = tempdir().unwrap();
        let repo = GitRepository::init(dir.path()).unwrap();
        fs::write(dir.path().join("a.txt"), "base\n").unwrap();
        let base = repo.commit_all("base").unwrap();
        fs::write(dir.path().join("a.txt"), "ours\n").unwrap();
        let ours = repo.commit_all("ours").unwrap();

        repo.create_branch("other", &base).unwrap();
        repo.with_repo(|r| {
            let parent = r.find_commit(base.as_git2()).unwrap();
            let mut builder = r.treebuilder(Some(&parent.tree().unwrap())).unwrap();
            let blob = r.blob(b"theirs\n").unwrap();
            builder.insert("a.txt", blob, 0o100644).unwrap();
            let tree = r.find_tree(builder.write().unwrap()).unwrap();
            let sig = git2::Signature::now("t", "t@example.com").unwrap();
            r.commit(Some("refs/heads/other"), &sig, &sig, "theirs", &tree, &[&parent])
                .unwrap();
        });

        let err = repo.cherry_pick_onto_branch("other", &ours).unwrap_err();
        assert!(err.is_conflict());
        match err {
            GitError::CherryPickConflict { files, .. } => assert_eq!(files, vec!["a.txt"]),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
