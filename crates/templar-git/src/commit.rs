//! Git commit types and commit creation.

use crate::{GitOid, GitRepository, GitResult};
use chrono::{DateTime, TimeZone, Utc};
use git2::{IndexAddOption, Repository as Git2Repo, Signature};

/// Identity used when the repository has no `user.name`/`user.email`.
pub const FALLBACK_NAME: &str = "templar";
/// Email used with [`FALLBACK_NAME`].
pub const FALLBACK_EMAIL: &str = "templar@localhost";

/// Git signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSignature {
    /// Name.
    pub name: String,
    /// Email.
    pub email: String,
    /// Timestamp.
    pub time: DateTime<Utc>,
}

impl GitSignature {
    /// Create from git2 signature.
    pub fn from_git2(sig: &Signature) -> Self {
        Self {
            name: String::from_utf8_lossy(sig.name_bytes()).into_owned(),
            email: String::from_utf8_lossy(sig.email_bytes()).into_owned(),
            time: Utc
                .timestamp_opt(sig.when().seconds(), 0)
                .single()
                .unwrap_or_default(),
        }
    }
}

/// Git commit information.
#[derive(Debug, Clone)]
pub struct GitCommit {
    /// Commit OID.
    pub oid: GitOid,
    /// Commit message (first line).
    pub summary: String,
    /// Full commit message, invalid UTF-8 replaced.
    pub message: String,
    /// Author signature.
    pub author: GitSignature,
    /// Parent commit OIDs.
    pub parents: Vec<GitOid>,
    /// Tree OID.
    pub tree: GitOid,
}

impl GitCommit {
    /// Create from git2 commit.
    pub fn from_git2(commit: &git2::Commit) -> Self {
        let message = String::from_utf8_lossy(commit.message_bytes()).into_owned();
        Self {
            oid: GitOid::from_git2(commit.id()),
            summary: message.lines().next().unwrap_or("").to_string(),
            message,
            author: GitSignature::from_git2(&commit.author()),
            parents: commit.parent_ids().map(GitOid::from_git2).collect(),
            tree: GitOid::from_git2(commit.tree_id()),
        }
    }

    /// Check if this is a merge commit.
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// Get the first parent OID.
    pub fn first_parent(&self) -> Option<&GitOid> {
        self.parents.first()
    }
}

/// Configured signature, or the fallback identity.
pub(crate) fn default_signature(repo: &Git2Repo) -> GitResult<Signature<'static>> {
    match repo.signature() {
        Ok(sig) => Ok(sig.to_owned()),
        Err(_) => Ok(Signature::now(FALLBACK_NAME, FALLBACK_EMAIL)?),
    }
}

impl GitRepository {
    /// Stage every change in the working tree, deletions included.
    pub fn stage_all(&self) -> GitResult<()> {
        self.with_repo(|repo| {
            let mut index = repo.index()?;
            index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
            index.update_all(["*"].iter(), None)?;
            index.write()?;
            Ok(())
        })
    }

    /// Commit the index on HEAD.
    pub fn commit_index(&self, message: &str) -> GitResult<GitOid> {
        self.with_repo(|repo| {
            let mut index = repo.index()?;
            let tree = repo.find_tree(index.write_tree()?)?;
            let sig = default_signature(repo)?;

            let parent = match repo.head() {
                Ok(head) => Some(head.peel_to_commit()?),
                Err(_) => None,
            };
            let parents: Vec<&git2::Commit> = parent.iter().collect();

            let oid = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
            tracing::debug!(oid = %oid, "created commit");
            Ok(GitOid::from_git2(oid))
        })
    }

    /// Stage everything and commit it on HEAD.
    pub fn commit_all(&self, message: &str) -> GitResult<GitOid> {
        self.stage_all()?;
        self.commit_index(message)
    }
}
