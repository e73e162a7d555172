//! Repository wrapper for Git operations shared across threads.

use crate::{GitCommit, GitError, GitOid, GitResult};
use git2::{Repository as Git2Repo, StatusOptions};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Thread-safe repository handle. Clones share the same underlying
/// repository.
#[derive(Clone)]
pub struct GitRepository {
    inner: Arc<Mutex<Git2Repo>>,
    root_path: PathBuf,
}

impl std::fmt::Debug for GitRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepository")
            .field("root_path", &self.root_path)
            .finish()
    }
}

impl GitRepository {
    fn wrap(repo: Git2Repo) -> GitResult<Self> {
        let root_path = repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| GitError::Bare {
                path: repo.path().display().to_string(),
            })?;

        Ok(Self {
            inner: Arc::new(Mutex::new(repo)),
            root_path,
        })
    }

    /// Open the repository whose working directory is `path`.
    pub fn open(path: impl AsRef<Path>) -> GitResult<Self> {
        let path = path.as_ref();
        let repo = Git2Repo::open(path).map_err(|e| match e.code() {
            git2::ErrorCode::NotFound => GitError::NotARepo {
                path: path.display().to_string(),
            },
            _ => GitError::Git2(e),
        })?;
        Self::wrap(repo)
    }

    /// Discover the repository containing `path`, searching parent
    /// directories.
    pub fn discover(path: impl AsRef<Path>) -> GitResult<Self> {
        let path = path.as_ref();
        let repo = Git2Repo::discover(path).map_err(|e| match e.code() {
            git2::ErrorCode::NotFound => GitError::NotARepo {
                path: path.display().to_string(),
            },
            _ => GitError::Git2(e),
        })?;
        Self::wrap(repo)
    }

    /// Initialize a new repository.
    pub fn init(path: impl AsRef<Path>) -> GitResult<Self> {
        Self::wrap(Git2Repo::init(path.as_ref())?)
    }

    /// Whether `path` is inside a git working tree.
    pub fn is_inside_repo(path: impl AsRef<Path>) -> bool {
        Git2Repo::discover(path.as_ref()).is_ok()
    }

    /// Working directory root.
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Access the underlying git2 repository.
    pub fn with_repo<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Git2Repo) -> R,
    {
        let repo = self.inner.lock();
        f(&repo)
    }

    /// OID of the commit HEAD points at.
    pub fn head_oid(&self) -> GitResult<GitOid> {
        self.with_repo(|repo| {
            let head = repo.head().map_err(|_| GitError::RefNotFound {
                name: "HEAD".to_string(),
            })?;
            let commit = head.peel_to_commit()?;
            Ok(GitOid::from_git2(commit.id()))
        })
    }

    /// HEAD commit, or `None` in a repository without commits.
    pub fn try_head_oid(&self) -> GitResult<Option<GitOid>> {
        match self.head_oid() {
            Ok(oid) => Ok(Some(oid)),
            Err(GitError::RefNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Get a specific commit by OID.
    pub fn get_commit(&self, oid: &GitOid) -> GitResult<GitCommit> {
        self.with_repo(|repo| {
            let commit = repo
                .find_commit(oid.as_git2())
                .map_err(|_| GitError::CommitNotFound { oid: oid.to_hex() })?;
            Ok(GitCommit::from_git2(&commit))
        })
    }

    /// Whether the working tree has uncommitted changes, untracked files
    /// included.
    pub fn is_dirty(&self) -> GitResult<bool> {
        self.with_repo(|repo| {
            let mut options = StatusOptions::new();
            options
                .include_untracked(true)
                .recurse_untracked_dirs(true)
                .include_ignored(false);
            let statuses = repo.statuses(Some(&mut options))?;
            Ok(!statuses.is_empty())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_open_non_repo_fails() {
        let dir = tempdir().unwrap();
        let err = GitRepository::open(dir.path()).unwrap_err();
        assert!(matches!(err, GitError::NotARepo { .. }));
        assert!(!GitRepository::is_inside_repo(dir.path()));
    }

    #[test]
    fn test_discover_from_subdirectory() {
        let dir = tempdir().unwrap();
        GitRepository::init(dir.path()).unwrap();
        let nested = dir.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();

        let repo = GitRepository::discover(&nested).unwrap();
        assert_eq!(
            repo.root_path().canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_dirty_and_head() {
        let dir = tempdir().unwrap();
        let repo = GitRepository::init(dir.path()).unwrap();
        assert_eq!(repo.try_head_oid().unwrap(), None);
        assert!(!repo.is_dirty().unwrap());

        fs::write(dir.path().join("file.txt"), "content\n").unwrap();
        assert!(repo.is_dirty().unwrap());

        let oid = repo.commit_all("initial").unwrap();
        assert!(!repo.is_dirty().unwrap());
        assert_eq!(repo.head_oid().unwrap(), oid);
        assert_eq!(repo.get_commit(&oid).unwrap().summary, "initial");
    }
}
