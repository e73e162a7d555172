//! Tree-to-tree diffs rendered as unified patch text.

use crate::{GitOid, GitRepository, GitResult};
use git2::{Diff, DiffDelta, DiffFile, DiffFindOptions, DiffFormat, DiffOptions as Git2DiffOpts};
use tracing::warn;

/// Options for generating a diff.
#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Context lines around each hunk.
    pub context_lines: u32,
    /// Detect renames.
    pub detect_renames: bool,
    /// Similarity percentage at which an add/delete pair becomes a rename.
    pub rename_threshold: u16,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            context_lines: 3,
            detect_renames: true,
            rename_threshold: 50,
        }
    }
}

/// Diff statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    /// Files changed.
    pub files_changed: usize,
    /// Lines inserted.
    pub insertions: usize,
    /// Lines deleted.
    pub deletions: usize,
}

fn build_diff_options(options: &DiffOptions) -> Git2DiffOpts {
    let mut opts = Git2DiffOpts::new();
    opts.context_lines(options.context_lines);
    opts
}

/// Raw patch bytes for one file.
struct FileSection {
    old_path: String,
    new_path: String,
    bytes: Vec<u8>,
}

impl FileSection {
    fn new(delta: &DiffDelta<'_>) -> Self {
        let path = |file: DiffFile<'_>| {
            file.path()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        Self {
            old_path: path(delta.old_file()),
            new_path: path(delta.new_file()),
            bytes: Vec::new(),
        }
    }

    fn into_text(self) -> String {
        match String::from_utf8(self.bytes) {
            Ok(text) => text,
            Err(_) => {
                warn!(path = %self.new_path, "file is not UTF-8 text, reporting it as binary");
                format!(
                    "diff --git a/{old} b/{new}\nBinary files a/{old} and b/{new} differ\n",
                    old = self.old_path,
                    new = self.new_path,
                )
            }
        }
    }
}

impl GitRepository {
    fn with_commit_diff<F, R>(&self, old: &GitOid, new: &GitOid, options: &DiffOptions, f: F) -> GitResult<R>
    where
        F: FnOnce(&Diff<'_>) -> GitResult<R>,
    {
        self.with_repo(|repo| {
            let old_tree = repo.find_commit(old.as_git2())?.tree()?;
            let new_tree = repo.find_commit(new.as_git2())?.tree()?;

            let mut opts = build_diff_options(options);
            let mut diff = repo.diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut opts))?;

            if options.detect_renames {
                let mut find_opts = DiffFindOptions::new();
                find_opts.renames(true).rename_threshold(options.rename_threshold);
                diff.find_similar(Some(&mut find_opts))?;
            }

            f(&diff)
        })
    }

    /// Unified patch (as `git diff old new` prints it) between two commits.
    ///
    /// Files whose content is not valid UTF-8 are reported the way git
    /// reports binary files, so their bytes never pass through text.
    pub fn diff_commits_patch(&self, old: &GitOid, new: &GitOid, options: &DiffOptions) -> GitResult<String> {
        self.with_commit_diff(old, new, options, |diff| {
            let mut sections: Vec<FileSection> = Vec::new();
            diff.print(DiffFormat::Patch, |delta, _hunk, line| {
                if line.origin() == 'F' || sections.is_empty() {
                    sections.push(FileSection::new(&delta));
                }
                if let Some(section) = sections.last_mut() {
                    // Content lines come without their origin marker; headers
                    // and end-of-file markers carry their own text.
                    if matches!(line.origin(), '+' | '-' | ' ') {
                        section.bytes.push(line.origin() as u8);
                    }
                    section.bytes.extend_from_slice(line.content());
                }
                true
            })?;
            Ok(sections.into_iter().map(FileSection::into_text).collect())
        })
    }

    /// Statistics for the diff between two commits.
    pub fn diff_stats(&self, old: &GitOid, new: &GitOid) -> GitResult<DiffStats> {
        self.with_commit_diff(old, new, &DiffOptions::default(), |diff| {
            let stats = diff.stats()?;
            Ok(DiffStats {
                files_changed: stats.files_changed(),
                insertions: stats.insertions(),
                deletions: stats.deletions(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn repo_with(files: &[(&str, &str)]) -> (tempfile::TempDir, GitRepository, GitOid) {
        let dir = tempdir().unwrap();
        let repo = GitRepository::init(dir.path()).unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        let oid = repo.commit_all("base").unwrap();
        (dir, repo, oid)
    }

    #[test]
    fn test_patch_for_modification() {
        let (dir, repo, base) = repo_with(&[("a.txt", "one\ntwo\n")]);
        fs::write(dir.path().join("a.txt"), "one\n2\n").unwrap();
        let next = repo.commit_all("edit").unwrap();

        let patch = repo.diff_commits_patch(&base, &next, &DiffOptions::default()).unwrap();
        assert!(patch.starts_with("diff --git a/a.txt b/a.txt\n"));
        assert!(patch.contains("--- a/a.txt\n+++ b/a.txt\n"));
        assert!(patch.contains("-two\n+2\n"));

        let stats = repo.diff_stats(&base, &next).unwrap();
        assert_eq!(stats, DiffStats { files_changed: 1, insertions: 1, deletions: 1 });
    }

    #[test]
    fn test_patch_reports_pure_rename() {
        let (dir, repo, base) = repo_with(&[("old/name.txt", "same content\nacross lines\n")]);
        fs::create_dir_all(dir.path().join("new")).unwrap();
        fs::rename(dir.path().join("old/name.txt"), dir.path().join("new/name.txt")).unwrap();
        let next = repo.commit_all("move").unwrap();

        let patch = repo.diff_commits_patch(&base, &next, &DiffOptions::default()).unwrap();
        assert!(patch.contains("similarity index 100%"));
        assert!(patch.contains("rename from old/name.txt\nrename to new/name.txt\n"));
        assert!(!patch.contains("@@"));
    }

    #[test]
    fn test_patch_marks_missing_newline() {
        let (dir, repo, base) = repo_with(&[("a.txt", "line\n")]);
        fs::write(dir.path().join("a.txt"), "line\nlast").unwrap();
        let next = repo.commit_all("no eol").unwrap();

        let patch = repo.diff_commits_patch(&base, &next, &DiffOptions::default()).unwrap();
        assert!(patch.contains("+last\n\\ No newline at end of file\n"));
    }

    #[test]
    fn test_non_utf8_file_is_reported_as_binary() {
        let (dir, repo, base) = repo_with(&[("a.txt", "plain\n"), ("name.txt", "cafe\n")]);
        fs::write(dir.path().join("a.txt"), "plain\nmore\n").unwrap();
        fs::write(dir.path().join("name.txt"), b"caf\xe9\n").unwrap();
        let next = repo.commit_all("latin-1").unwrap();

        let patch = repo.diff_commits_patch(&base, &next, &DiffOptions::default()).unwrap();
        assert!(patch.contains("+more\n"));
        assert!(patch.contains("diff --git a/name.txt b/name.txt\nBinary files a/name.txt and b/name.txt differ\n"));
        assert!(!patch.contains('\u{FFFD}'));
    }
}
