//! Applying a [`PatchSet`] to a directory tree.

use crate::diff::{FileDiff, Hunk, PatchSet};
use crate::error::{SyncError, SyncResult};
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Counts of what an [`DiffApplier::apply`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Files created.
    pub added: usize,
    /// Files deleted.
    pub removed: usize,
    /// Files moved.
    pub renamed: usize,
    /// Files patched in place.
    pub modified: usize,
    /// Diffs that were no-ops (e.g. deleting a missing file).
    pub skipped: usize,
}

impl ApplyReport {
    /// Number of files touched.
    pub fn total(&self) -> usize {
        self.added + self.removed + self.renamed + self.modified
    }
}

/// Applies patches file by file, relative to a target directory.
///
/// Hunks are matched on their context rather than trusted by line number,
/// so a template whose lines drifted from the output still patches as long
/// as the surrounding text agrees.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffApplier;

impl DiffApplier {
    /// Apply every file diff in `patch` under `target_dir`. Stops at the
    /// first failure; files already written stay written. A patch holding an
    /// unsupported diff is rejected before any file is touched.
    pub fn apply(patch: &PatchSet, target_dir: &Path) -> SyncResult<ApplyReport> {
        if let Some(FileDiff::Unsupported { header, reason }) = patch
            .files
            .iter()
            .find(|diff| matches!(diff, FileDiff::Unsupported { .. }))
        {
            return Err(unsupported(header, reason));
        }

        let mut report = ApplyReport::default();
        for diff in &patch.files {
            Self::apply_file(diff, target_dir, &mut report)?;
        }
        debug!(
            target = %target_dir.display(),
            added = report.added,
            removed = report.removed,
            renamed = report.renamed,
            modified = report.modified,
            "applied patch"
        );
        Ok(report)
    }

    fn apply_file(diff: &FileDiff, target_dir: &Path, report: &mut ApplyReport) -> SyncResult<()> {
        match diff {
            FileDiff::Added { path, hunks } => {
                let dest = resolve(target_dir, path)?;
                if dest.exists() {
                    warn!(path = %path.display(), "added file already exists in template, overwriting");
                }
                write_file(&dest, &added_content(hunks))?;
                report.added += 1;
            }
            FileDiff::Removed { path } => {
                let dest = resolve(target_dir, path)?;
                match fs::remove_file(&dest) {
                    Ok(()) => report.removed += 1,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        warn!(path = %path.display(), "removed file is already absent from template");
                        report.skipped += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            FileDiff::Renamed { from, to, hunks, .. } => {
                let source = resolve(target_dir, from)?;
                let dest = resolve(target_dir, to)?;
                if !source.exists() {
                    return Err(SyncError::PatchFailed {
                        path: from.clone(),
                        reason: "rename source does not exist".to_string(),
                    });
                }
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::rename(&source, &dest)?;
                if !hunks.is_empty() {
                    patch_file(&dest, to, hunks)?;
                }
                report.renamed += 1;
            }
            FileDiff::Modified { path, hunks } => {
                let dest = resolve(target_dir, path)?;
                patch_file(&dest, path, hunks)?;
                report.modified += 1;
            }
            FileDiff::Unsupported { header, reason } => return Err(unsupported(header, reason)),
        }
        Ok(())
    }
}

fn unsupported(header: &str, reason: &str) -> SyncError {
    SyncError::UnsupportedDiff {
        description: format!("{reason}: {}", header.lines().next().unwrap_or_default()),
    }
}

/// Join a patch path onto `root`, refusing anything that would leave it.
fn resolve(root: &Path, relative: &Path) -> SyncResult<PathBuf> {
    let escapes = relative.components().any(|c| {
        matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_))
    });
    if escapes || relative.as_os_str().is_empty() {
        return Err(SyncError::PatchFailed {
            path: relative.to_path_buf(),
            reason: "path leaves the target directory".to_string(),
        });
    }
    Ok(root.join(relative))
}

/// Content of a new file: its added lines.
fn added_content(hunks: &[Hunk]) -> String {
    let lines: Vec<&str> = hunks.iter().flat_map(Hunk::new_lines).collect();
    let missing_newline = hunks.last().is_some_and(|h| h.new_missing_newline);
    join_lines(&lines, !missing_newline)
}

fn join_lines(lines: &[&str], trailing_newline: bool) -> String {
    let mut content = lines.join("\n");
    if trailing_newline && !lines.is_empty() {
        content.push('\n');
    }
    content
}

fn patch_file(dest: &Path, display: &Path, hunks: &[Hunk]) -> SyncResult<()> {
    let original = fs::read_to_string(dest).map_err(|e| SyncError::PatchFailed {
        path: display.to_path_buf(),
        reason: format!("cannot read file: {e}"),
    })?;
    let patched = apply_hunks(&original, hunks).map_err(|reason| SyncError::PatchFailed {
        path: display.to_path_buf(),
        reason,
    })?;
    Ok(write_file(dest, &patched)?)
}

/// Apply `hunks` (in order) to `original`.
///
/// Each hunk's old lines are looked for at their stated position adjusted
/// by the drift of earlier hunks, then at increasing distances on either
/// side, never before the end of the previous hunk.
pub fn apply_hunks(original: &str, hunks: &[Hunk]) -> Result<String, String> {
    let (lines, mut trailing_newline) = split_lines(original);
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    let mut cursor = 0usize;
    let mut drift: isize = 0;

    for (index, hunk) in hunks.iter().enumerate() {
        let old: Vec<&str> = hunk.old_lines().collect();
        let stated = if hunk.old_len == 0 {
            hunk.old_start
        } else {
            hunk.old_start.saturating_sub(1)
        };
        let expected = (stated as isize + drift).max(0) as usize;

        let pos = find_block(&lines, &old, expected, cursor).ok_or_else(|| {
            format!(
                "hunk {} (@@ -{},{} @@) does not match the file",
                index + 1,
                hunk.old_start,
                hunk.old_len
            )
        })?;

        out.extend_from_slice(&lines[cursor..pos]);
        out.extend(hunk.new_lines());
        cursor = pos + old.len();
        drift = pos as isize - stated as isize;

        if cursor == lines.len() {
            trailing_newline = !hunk.new_missing_newline;
        }
    }
    out.extend_from_slice(&lines[cursor..]);

    Ok(join_lines(&out, trailing_newline))
}

/// Lines without terminators, and whether the text ended with one.
fn split_lines(text: &str) -> (Vec<&str>, bool) {
    if text.is_empty() {
        return (Vec::new(), false);
    }
    let trailing_newline = text.ends_with('\n');
    let body = text.strip_suffix('\n').unwrap_or(text);
    (body.split('\n').collect(), trailing_newline)
}

fn find_block(lines: &[&str], block: &[&str], expected: usize, floor: usize) -> Option<usize> {
    if block.len() > lines.len() {
        return None;
    }
    let last = lines.len() - block.len();
    if floor > last {
        return None;
    }
    let matches_at = |pos: usize| lines[pos..pos + block.len()] == *block;
    let expected = expected.clamp(floor, last);

    let span = (expected - floor).max(last - expected);
    for distance in 0..=span {
        if let Some(pos) = expected.checked_add(distance).filter(|p| *p <= last) {
            if matches_at(pos) {
                return Some(pos);
            }
        }
        if distance > 0 {
            if let Some(pos) = expected.checked_sub(distance).filter(|p| *p >= floor) {
                if matches_at(pos) {
                    return Some(pos);
                }
            }
        }
    }
    None
}

/// Write via a sibling temp file and rename, creating parent directories.
fn write_file(path: &Path, content: &str) -> io::Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content.as_bytes())?;
    if let Ok(metadata) = fs::metadata(path) {
        temp.as_file().set_permissions(metadata.permissions())?;
    }
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
