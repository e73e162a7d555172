//! Unified diff model and parser.
//!
//! Parses the patch text `git diff` produces into one [`FileDiff`] per
//! file. The variant is decided once, while reading the extended header,
//! so the applier can match on it exhaustively.

use crate::error::{SyncError, SyncResult};
use std::fmt;
use std::path::PathBuf;

/// Marker git appends after a line that lacks a trailing newline.
const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

/// A parsed multi-file patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchSet {
    /// File diffs in patch order.
    pub files: Vec<FileDiff>,
}

/// Change to a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileDiff {
    /// New file. The content is the added lines of `hunks`, empty if none.
    Added {
        /// Path of the new file.
        path: PathBuf,
        /// Hunks holding the content.
        hunks: Vec<Hunk>,
    },
    /// Deleted file.
    Removed {
        /// Path of the deleted file.
        path: PathBuf,
    },
    /// Moved file, optionally with content changes.
    Renamed {
        /// Old path.
        from: PathBuf,
        /// New path.
        to: PathBuf,
        /// Similarity index reported by git, if any.
        similarity: Option<u8>,
        /// Content changes at the new path; empty for a pure rename.
        hunks: Vec<Hunk>,
    },
    /// Changed content at an unchanged path.
    Modified {
        /// Path of the file.
        path: PathBuf,
        /// Content changes.
        hunks: Vec<Hunk>,
    },
    /// Anything else: binary patches, copies, mode-only changes.
    Unsupported {
        /// The file's header lines.
        header: String,
        /// Why it is not supported.
        reason: String,
    },
}

impl FileDiff {
    /// Path the diff leaves behind, if any.
    pub fn target_path(&self) -> Option<&PathBuf> {
        match self {
            Self::Added { path, .. } | Self::Modified { path, .. } => Some(path),
            Self::Renamed { to, .. } => Some(to),
            Self::Removed { .. } | Self::Unsupported { .. } => None,
        }
    }

    /// A rename without content changes.
    pub fn is_pure_rename(&self) -> bool {
        matches!(self, Self::Renamed { hunks, .. } if hunks.is_empty())
    }
}

/// A contiguous block of changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hunk {
    /// First line in the old file (1-based; 0 for an empty range).
    pub old_start: usize,
    /// Lines taken from the old file.
    pub old_len: usize,
    /// First line in the new file.
    pub new_start: usize,
    /// Lines in the new file.
    pub new_len: usize,
    /// Hunk body.
    pub lines: Vec<HunkLine>,
    /// The old side's last line has no trailing newline.
    pub old_missing_newline: bool,
    /// The new side's last line has no trailing newline.
    pub new_missing_newline: bool,
}

impl Hunk {
    /// Lines the old file must contain.
    pub fn old_lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|line| match line {
            HunkLine::Context(s) | HunkLine::Removed(s) => Some(s.as_str()),
            HunkLine::Added(_) => None,
        })
    }

    /// Lines the new file will contain.
    pub fn new_lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|line| match line {
            HunkLine::Context(s) | HunkLine::Added(s) => Some(s.as_str()),
            HunkLine::Removed(_) => None,
        })
    }
}

/// A single hunk line, without its newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    /// Unchanged.
    Context(String),
    /// Only in the new file.
    Added(String),
    /// Only in the old file.
    Removed(String),
}

impl fmt::Display for HunkLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HunkLine::Context(s) => write!(f, " {}", s),
            HunkLine::Added(s) => write!(f, "+{}", s),
            HunkLine::Removed(s) => write!(f, "-{}", s),
        }
    }
}

impl fmt::Display for Hunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_len, self.new_start, self.new_len
        )?;
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

impl PatchSet {
    /// Parse unified diff text.
    pub fn parse(text: &str) -> SyncResult<Self> {
        let mut parser = Parser::default();
        // Split on '\n' only: a '\r' belongs to the line content.
        let body = text.strip_suffix('\n').unwrap_or(text);
        for (index, line) in body.split('\n').enumerate() {
            parser.feed(index + 1, line)?;
        }
        parser.finish()
    }

    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl std::str::FromStr for PatchSet {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Extended header state for the file being read.
#[derive(Debug, Default)]
struct FileSection {
    header: Vec<String>,
    header_old: Option<PathBuf>,
    header_new: Option<PathBuf>,
    old_path: Option<Option<PathBuf>>,
    new_path: Option<Option<PathBuf>>,
    new_file: bool,
    deleted_file: bool,
    mode_change: bool,
    rename_from: Option<PathBuf>,
    rename_to: Option<PathBuf>,
    similarity: Option<u8>,
    unsupported: Option<String>,
    hunks: Vec<Hunk>,
}

impl FileSection {
    fn into_diff(self) -> FileDiff {
        let header = self.header.join("\n");
        if let Some(reason) = self.unsupported {
            return FileDiff::Unsupported { header, reason };
        }

        let old = self.old_path.unwrap_or(self.header_old);
        let new = self.new_path.unwrap_or(self.header_new);

        if let (Some(from), Some(to)) = (self.rename_from, self.rename_to) {
            return FileDiff::Renamed {
                from,
                to,
                similarity: self.similarity,
                hunks: self.hunks,
            };
        }
        if self.new_file {
            return match new {
                Some(path) => FileDiff::Added {
                    path,
                    hunks: self.hunks,
                },
                None => FileDiff::Unsupported {
                    header,
                    reason: "new file without a path".to_string(),
                },
            };
        }
        if self.deleted_file {
            return match old {
                Some(path) => FileDiff::Removed { path },
                None => FileDiff::Unsupported {
                    header,
                    reason: "deleted file without a path".to_string(),
                },
            };
        }
        match (old, new) {
            (Some(_), Some(path)) if !self.hunks.is_empty() => FileDiff::Modified {
                path,
                hunks: self.hunks,
            },
            _ if self.mode_change => FileDiff::Unsupported {
                header,
                reason: "mode-only change".to_string(),
            },
            _ => FileDiff::Unsupported {
                header,
                reason: "no content changes".to_string(),
            },
        }
    }
}

/// Lines still expected in the current hunk.
#[derive(Debug, Clone, Copy)]
struct Remaining {
    old: usize,
    new: usize,
}

#[derive(Debug, Default)]
struct Parser {
    files: Vec<FileDiff>,
    current: Option<FileSection>,
    remaining: Option<Remaining>,
    last_side: Option<HunkSide>,
}

#[derive(Debug, Clone, Copy)]
enum HunkSide {
    Old,
    New,
    Both,
}

impl Parser {
    fn feed(&mut self, number: usize, line: &str) -> SyncResult<()> {
        if let Some(remaining) = self.remaining {
            if remaining.old > 0 || remaining.new > 0 {
                return self.hunk_line(number, line, remaining);
            }
            self.remaining = None;
        }

        if line.starts_with(NO_NEWLINE_MARKER) {
            self.mark_no_newline();
            return Ok(());
        }

        if let Some(rest) = line.strip_prefix("diff --git ") {
            self.flush();
            let (old, new) = split_header_paths(rest);
            self.current = Some(FileSection {
                header: vec![line.to_string()],
                header_old: old,
                header_new: new,
                ..FileSection::default()
            });
            return Ok(());
        }

        let Some(section) = self.current.as_mut() else {
            // Preamble before the first file (e.g. commit message text).
            return Ok(());
        };

        if line.starts_with("@@") {
            let hunk = parse_hunk_header(number, line)?;
            self.remaining = Some(Remaining {
                old: hunk.old_len,
                new: hunk.new_len,
            });
            self.last_side = None;
            section.hunks.push(hunk);
            return Ok(());
        }

        if !section.hunks.is_empty() {
            if line.is_empty() {
                return Ok(());
            }
            return Err(SyncError::DiffParse {
                line: number,
                message: format!("unexpected line after hunk: {line:?}"),
            });
        }

        section.header.push(line.to_string());
        if let Some(path) = line.strip_prefix("--- ") {
            section.old_path = Some(parse_side_path(number, path)?);
        } else if let Some(path) = line.strip_prefix("+++ ") {
            section.new_path = Some(parse_side_path(number, path)?);
        } else if line.starts_with("new file mode ") {
            section.new_file = true;
        } else if line.starts_with("deleted file mode ") {
            section.deleted_file = true;
        } else if line.starts_with("old mode ") || line.starts_with("new mode ") {
            section.mode_change = true;
        } else if let Some(path) = line.strip_prefix("rename from ") {
            section.rename_from = Some(PathBuf::from(unquote(path)));
        } else if let Some(path) = line.strip_prefix("rename to ") {
            section.rename_to = Some(PathBuf::from(unquote(path)));
        } else if let Some(value) = line.strip_prefix("similarity index ") {
            section.similarity = value.trim_end_matches('%').parse().ok();
        } else if line.starts_with("copy from ") || line.starts_with("copy to ") {
            section.unsupported = Some("copies are not supported".to_string());
        } else if line.starts_with("Binary files ") || line == "GIT binary patch" {
            section.unsupported = Some("binary patches are not supported".to_string());
        }
        Ok(())
    }

    fn hunk_line(&mut self, number: usize, line: &str, mut remaining: Remaining) -> SyncResult<()> {
        let malformed = |message: String| SyncError::DiffParse { line: number, message };
        let section = self
            .current
            .as_mut()
            .ok_or_else(|| malformed("hunk line outside a file".to_string()))?;
        let hunk = section
            .hunks
            .last_mut()
            .ok_or_else(|| malformed("hunk line before hunk header".to_string()))?;

        if line.starts_with(NO_NEWLINE_MARKER) {
            mark_hunk(hunk, self.last_side);
            return Ok(());
        }

        let (kind, content) = match line.chars().next() {
            Some(' ') => (HunkSide::Both, &line[1..]),
            Some('+') => (HunkSide::New, &line[1..]),
            Some('-') => (HunkSide::Old, &line[1..]),
            // Some tools strip the lone space of an empty context line.
            None => (HunkSide::Both, ""),
            Some(_) => return Err(malformed(format!("unexpected hunk line {line:?}"))),
        };

        let fits = match kind {
            HunkSide::Both => remaining.old > 0 && remaining.new > 0,
            HunkSide::Old => remaining.old > 0,
            HunkSide::New => remaining.new > 0,
        };
        if !fits {
            return Err(malformed("hunk longer than its header says".to_string()));
        }

        let content = content.to_string();
        match kind {
            HunkSide::Both => {
                remaining.old -= 1;
                remaining.new -= 1;
                hunk.lines.push(HunkLine::Context(content));
            }
            HunkSide::Old => {
                remaining.old -= 1;
                hunk.lines.push(HunkLine::Removed(content));
            }
            HunkSide::New => {
                remaining.new -= 1;
                hunk.lines.push(HunkLine::Added(content));
            }
        }
        self.remaining = Some(remaining);
        self.last_side = Some(kind);
        Ok(())
    }

    fn mark_no_newline(&mut self) {
        let side = self.last_side;
        if let Some(hunk) = self.current.as_mut().and_then(|s| s.hunks.last_mut()) {
            mark_hunk(hunk, side);
        }
    }

    fn flush(&mut self) {
        if let Some(section) = self.current.take() {
            self.files.push(section.into_diff());
        }
        self.remaining = None;
        self.last_side = None;
    }

    fn finish(mut self) -> SyncResult<PatchSet> {
        if let Some(remaining) = self.remaining {
            if remaining.old > 0 || remaining.new > 0 {
                return Err(SyncError::DiffParse {
                    line: 0,
                    message: "patch ends inside a hunk".to_string(),
                });
            }
        }
        self.flush();
        Ok(PatchSet { files: self.files })
    }
}

fn mark_hunk(hunk: &mut Hunk, side: Option<HunkSide>) {
    match side {
        Some(HunkSide::Old) => hunk.old_missing_newline = true,
        Some(HunkSide::New) => hunk.new_missing_newline = true,
        Some(HunkSide::Both) => {
            hunk.old_missing_newline = true;
            hunk.new_missing_newline = true;
        }
        None => {}
    }
}

/// Parse `@@ -a[,b] +c[,d] @@`. An omitted length means 1.
fn parse_hunk_header(number: usize, line: &str) -> SyncResult<Hunk> {
    let malformed = || SyncError::DiffParse {
        line: number,
        message: format!("bad hunk header {line:?}"),
    };
    let ranges = line
        .strip_prefix("@@ ")
        .and_then(|rest| rest.split(" @@").next())
        .ok_or_else(malformed)?;
    let mut parts = ranges.split_whitespace();
    let old = parts.next().and_then(|p| p.strip_prefix('-')).ok_or_else(malformed)?;
    let new = parts.next().and_then(|p| p.strip_prefix('+')).ok_or_else(malformed)?;
    let (old_start, old_len) = parse_range(old).ok_or_else(malformed)?;
    let (new_start, new_len) = parse_range(new).ok_or_else(malformed)?;

    Ok(Hunk {
        old_start,
        old_len,
        new_start,
        new_len,
        ..Hunk::default()
    })
}

fn parse_range(range: &str) -> Option<(usize, usize)> {
    match range.split_once(',') {
        Some((start, len)) => Some((start.parse().ok()?, len.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}

/// Path from a `---`/`+++` line: `None` for `/dev/null`.
fn parse_side_path(number: usize, raw: &str) -> SyncResult<Option<PathBuf>> {
    // Some producers append a tab and a timestamp.
    let raw = raw.split('\t').next().unwrap_or(raw);
    let path = unquote(raw);
    if path == "/dev/null" {
        return Ok(None);
    }
    strip_side_prefix(&path)
        .map(|p| Some(PathBuf::from(p)))
        .ok_or_else(|| SyncError::DiffParse {
            line: number,
            message: format!("path {path:?} lacks an a/ or b/ prefix"),
        })
}

fn strip_side_prefix(path: &str) -> Option<&str> {
    path.strip_prefix("a/").or_else(|| path.strip_prefix("b/"))
}

/// Paths from `diff --git a/X b/Y`, used when no `---`/`+++` lines follow
/// (empty files, pure renames).
fn split_header_paths(rest: &str) -> (Option<PathBuf>, Option<PathBuf>) {
    if rest.starts_with('"') {
        if let Some((old, new)) = split_quoted(rest) {
            return (
                strip_side_prefix(&old).map(PathBuf::from),
                strip_side_prefix(&new).map(PathBuf::from),
            );
        }
        return (None, None);
    }

    // Same path on both sides: "a/P b/P".
    if rest.len() % 2 == 1 {
        let half = rest.len() / 2;
        if rest.is_char_boundary(half) && rest.is_char_boundary(half + 1) {
            let (old, new) = (&rest[..half], &rest[half + 1..]);
            if let (Some(o), Some(n)) = (old.strip_prefix("a/"), new.strip_prefix("b/")) {
                if o == n {
                    return (Some(PathBuf::from(o)), Some(PathBuf::from(n)));
                }
            }
        }
    }

    match rest.split_once(" b/") {
        Some((old, new)) => (
            old.strip_prefix("a/").map(PathBuf::from),
            Some(PathBuf::from(new)),
        ),
        None => (None, None),
    }
}

fn split_quoted(rest: &str) -> Option<(String, String)> {
    let end = closing_quote(rest)?;
    let old = unquote(&rest[..=end]);
    let new = unquote(rest[end + 1..].trim_start());
    Some((old, new))
}

fn closing_quote(s: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in s.char_indices().skip(1) {
        match c {
            '\\' if !escaped => escaped = true,
            '"' if !escaped => return Some(i),
            _ => escaped = false,
        }
    }
    None
}

/// Undo git's C-style quoting of unusual paths.
fn unquote(raw: &str) -> String {
    let Some(inner) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) else {
        return raw.to_string();
    };

    let mut bytes = Vec::with_capacity(inner.len());
    let mut chars = inner.bytes().peekable();
    while let Some(b) = chars.next() {
        if b != b'\\' {
            bytes.push(b);
            continue;
        }
        match chars.next() {
            Some(b'n') => bytes.push(b'\n'),
            Some(b't') => bytes.push(b'\t'),
            Some(b'r') => bytes.push(b'\r'),
            Some(b'a') => bytes.push(0x07),
            Some(b'b') => bytes.push(0x08),
            Some(b'f') => bytes.push(0x0c),
            Some(b'v') => bytes.push(0x0b),
            Some(d @ b'0'..=b'7') => {
                let mut value = u32::from(d - b'0');
                for _ in 0..2 {
                    match chars.peek() {
                        Some(&o @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(o - b'0');
                            chars.next();
                        }
                        _ => break,
                    }
                }
                bytes.push((value & 0xff) as u8);
            }
            Some(other) => bytes.push(other),
            None => bytes.push(b'\\'),
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}
