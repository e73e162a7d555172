//! Gitignore-style matching of template paths.

use globset::Glob;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Patterns every specification starts with.
pub const BUILTIN_IGNORES: &[&str] = &[".git/"];

/// Compiled ignore patterns, evaluated against paths relative to the
/// template root.
///
/// Patterns follow gitignore rules: the last matching pattern wins, a
/// leading `!` re-includes, a trailing `/` matches directories only. A path
/// is ignored when it or any of its parent directories is ignored.
#[derive(Debug, Clone)]
pub struct IgnoreSpecification {
    patterns: Vec<String>,
    matcher: Gitignore,
}

impl IgnoreSpecification {
    /// Compile the built-in patterns followed by `patterns`.
    ///
    /// Malformed patterns are logged and skipped; they never match.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = BUILTIN_IGNORES
            .iter()
            .map(|p| p.to_string())
            .chain(patterns.into_iter().map(Into::into))
            .collect();

        let mut builder = GitignoreBuilder::new("");
        for pattern in &patterns {
            if let Err(e) = check_glob(pattern) {
                warn!(pattern = %pattern, error = %e, "skipping malformed ignore pattern");
                continue;
            }
            if let Err(e) = builder.add_line(None, pattern) {
                warn!(pattern = %pattern, error = %e, "skipping unparseable ignore pattern");
            }
        }
        let matcher = builder.build().unwrap_or_else(|e| {
            debug!(error = %e, "ignore patterns failed to compile, matching nothing");
            Gitignore::empty()
        });

        Self { patterns, matcher }
    }

    /// All patterns, built-ins first.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether `path` (relative to the template root) is ignored.
    pub fn matches(&self, path: impl AsRef<Path>, is_dir: bool) -> bool {
        let Some(path) = normalize(path.as_ref()) else {
            debug!(path = %path.as_ref().display(), "path outside the template root, not ignored");
            return false;
        };
        if path.as_os_str().is_empty() {
            return false;
        }
        self.matcher
            .matched_path_or_any_parents(&path, is_dir)
            .is_ignore()
    }

    /// Like [`matches`](Self::matches), treating a trailing separator as
    /// marking a directory.
    pub fn file_is_ignored(&self, path: &str) -> bool {
        let is_dir = path.ends_with('/') || path.ends_with(std::path::MAIN_SEPARATOR);
        self.matches(path, is_dir)
    }
}

impl Default for IgnoreSpecification {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>())
    }
}

/// Compile the glob part of a gitignore line. The gitignore parser reads
/// some malformed globs, such as an unclosed `[`, as literal names.
fn check_glob(line: &str) -> Result<(), globset::Error> {
    let glob = line.strip_prefix('!').unwrap_or(line);
    let glob = glob.trim_start_matches('/').trim_end_matches('/');
    if glob.is_empty() || glob.starts_with('#') {
        return Ok(());
    }
    Glob::new(glob).map(|_| ())
}

/// Drop `.` components and trailing separators. `None` for absolute paths
/// and paths climbing out through `..`.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    fn spec(patterns: &[&str]) -> IgnoreSpecification {
        IgnoreSpecification::new(patterns.iter().copied())
    }

    #[test]
    fn test_git_directory_always_ignored() {
        let ignore = IgnoreSpecification::default();
        assert_eq!(ignore.patterns(), &[".git/".to_string()]);
        assert!(ignore.matches(".git", true));
        assert!(ignore.matches(".git/objects/ab/cdef", false));
        assert!(!ignore.matches("src/main.rs", false));
    }

    #[test]
    fn test_negated_file_inside_ignored_directory() {
        let ignore = spec(&["a/", "!a/keep.txt"]);
        assert!(ignore.matches("a/other.txt", false));
        assert!(!ignore.matches("a/keep.txt", false));
        assert!(ignore.matches("a", true));
    }

    #[test_case("*.pyc", "pkg/mod.pyc", false, true ; "extension anywhere")]
    #[test_case("/build", "build", true, true ; "anchored directory")]
    #[test_case("/build", "src/build", true, false ; "anchored does not float")]
    #[test_case("docs/**/*.md", "docs/a/b/c.md", false, true ; "double star")]
    #[test_case("cache/", "cache", false, false ; "directory pattern skips files")]
    #[test_case("cache/", "cache/x.bin", false, true ; "directory pattern covers children")]
    #[test_case("foo", "bar/foo", false, true ; "bare name matches at any depth")]
    fn test_gitignore_semantics(pattern: &str, path: &str, is_dir: bool, expected: bool) {
        assert_eq!(spec(&[pattern]).matches(path, is_dir), expected);
    }

    #[test]
    fn test_trailing_separator_is_irrelevant() {
        let ignore = spec(&["out/"]);
        assert_eq!(ignore.matches("out", true), ignore.matches("out/", true));
        assert!(ignore.file_is_ignored("out/"));
        assert!(!ignore.file_is_ignored("out"));
    }

    #[test]
    fn test_malformed_pattern_is_skipped() {
        let ignore = spec(&["[", "*.log"]);
        assert!(ignore.matches("debug.log", false));
        assert!(!ignore.matches("[", false));
        assert_eq!(ignore.patterns().len(), 3);
    }

    #[test_case("[" ; "unclosed class")]
    #[test_case("!src/[a-" ; "negated unclosed range")]
    #[test_case("docs/{a,b" ; "unclosed alternation")]
    fn test_malformed_glob_is_rejected(pattern: &str) {
        assert!(check_glob(pattern).is_err());
    }

    #[test_case("" ; "blank")]
    #[test_case("# comment [" ; "comment")]
    #[test_case("!/build/" ; "anchored negated directory")]
    #[test_case("docs/**/*.md" ; "double star")]
    fn test_wellformed_glob_is_accepted(pattern: &str) {
        assert!(check_glob(pattern).is_ok());
    }

    #[test]
    fn test_root_and_escaping_paths_never_ignored() {
        let ignore = spec(&["*"]);
        assert!(!ignore.matches("", true));
        assert!(!ignore.matches(".", true));
        assert!(!ignore.matches("../elsewhere", false));
        assert!(ignore.matches("./anything", false));
    }

    fn name() -> impl Strategy<Value = String> {
        "[a-m]{1,6}"
    }

    fn unrelated_pattern() -> impl Strategy<Value = String> {
        ("[n-z]{1,6}", 0..3u8).prop_map(|(name, shape)| match shape {
            0 => name,
            1 => format!("{name}/"),
            _ => format!("!{name}"),
        })
    }

    proptest! {
        #[test]
        fn prop_matching_is_idempotent(patterns in prop::collection::vec(name(), 0..5), path in name()) {
            let ignore = IgnoreSpecification::new(patterns);
            prop_assert_eq!(ignore.matches(&path, false), ignore.matches(&path, false));
        }

        #[test]
        fn prop_appended_negation_reverses_verdict(dir in name(), file in name()) {
            let path = format!("{dir}/{file}");
            let ignored = IgnoreSpecification::new([path.clone()]);
            prop_assert!(ignored.matches(&path, false));

            let reincluded = IgnoreSpecification::new([path.clone(), format!("!{path}")]);
            prop_assert!(!reincluded.matches(&path, false));
        }

        #[test]
        fn prop_unrelated_patterns_keep_verdict(
            patterns in prop::collection::vec(name(), 0..4),
            extra in prop::collection::vec(unrelated_pattern(), 1..4),
            path in "[a-m]{1,6}(/[a-m]{1,6}){0,2}",
        ) {
            let before = IgnoreSpecification::new(patterns.clone()).matches(&path, false);
            let after = IgnoreSpecification::new(patterns.into_iter().chain(extra)).matches(&path, false);
            prop_assert_eq!(before, after);
        }
    }
}
