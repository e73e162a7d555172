//! Collaborator interfaces: the renderer that turns a template into a
//! project, and the tracking metadata it leaves in the project.

use crate::error::{SyncError, SyncResult};
use std::path::{Path, PathBuf};
use templar_common_config::TemplateData;
use thiserror::Error;

/// Marker line identifying commits made by the renderer itself.
pub const TRANSACTION_MARKER: &str = "templar-transaction:";

/// Signals a renderer raises. The first three are expected outcomes the
/// project operations react to.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Re-rendering produced no changes.
    #[error("no changes to apply")]
    NoChanges,

    /// The project has uncommitted manual changes.
    #[error("project at {} has uncommitted changes", project.display())]
    DirtyWorkTree {
        /// Project directory.
        project: PathBuf,
    },

    /// A merge conflict needed resolution and the user declined.
    #[error("update aborted because of merge conflicts")]
    ConflictAborted,

    /// Anything else.
    #[error("render failed: {0}")]
    Failed(String),
}

/// Arguments to [`Renderer::initialize`].
#[derive(Debug, Clone, PartialEq)]
pub struct InitRequest {
    /// Template location.
    pub template: PathBuf,
    /// Directory the project folder is created in.
    pub destination: PathBuf,
    /// Template data.
    pub data: TemplateData,
    /// Never prompt.
    pub no_input: bool,
    /// Folder name to use when the template does not pick one.
    pub default_folder_name: String,
}

/// Arguments to [`Renderer::update`].
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    /// Project directory.
    pub project: PathBuf,
    /// Data for each applied template, in tracking order.
    pub data: Vec<TemplateData>,
    /// Never prompt.
    pub no_input: bool,
    /// Give up on merge conflicts instead of asking.
    pub abort_on_conflict: bool,
}

/// Renders templates into projects.
#[cfg_attr(test, mockall::automock)]
pub trait Renderer: Send + Sync {
    /// Generate a new project under `request.destination`, returning the
    /// folder name it was created in.
    fn initialize(&self, request: &InitRequest) -> Result<String, RenderError>;

    /// Re-render an existing project from its template.
    fn update(&self, request: &UpdateRequest) -> Result<(), RenderError>;
}

/// Where a project's template lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSource {
    /// Template location.
    pub location: String,
    /// Directory inside the template that maps to the project root.
    pub render_relative_root: PathBuf,
}

/// Branches the renderer keeps for its own merge bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererBranches {
    /// Branch holding pristine renders.
    pub template_branch: String,
    /// Branch merging pristine renders with user changes.
    pub merged_branch: String,
}

impl RendererBranches {
    /// Both names.
    pub fn names(&self) -> [&str; 2] {
        [&self.template_branch, &self.merged_branch]
    }
}

/// Reads what the renderer recorded in a generated project.
#[cfg_attr(test, mockall::automock)]
pub trait TemplateTracking: Send + Sync {
    /// Data most recently rendered with.
    fn applied_data(&self, project: &Path) -> SyncResult<TemplateData>;

    /// Every declared template source.
    fn template_sources(&self, project: &Path) -> SyncResult<Vec<TemplateSource>>;

    /// The renderer's bookkeeping branch names.
    fn branch_names(&self, project: &Path) -> SyncResult<RendererBranches>;

    /// Whether `message` is one of the renderer's own commits.
    fn is_transaction_commit(&self, message: &str) -> bool {
        message.lines().any(|line| line.trim_start().starts_with(TRANSACTION_MARKER))
    }
}

/// The single template source of `project`.
pub fn single_template_source(
    tracking: &dyn TemplateTracking,
    project: &Path,
) -> SyncResult<TemplateSource> {
    let mut sources = tracking.template_sources(project)?;
    match sources.len() {
        1 => Ok(sources.remove(0)),
        count => Err(SyncError::MultipleTemplateSources {
            project: project.to_path_buf(),
            count,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(location: &str) -> TemplateSource {
        TemplateSource {
            location: location.to_string(),
            render_relative_root: PathBuf::from("."),
        }
    }

    #[test]
    fn test_single_template_source() {
        let mut tracking = MockTemplateTracking::new();
        tracking
            .expect_template_sources()
            .returning(|_| Ok(vec![source("/templates/app")]));

        let found = single_template_source(&tracking, Path::new("/out/app")).unwrap();
        assert_eq!(found.location, "/templates/app");
    }

    #[test]
    fn test_several_template_sources_fail_fast() {
        let mut tracking = MockTemplateTracking::new();
        tracking
            .expect_template_sources()
            .returning(|_| Ok(vec![source("/a"), source("/b")]));

        let err = single_template_source(&tracking, Path::new("/out")).unwrap_err();
        assert!(matches!(err, SyncError::MultipleTemplateSources { count: 2, .. }));
        assert!(err.is_user_input());
    }

    #[test]
    fn test_no_template_source_fails() {
        let mut tracking = MockTemplateTracking::new();
        tracking.expect_template_sources().returning(|_| Ok(vec![]));
        assert!(single_template_source(&tracking, Path::new("/out")).is_err());
    }

    struct MarkerOnly;

    impl TemplateTracking for MarkerOnly {
        fn applied_data(&self, _: &Path) -> SyncResult<TemplateData> {
            Ok(TemplateData::new())
        }
        fn template_sources(&self, _: &Path) -> SyncResult<Vec<TemplateSource>> {
            Ok(vec![])
        }
        fn branch_names(&self, _: &Path) -> SyncResult<RendererBranches> {
            Ok(RendererBranches {
                template_branch: "t".into(),
                merged_branch: "m".into(),
            })
        }
    }

    #[test]
    fn test_transaction_commit_detection() {
        let tracking = MarkerOnly;
        assert!(tracking.is_transaction_commit("templar: update\n\ntemplar-transaction: 42\n"));
        assert!(!tracking.is_transaction_commit("fix typo in README"));
        assert!(!tracking.is_transaction_commit("mention templar-transaction: in docs"));
    }
}
