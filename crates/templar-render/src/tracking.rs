//! Tracking metadata written into every rendered project.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use templar_common_config::TemplateData;
use templar_sync::{RenderError, RendererBranches, SyncError, SyncResult, TemplateSource, TemplateTracking};

/// Metadata file name, at the project root.
pub const TRACKING_FILE: &str = ".templar.json";

/// Branch name recorded for pristine renders.
pub const TEMPLATE_BRANCH: &str = "templar-template";
/// Branch name recorded for merged renders.
pub const MERGED_BRANCH: &str = "templar-merged";

/// One template a project was rendered from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedSource {
    /// Template directory.
    pub location: String,
    /// Render root inside the template.
    pub render_relative_root: PathBuf,
}

/// Contents of the tracking file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingFile {
    /// Data of the last render.
    pub data: TemplateData,
    /// Templates applied to the project.
    pub template_sources: Vec<TrackedSource>,
    /// Files the last render produced, relative and `/`-separated.
    #[serde(default)]
    pub rendered_files: Vec<String>,
    /// Branch for pristine renders.
    pub template_branch: String,
    /// Branch for merged renders.
    pub merged_branch: String,
}

impl TrackingFile {
    /// Fresh tracking for a single template.
    pub fn new(source: TrackedSource, data: TemplateData, rendered_files: Vec<String>) -> Self {
        Self {
            data,
            template_sources: vec![source],
            rendered_files,
            template_branch: TEMPLATE_BRANCH.to_string(),
            merged_branch: MERGED_BRANCH.to_string(),
        }
    }

    /// Read the tracking file of `project`.
    pub fn read(project: &Path) -> Result<Self, RenderError> {
        let path = project.join(TRACKING_FILE);
        let content = fs::read_to_string(&path)
            .map_err(|e| RenderError::Failed(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| RenderError::Failed(format!("invalid {}: {e}", path.display())))
    }

    /// Write the tracking file of `project`.
    pub fn write(&self, project: &Path) -> Result<(), RenderError> {
        let path = project.join(TRACKING_FILE);
        let mut content = serde_json::to_string_pretty(self)
            .map_err(|e| RenderError::Failed(format!("cannot serialize tracking: {e}")))?;
        content.push('\n');
        fs::write(&path, content)
            .map_err(|e| RenderError::Failed(format!("cannot write {}: {e}", path.display())))
    }
}

/// [`TemplateTracking`] backed by the tracking file.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTracking;

impl LocalTracking {
    fn read(project: &Path) -> SyncResult<TrackingFile> {
        TrackingFile::read(project).map_err(SyncError::from)
    }
}

impl TemplateTracking for LocalTracking {
    fn applied_data(&self, project: &Path) -> SyncResult<TemplateData> {
        Ok(Self::read(project)?.data)
    }

    fn template_sources(&self, project: &Path) -> SyncResult<Vec<TemplateSource>> {
        Ok(Self::read(project)?
            .template_sources
            .into_iter()
            .map(|s| TemplateSource {
                location: s.location,
                render_relative_root: s.render_relative_root,
            })
            .collect())
    }

    fn branch_names(&self, project: &Path) -> SyncResult<RendererBranches> {
        let tracking = Self::read(project)?;
        Ok(RendererBranches {
            template_branch: tracking.template_branch,
            merged_branch: tracking.merged_branch,
        })
    }
}
