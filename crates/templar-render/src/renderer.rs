//! Renders a template directory with handlebars.
//!
//! Every path segment under the render root is a handlebars template.
//! Files ending in `.jinja` have the suffix stripped and their contents
//! rendered too; everything else is copied as is. The project is a git
//! repository and every render is committed with a transaction message.

use crate::manifest::{TemplateManifest, MANIFEST_FILE};
use crate::tracking::{TrackedSource, TrackingFile, TRACKING_FILE};
use chrono::Utc;
use handlebars::Handlebars;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use templar_common_config::{TemplateData, CONFIG_FILE_NAMES};
use templar_git::GitRepository;
use templar_sync::{InitRequest, RenderError, Renderer, UpdateRequest, TRANSACTION_MARKER};
use tracing::{debug, info, instrument};
use walkdir::{DirEntry, WalkDir};

/// Suffix marking files whose contents are rendered.
pub const TEMPLATE_SUFFIX: &str = ".jinja";

/// Commit message for a render.
pub fn transaction_message(action: &str) -> String {
    let id = Utc::now().format("%Y%m%dT%H%M%S%.6fZ");
    format!("templar: {action}\n\n{TRANSACTION_MARKER} {id}\n")
}

fn failed(context: &str, err: impl std::fmt::Display) -> RenderError {
    RenderError::Failed(format!("{context}: {err}"))
}

/// The built-in renderer.
pub struct DirectoryRenderer {
    registry: Handlebars<'static>,
}

impl DirectoryRenderer {
    /// Renderer with HTML escaping off.
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        registry.register_escape_fn(handlebars::no_escape);
        Self { registry }
    }

    fn render_str(&self, template: &str, context: &Value) -> Result<String, RenderError> {
        self.registry
            .render_template(template, context)
            .map_err(|e| failed("template error", e))
    }

    /// Render the template tree into `project`, returning the produced
    /// files relative to it, `/`-separated and sorted.
    pub fn render_tree(
        &self,
        template: &Path,
        manifest: &TemplateManifest,
        data: &TemplateData,
        project: &Path,
    ) -> Result<Vec<String>, RenderError> {
        let root = template.join(&manifest.render_root);
        if !root.is_dir() {
            return Err(RenderError::Failed(format!(
                "render root {} is not a directory",
                root.display()
            )));
        }
        let context = serde_json::to_value(data).map_err(|e| failed("invalid template data", e))?;

        let mut produced = BTreeSet::new();
        let walker = WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_vcs_dir(entry));
        for entry in walker {
            let entry = entry.map_err(|e| failed("cannot walk template", e))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&root)
                .map_err(|e| failed("cannot walk template", e))?;
            if is_template_metadata(relative) {
                continue;
            }

            let (target, render_contents) = self.target_path(relative, &context)?;
            let out = project.join(&target);
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent).map_err(|e| failed("cannot create directory", e))?;
            }
            if render_contents {
                let source = fs::read_to_string(entry.path())
                    .map_err(|e| failed(&format!("cannot read {}", entry.path().display()), e))?;
                let rendered = self.render_str(&source, &context)?;
                fs::write(&out, rendered).map_err(|e| failed(&format!("cannot write {}", out.display()), e))?;
            } else {
                fs::copy(entry.path(), &out).map_err(|e| failed(&format!("cannot copy to {}", out.display()), e))?;
            }
            debug!(source = %relative.display(), target = %target.display(), "rendered file");
            produced.insert(slash_path(&target));
        }
        Ok(produced.into_iter().collect())
    }

    fn target_path(&self, relative: &Path, context: &Value) -> Result<(PathBuf, bool), RenderError> {
        let mut target = PathBuf::new();
        let mut render_contents = false;
        let segments: Vec<_> = relative.components().collect();
        for (i, component) in segments.iter().enumerate() {
            let raw = component.as_os_str().to_string_lossy();
            let mut segment = self.render_str(&raw, context)?;
            if i + 1 == segments.len() {
                if let Some(stripped) = segment.strip_suffix(TEMPLATE_SUFFIX) {
                    segment = stripped.to_string();
                    render_contents = true;
                }
            }
            if segment.is_empty() {
                return Err(RenderError::Failed(format!(
                    "path segment '{raw}' of {} renders empty",
                    relative.display()
                )));
            }
            target.push(segment);
        }
        if target.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(RenderError::Failed(format!(
                "{} renders to {}, outside the project",
                relative.display(),
                target.display()
            )));
        }
        Ok((target, render_contents))
    }

    fn folder_name(&self, manifest: &TemplateManifest, data: &TemplateData, default: &str) -> Result<String, RenderError> {
        let folder = match &manifest.folder_name {
            Some(expr) => {
                let context = serde_json::to_value(data).map_err(|e| failed("invalid template data", e))?;
                self.render_str(expr, &context)?.trim().to_string()
            }
            None => default.to_string(),
        };
        let mut components = Path::new(&folder).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(folder),
            _ => Err(RenderError::Failed(format!("invalid project folder name '{folder}'"))),
        }
    }
}

impl Default for DirectoryRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for DirectoryRenderer {
    #[instrument(skip_all, fields(template = %request.template.display()))]
    fn initialize(&self, request: &InitRequest) -> Result<String, RenderError> {
        let manifest = TemplateManifest::load(&request.template)?;
        let data = manifest.data_with(&request.data);
        let folder = self.folder_name(&manifest, &data, &request.default_folder_name)?;
        let project = request.destination.join(&folder);
        fs::create_dir_all(&project).map_err(|e| failed("cannot create project", e))?;

        let files = self.render_tree(&request.template, &manifest, &data, &project)?;
        let location = fs::canonicalize(&request.template).unwrap_or_else(|_| request.template.clone());
        let source = TrackedSource {
            location: location.display().to_string(),
            render_relative_root: manifest.render_root.clone(),
        };
        TrackingFile::new(source, data, files).write(&project)?;

        let repo = match GitRepository::open(&project) {
            Ok(repo) => repo,
            Err(_) => GitRepository::init(&project).map_err(|e| failed("cannot create repository", e))?,
        };
        let has_commits = repo.try_head_oid().map_err(|e| failed("cannot read HEAD", e))?.is_some();
        if !has_commits || repo.is_dirty().map_err(|e| failed("cannot read status", e))? {
            repo.commit_all(&transaction_message("initialize"))
                .map_err(|e| failed("cannot commit render", e))?;
        }

        info!("Rendered template into {}", project.display());
        Ok(folder)
    }

    #[instrument(skip_all, fields(project = %request.project.display()))]
    fn update(&self, request: &UpdateRequest) -> Result<(), RenderError> {
        let project = &request.project;
        let mut tracking = TrackingFile::read(project)?;
        let repo = GitRepository::open(project).map_err(|e| failed("cannot open project repository", e))?;
        if repo.is_dirty().map_err(|e| failed("cannot read status", e))? {
            return Err(RenderError::DirtyWorkTree {
                project: project.clone(),
            });
        }

        let source = tracking
            .template_sources
            .first()
            .cloned()
            .ok_or_else(|| RenderError::Failed("project has no template source".to_string()))?;
        let template = PathBuf::from(&source.location);
        let manifest = TemplateManifest::load(&template)?;
        let supplied = request.data.first().unwrap_or(&tracking.data);
        let data = manifest.data_with(supplied);

        let files = self.render_tree(&template, &manifest, &data, project)?;
        for stale in tracking.rendered_files.iter().filter(|f| !files.contains(*f)) {
            remove_rendered(project, stale)?;
        }

        tracking.data = data;
        tracking.rendered_files = files;
        tracking.template_sources[0].render_relative_root = manifest.render_root.clone();
        tracking.write(project)?;

        if !repo.is_dirty().map_err(|e| failed("cannot read status", e))? {
            return Err(RenderError::NoChanges);
        }
        repo.commit_all(&transaction_message("update"))
            .map_err(|e| failed("cannot commit render", e))?;
        info!("Updated {}", project.display());
        Ok(())
    }
}

fn is_vcs_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name() == ".git"
}

fn is_template_metadata(relative: &Path) -> bool {
    let Some(name) = relative.to_str() else {
        return false;
    };
    name == MANIFEST_FILE || name == TRACKING_FILE || CONFIG_FILE_NAMES.contains(&name)
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Remove a file the previous render produced, and any directories it
/// leaves empty.
fn remove_rendered(project: &Path, relative: &str) -> Result<(), RenderError> {
    let path = project.join(relative);
    match fs::remove_file(&path) {
        Ok(()) => debug!(file = %relative, "removed stale file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(failed(&format!("cannot remove {}", path.display()), e)),
    }
    let mut dir = path.parent();
    while let Some(current) = dir {
        if current == project || fs::remove_dir(current).is_err() {
            break;
        }
        dir = current.parent();
    }
    Ok(())
}
