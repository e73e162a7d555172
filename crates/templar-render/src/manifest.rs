//! The optional `template.yaml` at a template's root.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use templar_common_config::TemplateData;
use templar_sync::RenderError;

/// Manifest file name.
pub const MANIFEST_FILE: &str = "template.yaml";

/// Template settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateManifest {
    /// Data used when the caller does not supply a key.
    pub defaults: TemplateData,
    /// Handlebars expression for the project folder name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_name: Option<String>,
    /// Directory holding the renderable tree, relative to the template.
    pub render_root: PathBuf,
}

impl Default for TemplateManifest {
    fn default() -> Self {
        Self {
            defaults: TemplateData::new(),
            folder_name: None,
            render_root: PathBuf::from("."),
        }
    }
}

impl TemplateManifest {
    /// Read the manifest of `template`, or the defaults if it has none.
    pub fn load(template: &Path) -> Result<Self, RenderError> {
        let path = template.join(MANIFEST_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(RenderError::Failed(format!("cannot read {}: {e}", path.display()))),
        };
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content)
            .map_err(|e| RenderError::Failed(format!("invalid {}: {e}", path.display())))
    }

    /// `defaults` overlaid with `data`.
    pub fn data_with(&self, data: &TemplateData) -> TemplateData {
        let mut merged = self.defaults.clone();
        merged.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}
