//! Built-in renderer for Templar.
//!
//! Renders a template directory with handlebars into a git-tracked project
//! and records what it did in a tracking file, so the sync engines can run
//! without an external templating tool.

#![warn(missing_docs)]

pub mod manifest;
pub mod renderer;
pub mod tracking;

pub use manifest::{TemplateManifest, MANIFEST_FILE};
pub use renderer::{transaction_message, DirectoryRenderer, TEMPLATE_SUFFIX};
pub use tracking::{LocalTracking, TrackedSource, TrackingFile, TRACKING_FILE};
