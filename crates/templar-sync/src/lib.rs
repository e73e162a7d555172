//! Bidirectional sync between a template and the project rendered from it.
//!
//! Forward sync watches the template and re-renders the output on every
//! change. Back sync polls the output repository and replays commits made
//! there onto the template. The [`SyncCoordinator`] runs both and keeps
//! them from stepping on each other.

#![warn(missing_docs)]

pub mod apply;
pub mod back;
pub mod coordinator;
pub mod debounce;
pub mod diff;
pub mod error;
pub mod forward;
pub mod hooks;
pub mod ignore;
pub mod project;
pub mod render;

pub use apply::{ApplyReport, DiffApplier};
pub use back::{BackSync, BackSyncOptions, BackSyncState};
pub use coordinator::{ServeOptions, ServerStatus, SyncCoordinator};
pub use debounce::Debouncer;
pub use diff::{FileDiff, Hunk, HunkLine, PatchSet};
pub use error::{SyncError, SyncResult};
pub use forward::{ForwardSync, ForwardSyncOptions, PauseGuard, SyncState};
pub use hooks::{HookKind, HookRunner};
pub use ignore::IgnoreSpecification;
pub use project::{ProjectOps, ProjectOptions, UpdateOutcome};
pub use render::{
    InitRequest, RenderError, Renderer, RendererBranches, TemplateSource, TemplateTracking, UpdateRequest,
    TRANSACTION_MARKER,
};
