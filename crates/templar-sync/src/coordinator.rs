//! Wires forward sync and back sync together for `serve`.

use crate::back::{BackSync, BackSyncOptions, DEFAULT_CHECK_INTERVAL};
use crate::error::SyncResult;
use crate::forward::{ForwardSync, ForwardSyncOptions};
use crate::render::{Renderer, TemplateTracking};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use templar_common_config::{TemplarConfig, TemplateData};
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

/// Settings for a serve session.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Template directory.
    pub template_path: PathBuf,
    /// Output root; a temporary directory when `None`.
    pub out_root: Option<PathBuf>,
    /// Run profile name.
    pub run_config_name: Option<String>,
    /// Never prompt.
    pub no_input: bool,
    /// Commit manual output changes so updates can proceed.
    pub auto_commit: bool,
    /// Save rendered data back to the config file.
    pub save: bool,
    /// Data overriding the data profile's.
    pub data: Option<TemplateData>,
    /// Folder name overriding the data profile's.
    pub folder_name: Option<String>,
    /// Replay output commits onto the template.
    pub back_sync: bool,
    /// Commit replayed changes in the template repository.
    pub back_sync_auto_commit: bool,
    /// Back-sync polling interval.
    pub back_sync_check_interval: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            template_path: PathBuf::from("."),
            out_root: None,
            run_config_name: None,
            no_input: false,
            auto_commit: true,
            save: false,
            data: None,
            folder_name: None,
            back_sync: false,
            back_sync_auto_commit: true,
            back_sync_check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }
}

/// Point-in-time view of a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatus {
    /// A back-sync replay is in progress.
    pub is_back_syncing: bool,
    /// The back-sync loop is waiting between checks.
    pub back_sync_is_sleeping: bool,
    /// The template is being watched.
    pub is_watching: bool,
    /// Project directory.
    pub out_path: Option<PathBuf>,
}

/// A running serve session. Shuts down when dropped.
pub struct SyncCoordinator {
    forward: Arc<ForwardSync>,
    back: Option<BackSync>,
    out_root: PathBuf,
    temp_dir: Option<TempDir>,
    shut_down: bool,
}

impl SyncCoordinator {
    /// Render once, start watching the template, then start back sync on
    /// the rendered project if requested.
    #[instrument(skip_all, fields(template = %options.template_path.display()))]
    pub fn start(
        options: ServeOptions,
        config: TemplarConfig,
        renderer: Arc<dyn Renderer>,
        tracking: Arc<dyn TemplateTracking>,
    ) -> SyncResult<Self> {
        let (out_root, temp_dir) = match &options.out_root {
            Some(root) => (root.clone(), None),
            None => {
                let dir = tempfile::Builder::new().prefix("templar-serve-").tempdir()?;
                (dir.path().to_path_buf(), Some(dir))
            }
        };
        info!(
            "Starting server, watching for changes in {}. Generating output at {}",
            options.template_path.display(),
            out_root.display()
        );

        let forward = ForwardSync::new(
            ForwardSyncOptions {
                template_path: options.template_path.clone(),
                out_root: out_root.clone(),
                run_config_name: options.run_config_name.clone(),
                no_input: options.no_input,
                auto_commit: options.auto_commit,
                save: options.save,
                data: options.data.clone(),
                folder_name: options.folder_name.clone(),
            },
            config,
            renderer,
            Arc::clone(&tracking),
        )?;
        let forward = Arc::new(forward);

        let folder = forward.sync_output()?;
        forward.start()?;
        let project = out_root.join(&folder);
        info!(
            "Running auto-reloader, updating {} with changes to {}",
            project.display(),
            options.template_path.display()
        );

        let back = if options.back_sync {
            let back = BackSync::new(
                BackSyncOptions {
                    template_path: options.template_path.clone(),
                    project_path: project,
                    auto_commit: options.back_sync_auto_commit,
                    check_interval: options.back_sync_check_interval,
                },
                Arc::clone(&forward),
                tracking,
            )?;
            back.start()?;
            Some(back)
        } else {
            None
        };

        Ok(Self {
            forward,
            back,
            out_root,
            temp_dir,
            shut_down: false,
        })
    }

    /// Whether a back-sync replay is in progress.
    pub fn is_back_syncing(&self) -> bool {
        self.back.as_ref().is_some_and(BackSync::is_syncing)
    }

    /// Whether the back-sync loop is waiting between checks.
    pub fn back_sync_is_sleeping(&self) -> bool {
        self.back.as_ref().is_some_and(BackSync::is_sleeping)
    }

    /// Project directory.
    pub fn out_path(&self) -> Option<PathBuf> {
        self.forward.out_path()
    }

    /// Output root, temporary or not.
    pub fn out_root(&self) -> &Path {
        &self.out_root
    }

    /// Forward-sync engine.
    pub fn forward(&self) -> &ForwardSync {
        &self.forward
    }

    /// Back-sync engine, if running.
    pub fn back(&self) -> Option<&BackSync> {
        self.back.as_ref()
    }

    /// Snapshot of the session state.
    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            is_back_syncing: self.is_back_syncing(),
            back_sync_is_sleeping: self.back_sync_is_sleeping(),
            is_watching: self.forward.is_watching(),
            out_path: self.out_path(),
        }
    }

    /// Stop back sync, then the watch, then remove a temporary output root.
    pub fn shutdown(&mut self) -> SyncResult<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        if let Some(back) = self.back.take() {
            back.stop()?;
        }
        self.forward.stop()?;
        if let Some(dir) = self.temp_dir.take() {
            debug!(path = %dir.path().display(), "removing temporary output");
            dir.close()?;
        }
        info!("Server stopped");
        Ok(())
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "failed to shut down cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{MockRenderer, MockTemplateTracking};
    use crate::SyncError;
    use std::fs;
    use tempfile::tempdir;

    fn renderer() -> Arc<dyn Renderer> {
        let mut renderer = MockRenderer::new();
        renderer.expect_initialize().returning(|req| {
            fs::create_dir_all(req.destination.join("project")).unwrap();
            Ok("project".to_string())
        });
        Arc::new(renderer)
    }

    #[test]
    fn test_temporary_output_is_removed_on_shutdown() {
        let template = tempdir().unwrap();
        let options = ServeOptions {
            template_path: template.path().to_path_buf(),
            no_input: true,
            ..ServeOptions::default()
        };

        let mut coordinator = SyncCoordinator::start(
            options,
            TemplarConfig::default(),
            renderer(),
            Arc::new(MockTemplateTracking::new()),
        )
        .unwrap();

        let root = coordinator.out_root().to_path_buf();
        assert!(root.join("project").is_dir());
        let status = coordinator.status();
        assert_eq!(status.out_path, Some(root.join("project")));
        assert!(status.is_watching);
        assert!(!status.is_back_syncing);
        assert!(!status.back_sync_is_sleeping);

        coordinator.shutdown().unwrap();
        assert!(!root.exists());
        assert!(!coordinator.forward().is_watching());
        // A second shutdown is harmless.
        coordinator.shutdown().unwrap();
    }

    #[test]
    fn test_explicit_output_is_kept() {
        let template = tempdir().unwrap();
        let out = tempdir().unwrap();
        let options = ServeOptions {
            template_path: template.path().to_path_buf(),
            out_root: Some(out.path().to_path_buf()),
            no_input: true,
            ..ServeOptions::default()
        };

        let coordinator = SyncCoordinator::start(
            options,
            TemplarConfig::default(),
            renderer(),
            Arc::new(MockTemplateTracking::new()),
        )
        .unwrap();
        drop(coordinator);
        assert!(out.path().join("project").is_dir());
    }

    #[test]
    fn test_unknown_run_config_is_reported() {
        let template = tempdir().unwrap();
        let options = ServeOptions {
            template_path: template.path().to_path_buf(),
            run_config_name: Some("nope".to_string()),
            ..ServeOptions::default()
        };

        let result = SyncCoordinator::start(
            options,
            TemplarConfig::default(),
            Arc::new(MockRenderer::new()),
            Arc::new(MockTemplateTracking::new()),
        );
        match result {
            Err(err @ SyncError::NoSuchRunConfig(_)) => assert!(err.is_user_input()),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn test_back_sync_needs_a_repository() {
        let template = tempdir().unwrap();
        let options = ServeOptions {
            template_path: template.path().to_path_buf(),
            no_input: true,
            back_sync: true,
            ..ServeOptions::default()
        };

        let result = SyncCoordinator::start(
            options,
            TemplarConfig::default(),
            renderer(),
            Arc::new(MockTemplateTracking::new()),
        );
        assert!(matches!(result, Err(SyncError::Git(_))));
    }
}
