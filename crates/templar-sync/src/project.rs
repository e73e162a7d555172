//! Initialize-or-update of one generated project, with its hooks.

use crate::error::{SyncError, SyncResult};
use crate::hooks::{HookKind, HookRunner};
use crate::render::{InitRequest, RenderError, Renderer, TemplateTracking, UpdateRequest};
use std::fs;
use std::path::{Path, PathBuf};
use templar_common_config::{FullRunConfiguration, TemplarConfig, TemplateData};
use templar_git::GitRepository;
use tracing::{debug, info, instrument, warn};

/// Settings shared by every render of a project.
#[derive(Debug, Clone)]
pub struct ProjectOptions {
    /// Template directory.
    pub template_path: PathBuf,
    /// Directory the project folder lives in.
    pub out_root: PathBuf,
    /// Never prompt.
    pub no_input: bool,
    /// Commit manual changes so an update can proceed.
    pub auto_commit: bool,
    /// Write the data a render used back into the config file.
    pub save: bool,
    /// Give up on merge conflicts instead of asking.
    pub abort_on_conflict: bool,
    /// Folder name to use when the template does not pick one.
    pub default_folder_name: String,
}

/// How an update attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The project was re-rendered and post-update hooks ran.
    Updated,
    /// Nothing changed.
    NoChanges,
    /// A merge conflict was declined.
    Aborted,
}

/// Render operations on one project, bound to a config and run profile.
pub struct ProjectOps<'a> {
    config: &'a mut TemplarConfig,
    run_config: &'a mut FullRunConfiguration,
    renderer: &'a dyn Renderer,
    tracking: &'a dyn TemplateTracking,
    options: &'a ProjectOptions,
}

impl<'a> ProjectOps<'a> {
    /// Bind the operations to their collaborators.
    pub fn new(
        config: &'a mut TemplarConfig,
        run_config: &'a mut FullRunConfiguration,
        renderer: &'a dyn Renderer,
        tracking: &'a dyn TemplateTracking,
        options: &'a ProjectOptions,
    ) -> Self {
        Self {
            config,
            run_config,
            renderer,
            tracking,
            options,
        }
    }

    /// Update the project in `known_folder`, or generate it if there is no
    /// known folder or the folder is missing or empty. Returns the folder.
    #[instrument(skip(self, data), fields(out_root = %self.options.out_root.display()))]
    pub fn update_or_initialize(&mut self, known_folder: Option<&str>, data: &TemplateData) -> SyncResult<String> {
        fs::create_dir_all(&self.options.out_root)?;
        self.run_hook(HookKind::PreCheck, &self.options.out_root)?;

        let Some(folder) = known_folder else {
            return self.initialize(data);
        };
        if is_non_empty_dir(&self.options.out_root.join(folder)) {
            self.update(folder, data)?;
            Ok(folder.to_string())
        } else {
            debug!(folder, "known project folder is missing or empty, initializing");
            self.initialize(data)
        }
    }

    /// Generate the project, run `post_init` hooks and save the data.
    pub fn initialize(&mut self, data: &TemplateData) -> SyncResult<String> {
        let request = InitRequest {
            template: self.options.template_path.clone(),
            destination: self.options.out_root.clone(),
            data: data.clone(),
            no_input: self.options.no_input,
            default_folder_name: self.options.default_folder_name.clone(),
        };
        let folder = self.renderer.initialize(&request)?;
        let project = self.options.out_root.join(&folder);
        info!("Initialized project in {}", project.display());

        self.run_hook(HookKind::PostInit, &project)?;
        if self.options.save {
            self.save_data(&project)?;
        }
        Ok(folder)
    }

    /// Re-render the project in `folder`.
    ///
    /// A dirty tree is committed and the update retried once when
    /// auto-commit is on; otherwise it is an error and nothing after
    /// `pre_update` runs.
    pub fn update(&mut self, folder: &str, data: &TemplateData) -> SyncResult<UpdateOutcome> {
        let project = self.options.out_root.join(folder);
        self.run_hook(HookKind::PreUpdate, &project)?;

        let request = UpdateRequest {
            project: project.clone(),
            data: vec![data.clone()],
            no_input: self.options.no_input,
            abort_on_conflict: self.options.abort_on_conflict,
        };

        let first = self.renderer.update(&request);
        let result = match first {
            Err(RenderError::DirtyWorkTree { .. }) if self.options.auto_commit => {
                let message = self.run_config.config.commit_message().to_string();
                info!("Auto-committing manual changes in {}", project.display());
                GitRepository::open(&project)?.commit_all(&message)?;
                self.renderer.update(&request)
            }
            other => other,
        };

        match result {
            Ok(()) => {}
            Err(RenderError::NoChanges) => {
                info!("No changes to update in {}", project.display());
                return Ok(UpdateOutcome::NoChanges);
            }
            Err(RenderError::ConflictAborted) => {
                warn!("Update of {} aborted on merge conflict", project.display());
                return Ok(UpdateOutcome::Aborted);
            }
            Err(RenderError::DirtyWorkTree { .. }) => {
                return Err(SyncError::DirtyWorkTree { project });
            }
            Err(e) => return Err(e.into()),
        }

        info!("Updated project in {}", project.display());
        self.run_hook(HookKind::PostUpdate, &project)?;
        if self.options.save {
            self.save_data(&project)?;
        }
        Ok(UpdateOutcome::Updated)
    }

    /// Record the data the project was last rendered with in the config.
    pub fn save_data(&mut self, project: &Path) -> SyncResult<()> {
        let data = self.tracking.applied_data(project)?;
        self.config.save_data_for_run_config(&mut *self.run_config, data)?;
        debug!(run_config = %self.run_config.name, "saved template data to config");
        Ok(())
    }

    fn run_hook(&self, kind: HookKind, cwd: &Path) -> SyncResult<()> {
        HookRunner::new(&*self.config, &*self.run_config).run(kind, cwd)
    }
}

fn is_non_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{MockRenderer, MockTemplateTracking};
    use mockall::Sequence;
    use templar_common_config::{CommandKind, RunConfiguration, Runnable};
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _dir: TempDir,
        config: TemplarConfig,
        run_config: FullRunConfiguration,
        options: ProjectOptions,
    }

    fn fixture(run: RunConfiguration, auto_commit: bool) -> Fixture {
        let dir = tempdir().unwrap();
        let options = ProjectOptions {
            template_path: dir.path().join("template"),
            out_root: dir.path().join("out"),
            no_input: true,
            auto_commit,
            save: false,
            abort_on_conflict: true,
            default_folder_name: "project".to_string(),
        };
        Fixture {
            _dir: dir,
            config: TemplarConfig::default(),
            run_config: FullRunConfiguration {
                name: "default".to_string(),
                command: CommandKind::Serve,
                config: run,
                data: None,
            },
            options,
        }
    }

    fn marker_hooks() -> RunConfiguration {
        RunConfiguration {
            post_init: Some(vec![Runnable::Command("touch post_init".into())]),
            post_update: Some(vec![Runnable::Command("touch post_update".into())]),
            ..RunConfiguration::default()
        }
    }

    fn make_project(options: &ProjectOptions, folder: &str) -> PathBuf {
        let project = options.out_root.join(folder);
        fs::create_dir_all(&project).unwrap();
        fs::write(project.join("README.md"), "hi\n").unwrap();
        project
    }

    #[test]
    fn test_unknown_folder_always_initializes() {
        let mut f = fixture(marker_hooks(), false);
        let out_root = f.options.out_root.clone();
        let mut renderer = MockRenderer::new();
        renderer
            .expect_initialize()
            .withf(|req| req.default_folder_name == "project" && req.no_input)
            .times(1)
            .returning(move |req| {
                fs::create_dir_all(req.destination.join("app")).unwrap();
                Ok("app".to_string())
            });
        renderer.expect_update().never();
        let tracking = MockTemplateTracking::new();

        let mut ops = ProjectOps::new(&mut f.config, &mut f.run_config, &renderer, &tracking, &f.options);
        let folder = ops.update_or_initialize(None, &TemplateData::new()).unwrap();

        assert_eq!(folder, "app");
        assert!(out_root.join("app/post_init").exists());
    }

    #[test]
    fn test_known_folder_updates() {
        let mut f = fixture(marker_hooks(), false);
        let project = make_project(&f.options, "app");
        let mut renderer = MockRenderer::new();
        renderer.expect_initialize().never();
        renderer
            .expect_update()
            .withf(|req| req.data.len() == 1 && req.abort_on_conflict)
            .times(1)
            .returning(|_| Ok(()));
        let tracking = MockTemplateTracking::new();

        let mut ops = ProjectOps::new(&mut f.config, &mut f.run_config, &renderer, &tracking, &f.options);
        assert_eq!(ops.update_or_initialize(Some("app"), &TemplateData::new()).unwrap(), "app");
        assert!(project.join("post_update").exists());
    }

    #[test]
    fn test_known_but_missing_folder_initializes() {
        let mut f = fixture(RunConfiguration::default(), false);
        let mut renderer = MockRenderer::new();
        renderer.expect_initialize().times(1).returning(|_| Ok("app".to_string()));
        let tracking = MockTemplateTracking::new();

        let mut ops = ProjectOps::new(&mut f.config, &mut f.run_config, &renderer, &tracking, &f.options);
        assert_eq!(ops.update_or_initialize(Some("app"), &TemplateData::new()).unwrap(), "app");
    }

    #[test]
    fn test_no_changes_skips_post_update() {
        let mut f = fixture(marker_hooks(), false);
        let project = make_project(&f.options, "app");
        let mut renderer = MockRenderer::new();
        renderer.expect_update().returning(|_| Err(RenderError::NoChanges));
        let tracking = MockTemplateTracking::new();

        let mut ops = ProjectOps::new(&mut f.config, &mut f.run_config, &renderer, &tracking, &f.options);
        assert_eq!(ops.update("app", &TemplateData::new()).unwrap(), UpdateOutcome::NoChanges);
        assert!(!project.join("post_update").exists());
    }

    #[test]
    fn test_dirty_tree_without_auto_commit_blocks_update() {
        let mut f = fixture(marker_hooks(), false);
        let project = make_project(&f.options, "app");
        let mut renderer = MockRenderer::new();
        let mut seq = Sequence::new();
        let dirty_project = project.clone();
        renderer
            .expect_update()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| {
                Err(RenderError::DirtyWorkTree {
                    project: dirty_project.clone(),
                })
            });
        renderer
            .expect_update()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        let tracking = MockTemplateTracking::new();

        let mut ops = ProjectOps::new(&mut f.config, &mut f.run_config, &renderer, &tracking, &f.options);
        let err = ops.update("app", &TemplateData::new()).unwrap_err();
        assert!(matches!(err, SyncError::DirtyWorkTree { .. }));
        assert!(!project.join("post_update").exists());

        // After the user commits, the same call goes through.
        assert_eq!(ops.update("app", &TemplateData::new()).unwrap(), UpdateOutcome::Updated);
        assert!(project.join("post_update").exists());
    }

    #[test]
    fn test_dirty_tree_with_auto_commit_commits_and_retries_once() {
        let mut f = fixture(RunConfiguration::default(), true);
        let project = make_project(&f.options, "app");
        let repo = GitRepository::init(&project).unwrap();
        repo.commit_all("initial").unwrap();
        fs::write(project.join("manual.txt"), "edit\n").unwrap();

        let mut renderer = MockRenderer::new();
        let mut seq = Sequence::new();
        let dirty_project = project.clone();
        renderer
            .expect_update()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| {
                Err(RenderError::DirtyWorkTree {
                    project: dirty_project.clone(),
                })
            });
        renderer
            .expect_update()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        let tracking = MockTemplateTracking::new();

        let mut ops = ProjectOps::new(&mut f.config, &mut f.run_config, &renderer, &tracking, &f.options);
        assert_eq!(ops.update("app", &TemplateData::new()).unwrap(), UpdateOutcome::Updated);

        assert!(!repo.is_dirty().unwrap());
        let head = repo.get_commit(&repo.head_oid().unwrap()).unwrap();
        assert_eq!(head.summary, templar_common_config::DEFAULT_AUTO_COMMIT_MESSAGE);
    }

    #[test]
    fn test_conflict_abort_is_quiet() {
        let mut f = fixture(marker_hooks(), false);
        let project = make_project(&f.options, "app");
        let mut renderer = MockRenderer::new();
        renderer.expect_update().returning(|_| Err(RenderError::ConflictAborted));
        let tracking = MockTemplateTracking::new();

        let mut ops = ProjectOps::new(&mut f.config, &mut f.run_config, &renderer, &tracking, &f.options);
        assert_eq!(ops.update("app", &TemplateData::new()).unwrap(), UpdateOutcome::Aborted);
        assert!(!project.join("post_update").exists());
    }

    #[test]
    fn test_save_writes_applied_data_to_config() {
        let mut f = fixture(RunConfiguration::default(), false);
        f.options.save = true;
        let config_path = f.options.out_root.parent().unwrap().join("templar.yaml");
        f.config.path = Some(config_path.clone());

        let mut renderer = MockRenderer::new();
        renderer.expect_initialize().returning(|_| Ok("app".to_string()));
        let mut tracking = MockTemplateTracking::new();
        tracking
            .expect_applied_data()
            .returning(|_| Ok(TemplateData::from([("q1".to_string(), "a1".into())])));

        let mut ops = ProjectOps::new(&mut f.config, &mut f.run_config, &renderer, &tracking, &f.options);
        ops.update_or_initialize(None, &TemplateData::new()).unwrap();

        assert_eq!(f.run_config.config.data_name.as_deref(), Some("default"));
        let written = fs::read_to_string(config_path).unwrap();
        assert!(written.contains("q1: a1"), "{written}");
    }
}
