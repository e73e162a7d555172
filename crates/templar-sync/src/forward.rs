//! Forward sync: re-render the output whenever the template changes.
//!
//! A notify watcher feeds change events over a channel to a single worker
//! thread, so renders never overlap. Each event is filtered (missing path,
//! template root, ignored, debounced) before it triggers a pass.

use crate::debounce::Debouncer;
use crate::error::SyncResult;
use crate::ignore::IgnoreSpecification;
use crate::project::{ProjectOps, ProjectOptions};
use crate::render::{Renderer, TemplateTracking};
use crossbeam_channel::RecvTimeoutError;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use templar_common_config::{
    merge_data_preferring_non_null, CommandKind, FullRunConfiguration, TemplarConfig, TemplateData,
    DEFAULT_PROJECT_NAME,
};
use templar_common_log::spans::{render_pass_span, Timer};
use templar_common_thread::ManagedThread;
use templar_git::GitRepository;
use tracing::{debug, error, info, warn};

const WORKER_NAME: &str = "templar-forward-sync";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Settings for a [`ForwardSync`].
#[derive(Debug, Clone)]
pub struct ForwardSyncOptions {
    /// Template directory to watch.
    pub template_path: PathBuf,
    /// Directory the project folder is rendered into.
    pub out_root: PathBuf,
    /// Run profile to use; `default` if `None`.
    pub run_config_name: Option<String>,
    /// Never prompt.
    pub no_input: bool,
    /// Commit manual output changes so updates can proceed.
    pub auto_commit: bool,
    /// Save rendered data back to the config file.
    pub save: bool,
    /// Data overriding the data profile's (nulls do not override).
    pub data: Option<TemplateData>,
    /// Folder name overriding the data profile's.
    pub folder_name: Option<String>,
}

/// What forward sync knows about the output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    /// Project folder under the output root, once rendered.
    pub folder: Option<String>,
    /// Project repository root, once the folder is a git repository.
    pub repo: Option<PathBuf>,
    /// Whether the template is being watched.
    pub watching: bool,
}

/// Config state a render pass mutates. Its mutex is the pass lock.
struct PassState {
    config: TemplarConfig,
    run_config: FullRunConfiguration,
}

struct Inner {
    options: ForwardSyncOptions,
    template_root: PathBuf,
    project: ProjectOptions,
    ignore: IgnoreSpecification,
    renderer: Arc<dyn Renderer>,
    tracking: Arc<dyn TemplateTracking>,
    pass: Mutex<PassState>,
    state: Mutex<SyncState>,
    debouncer: Mutex<Debouncer>,
    passes: AtomicU64,
}

struct Watch {
    watcher: RecommendedWatcher,
    worker: ManagedThread,
}

/// The forward-sync engine.
pub struct ForwardSync {
    inner: Arc<Inner>,
    watch: Mutex<Option<Watch>>,
    stopped: AtomicBool,
}

impl ForwardSync {
    /// Resolve the `serve` run profile and prepare the engine. Nothing is
    /// rendered or watched yet.
    pub fn new(
        options: ForwardSyncOptions,
        config: TemplarConfig,
        renderer: Arc<dyn Renderer>,
        tracking: Arc<dyn TemplateTracking>,
    ) -> SyncResult<Self> {
        let run_config = config.full_run_config(CommandKind::Serve, options.run_config_name.as_deref())?;
        let ignore = IgnoreSpecification::new(run_config.ignore_patterns().iter().cloned());
        let default_folder_name = options
            .folder_name
            .clone()
            .or_else(|| run_config.data.as_ref().map(|d| d.use_folder_name().to_string()))
            .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string());
        let template_root = fs::canonicalize(&options.template_path)?;

        let project = ProjectOptions {
            template_path: options.template_path.clone(),
            out_root: options.out_root.clone(),
            no_input: options.no_input,
            auto_commit: options.auto_commit,
            save: options.save,
            abort_on_conflict: false,
            default_folder_name,
        };

        Ok(Self {
            inner: Arc::new(Inner {
                options,
                template_root,
                project,
                ignore,
                renderer,
                tracking,
                pass: Mutex::new(PassState { config, run_config }),
                state: Mutex::new(SyncState::default()),
                debouncer: Mutex::new(Debouncer::default()),
                passes: AtomicU64::new(0),
            }),
            watch: Mutex::new(None),
            stopped: AtomicBool::new(false),
        })
    }

    /// Run one render pass now, returning the project folder.
    pub fn sync_output(&self) -> SyncResult<String> {
        self.inner.sync_output("initial sync")
    }

    /// Start watching the template. A no-op if already watching.
    pub fn start(&self) -> SyncResult<()> {
        self.stopped.store(false, Ordering::SeqCst);
        self.start_watch()
    }

    /// Stop watching and wait for an in-flight pass to finish.
    pub fn pause(&self) -> SyncResult<()> {
        let watch = self.watch.lock().take();
        let Some(Watch { watcher, worker }) = watch else {
            return Ok(());
        };
        drop(watcher);
        worker.shutdown()?;
        debug!(template = %self.inner.options.template_path.display(), "stopped watching template");
        Ok(())
    }

    /// Start watching again after [`pause`](Self::pause). Does nothing after
    /// [`stop`](Self::stop).
    pub fn resume(&self) -> SyncResult<()> {
        if self.stopped.load(Ordering::SeqCst) {
            debug!("forward sync stopped, not resuming watch");
            return Ok(());
        }
        self.start_watch()
    }

    /// Pause until the guard is dropped.
    pub fn pause_guard(&self) -> SyncResult<PauseGuard<'_>> {
        let resume = self.is_watching();
        self.pause()?;
        Ok(PauseGuard { forward: self, resume })
    }

    /// Stop watching for good; later [`resume`](Self::resume) calls are
    /// ignored.
    pub fn stop(&self) -> SyncResult<()> {
        self.stopped.store(true, Ordering::SeqCst);
        self.pause()
    }

    /// Whether the template is being watched.
    pub fn is_watching(&self) -> bool {
        self.watch.lock().is_some()
    }

    /// Snapshot of the sync state.
    pub fn state(&self) -> SyncState {
        let watching = self.is_watching();
        SyncState {
            watching,
            ..self.inner.state.lock().clone()
        }
    }

    /// Project directory, once the first pass has run.
    pub fn out_path(&self) -> Option<PathBuf> {
        self.inner.out_path()
    }

    /// Template directory.
    pub fn template_path(&self) -> &Path {
        &self.inner.options.template_path
    }

    /// Render passes attempted so far, failed ones included.
    pub fn pass_count(&self) -> u64 {
        self.inner.passes.load(Ordering::SeqCst)
    }

    /// Resolved run profile.
    pub fn run_config(&self) -> FullRunConfiguration {
        self.inner.pass.lock().run_config.clone()
    }

    /// Feed one changed path through the event filters, rendering if it
    /// passes. Returns whether a pass ran.
    pub fn handle_change(&self, path: &Path, removed: bool) -> bool {
        self.inner.handle_change(path, removed)
    }

    fn start_watch(&self) -> SyncResult<()> {
        let mut slot = self.watch.lock();
        if slot.is_some() {
            return Ok(());
        }

        let (tx, rx) = crossbeam_channel::unbounded::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })?;
        watcher.watch(&self.inner.template_root, RecursiveMode::Recursive)?;

        let inner = Arc::clone(&self.inner);
        let worker = ManagedThread::spawn(WORKER_NAME, move |signal| {
            while !signal.is_requested() {
                match rx.recv_timeout(POLL_INTERVAL) {
                    Ok(Ok(event)) => inner.handle_event(&event),
                    Ok(Err(e)) => warn!(error = %e, "file watcher error"),
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        })?;

        *slot = Some(Watch { watcher, worker });
        debug!(template = %self.inner.options.template_path.display(), "watching template for changes");
        Ok(())
    }
}

impl Drop for ForwardSync {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "failed to stop forward sync");
        }
    }
}

/// Keeps forward sync paused while alive. Resumes on drop if it was
/// watching when the guard was taken.
pub struct PauseGuard<'a> {
    forward: &'a ForwardSync,
    resume: bool,
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        if !self.resume {
            return;
        }
        if let Err(e) = self.forward.resume() {
            error!(error = %e, "failed to resume watching template");
        }
    }
}

impl Inner {
    fn out_path(&self) -> Option<PathBuf> {
        let state = self.state.lock();
        state.folder.as_ref().map(|f| self.options.out_root.join(f))
    }

    fn data(&self, run_config: &FullRunConfiguration) -> TemplateData {
        let base = run_config.template_data();
        match &self.options.data {
            Some(cli) => merge_data_preferring_non_null([&base, cli]),
            None => base,
        }
    }

    fn sync_output(&self, trigger: &str) -> SyncResult<String> {
        let span = render_pass_span(trigger);
        let _entered = span.enter();
        let timer = Timer::start("render pass");

        let mut pass = self.pass.lock();
        self.passes.fetch_add(1, Ordering::SeqCst);
        let known = self.state.lock().folder.clone();

        let PassState { config, run_config } = &mut *pass;
        let data = self.data(run_config);
        let folder = ProjectOps::new(
            config,
            run_config,
            self.renderer.as_ref(),
            self.tracking.as_ref(),
            &self.project,
        )
        .update_or_initialize(known.as_deref(), &data)?;

        let out_path = self.options.out_root.join(&folder);
        let mut state = self.state.lock();
        state.repo = GitRepository::is_inside_repo(&out_path).then(|| out_path.clone());
        state.folder = Some(folder.clone());
        timer.finish();
        Ok(folder)
    }

    fn handle_event(&self, event: &Event) {
        let removed = match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => false,
            EventKind::Remove(_) => true,
            _ => return,
        };
        for path in &event.paths {
            self.handle_change(path, removed);
        }
    }

    fn handle_change(&self, path: &Path, removed: bool) -> bool {
        // A removed path is timed by its parent directory, which the
        // removal modified.
        let stat_path = if removed { path.parent() } else { Some(path) };
        let Some(stat_path) = stat_path.filter(|p| p.exists()) else {
            debug!(path = %path.display(), "changed path does not exist, not updating");
            return false;
        };

        let Some(relative) = self.relative(path) else {
            debug!(path = %path.display(), "change outside the template, ignoring");
            return false;
        };
        if relative.as_os_str().is_empty() {
            debug!("got template root as change, ignoring");
            return false;
        }
        let is_dir = !removed && path.is_dir();
        if self.ignore.matches(relative, is_dir) {
            debug!(path = %relative.display(), "ignored file changed, ignoring");
            return false;
        }

        let Some(mtime) = modified_time(stat_path) else {
            debug!(path = %stat_path.display(), "cannot read modification time, ignoring");
            return false;
        };
        if !self.debouncer.lock().accept(mtime) {
            debug!(path = %path.display(), "ignoring duplicate event");
            return false;
        }

        info!("Detected change in {}", path.display());
        if let Err(e) = self.sync_output("file change") {
            error!(error = %e, "failed to sync output");
        }
        true
    }

    fn relative<'p>(&self, path: &'p Path) -> Option<&'p Path> {
        path.strip_prefix(&self.template_root)
            .or_else(|_| path.strip_prefix(&self.options.template_path))
            .ok()
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{MockRenderer, MockTemplateTracking, RenderError};
    use std::fs::File;
    use templar_common_config::{DataConfiguration, UserDataConfiguration};
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        dir: TempDir,
        template: PathBuf,
        out_root: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let template = dir.path().join("template");
        let out_root = dir.path().join("out");
        fs::create_dir_all(template.join("ignored")).unwrap();
        Fixture {
            dir,
            template,
            out_root,
        }
    }

    fn config_with_ignore(patterns: &[&str]) -> TemplarConfig {
        let mut config = TemplarConfig::default();
        config.data.insert(
            "default".to_string(),
            UserDataConfiguration {
                data: TemplateData::from([("q1".to_string(), "a1".into())]),
                ignore: patterns.iter().map(|p| p.to_string()).collect(),
                ..UserDataConfiguration::default()
            },
        );
        config
    }

    fn engine(f: &Fixture, renderer: MockRenderer, config: TemplarConfig) -> ForwardSync {
        let options = ForwardSyncOptions {
            template_path: f.template.clone(),
            out_root: f.out_root.clone(),
            run_config_name: None,
            no_input: true,
            auto_commit: false,
            save: false,
            data: None,
            folder_name: None,
        };
        ForwardSync::new(options, config, Arc::new(renderer), Arc::new(MockTemplateTracking::new())).unwrap()
    }

    fn touch(path: &Path, mtime: SystemTime) {
        let file = File::options().create(true).append(true).open(path).unwrap();
        file.set_modified(mtime).unwrap();
    }

    fn base_time() -> SystemTime {
        SystemTime::now() - Duration::from_secs(60)
    }

    fn counting_renderer(times: usize) -> MockRenderer {
        let mut renderer = MockRenderer::new();
        renderer.expect_initialize().times(times).returning(|_| Ok("project".to_string()));
        renderer
    }

    #[test]
    fn test_events_within_window_render_once() {
        let f = fixture();
        let forward = engine(&f, counting_renderer(1), config_with_ignore(&[]));
        let file = forward.inner.template_root.join("a.txt");
        let t0 = base_time();

        touch(&file, t0);
        assert!(forward.handle_change(&file, false));
        touch(&file, t0 + Duration::from_millis(200));
        assert!(!forward.handle_change(&file, false));
        assert_eq!(forward.pass_count(), 1);
    }

    #[test]
    fn test_events_outside_window_render_twice() {
        let f = fixture();
        let forward = engine(&f, counting_renderer(2), config_with_ignore(&[]));
        let file = forward.inner.template_root.join("a.txt");
        let t0 = base_time();

        touch(&file, t0);
        assert!(forward.handle_change(&file, false));
        touch(&file, t0 + Duration::from_millis(1500));
        assert!(forward.handle_change(&file, false));
        assert_eq!(forward.pass_count(), 2);
    }

    #[test]
    fn test_filters_skip_root_missing_and_ignored_paths() {
        let f = fixture();
        let forward = engine(&f, counting_renderer(0), config_with_ignore(&["ignored/", "*.log"]));
        let root = forward.inner.template_root.clone();

        assert!(!forward.handle_change(&root, false));
        assert!(!forward.handle_change(&root.join("missing.txt"), false));

        let log = root.join("debug.log");
        touch(&log, base_time());
        assert!(!forward.handle_change(&log, false));

        let nested = root.join("ignored/file.txt");
        touch(&nested, base_time());
        assert!(!forward.handle_change(&nested, false));
        assert!(!forward.handle_change(&root.join("ignored"), false));

        let git = root.join(".git");
        fs::create_dir_all(&git).unwrap();
        assert!(!forward.handle_change(&git.join("HEAD"), true));

        assert_eq!(forward.pass_count(), 0);
        assert!(forward.out_path().is_none());
    }

    #[test]
    fn test_removed_file_is_timed_by_parent() {
        let f = fixture();
        let forward = engine(&f, counting_renderer(1), config_with_ignore(&[]));
        let gone = forward.inner.template_root.join("ignored-not/gone.txt");
        fs::create_dir_all(gone.parent().unwrap()).unwrap();

        assert!(forward.handle_change(&gone, true));
        assert_eq!(forward.state().folder.as_deref(), Some("project"));
    }

    #[test]
    fn test_failed_pass_is_logged_and_counted() {
        let f = fixture();
        let mut renderer = MockRenderer::new();
        renderer
            .expect_initialize()
            .times(1)
            .returning(|_| Err(RenderError::Failed("template syntax".into())));
        let forward = engine(&f, renderer, config_with_ignore(&[]));
        let file = forward.inner.template_root.join("a.txt");
        touch(&file, base_time());

        assert!(forward.handle_change(&file, false));
        assert_eq!(forward.pass_count(), 1);
        assert!(forward.state().folder.is_none());
    }

    #[test]
    fn test_initial_sync_uses_data_profile_and_cli_overrides() {
        let f = fixture();
        let mut renderer = MockRenderer::new();
        renderer
            .expect_initialize()
            .withf(|req| {
                req.data.get("q1") == Some(&serde_json::Value::from("a1"))
                    && req.data.get("q2") == Some(&serde_json::Value::from(2))
                    && req.default_folder_name == "custom"
            })
            .times(1)
            .returning(|_| Ok("custom".to_string()));
        let options = ForwardSyncOptions {
            template_path: f.template.clone(),
            out_root: f.out_root.clone(),
            run_config_name: None,
            no_input: true,
            auto_commit: false,
            save: false,
            data: Some(TemplateData::from([
                ("q1".to_string(), serde_json::Value::Null),
                ("q2".to_string(), 2.into()),
            ])),
            folder_name: Some("custom".to_string()),
        };
        let forward = ForwardSync::new(
            options,
            config_with_ignore(&[]),
            Arc::new(renderer),
            Arc::new(MockTemplateTracking::new()),
        )
        .unwrap();

        assert_eq!(forward.sync_output().unwrap(), "custom");
        assert_eq!(forward.out_path(), Some(f.out_root.join("custom")));
        assert!(forward.state().repo.is_none());
        assert!(f.dir.path().join("out").exists());
    }

    #[test]
    fn test_default_folder_comes_from_data_profile() {
        let f = fixture();
        let mut config = TemplarConfig::default();
        config.data.insert(
            "default".to_string(),
            UserDataConfiguration {
                folder_name: Some("from-profile".to_string()),
                ..UserDataConfiguration::default()
            },
        );
        let mut renderer = MockRenderer::new();
        renderer
            .expect_initialize()
            .withf(|req| req.default_folder_name == "from-profile")
            .returning(|req| Ok(req.default_folder_name.clone()));
        let forward = engine(&f, renderer, config);
        assert_eq!(forward.sync_output().unwrap(), "from-profile");
        assert_eq!(
            forward.run_config().data,
            Some(DataConfiguration {
                folder_name: Some("from-profile".to_string()),
                ..DataConfiguration::default()
            })
        );
    }

    #[test]
    fn test_pause_resume_and_stop() {
        let f = fixture();
        let forward = engine(&f, counting_renderer(0), config_with_ignore(&[]));
        assert!(!forward.is_watching());

        forward.start().unwrap();
        assert!(forward.is_watching());

        {
            let _guard = forward.pause_guard().unwrap();
            assert!(!forward.is_watching());
        }
        assert!(forward.is_watching());

        forward.stop().unwrap();
        assert!(!forward.is_watching());
        forward.resume().unwrap();
        assert!(!forward.is_watching());

        // A guard taken while not watching leaves it that way.
        drop(forward.pause_guard().unwrap());
        assert!(!forward.is_watching());
    }
}
