//! Back sync: replay commits made in the output project onto the template.
//!
//! A polling loop compares the project's HEAD with the last commit it has
//! seen. New commits that the renderer did not make itself are cherry-picked
//! onto a temporary branch, and the diff of each replayed commit is applied
//! to the template while forward sync is paused.

use crate::apply::DiffApplier;
use crate::diff::PatchSet;
use crate::error::{SyncError, SyncResult};
use crate::forward::ForwardSync;
use crate::render::{single_template_source, RendererBranches, TemplateTracking};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use templar_common_log::spans::replay_span;
use templar_common_thread::ManagedThread;
use templar_git::{DiffOptions, GitCommit, GitError, GitOid, GitRepository, TemporaryBranch};
use tracing::{debug, error, info, warn};

const WORKER_NAME: &str = "templar-back-sync";

/// How often the project HEAD is checked by default.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// How long [`BackSync::stop`] waits for the loop to exit.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for a [`BackSync`].
#[derive(Debug, Clone)]
pub struct BackSyncOptions {
    /// Template directory; its repository is found by searching upward.
    pub template_path: PathBuf,
    /// Output project; must be a repository root.
    pub project_path: PathBuf,
    /// Commit each replayed change in the template repository.
    pub auto_commit: bool,
    /// Polling interval.
    pub check_interval: Duration,
}

impl BackSyncOptions {
    /// Options with auto-commit on and the default interval.
    pub fn new(template_path: impl Into<PathBuf>, project_path: impl Into<PathBuf>) -> Self {
        Self {
            template_path: template_path.into(),
            project_path: project_path.into(),
            auto_commit: true,
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }
}

/// Progress through the project history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackSyncState {
    /// Last project commit accounted for.
    pub last_commit: GitOid,
    /// HEAD at the time of the last failed pass. Passes are not retried
    /// until HEAD moves on.
    pub failed_head: Option<GitOid>,
}

struct Inner {
    options: BackSyncOptions,
    forward: Arc<ForwardSync>,
    tracking: Arc<dyn TemplateTracking>,
    project_repo: GitRepository,
    template_repo: GitRepository,
    template_output: PathBuf,
    branches: RendererBranches,
    state: Mutex<BackSyncState>,
    /// Held for the whole of a pass so `sync` and the loop never overlap.
    pass: Mutex<()>,
    is_syncing: AtomicBool,
    is_sleeping: AtomicBool,
}

/// The back-sync engine.
pub struct BackSync {
    inner: Arc<Inner>,
    worker: Mutex<Option<ManagedThread>>,
}

impl BackSync {
    /// Open both repositories and start tracking from the project's current
    /// HEAD. Commits that already exist are never replayed.
    pub fn new(
        options: BackSyncOptions,
        forward: Arc<ForwardSync>,
        tracking: Arc<dyn TemplateTracking>,
    ) -> SyncResult<Self> {
        let project_repo = GitRepository::open(&options.project_path)?;
        let template_repo = GitRepository::discover(&options.template_path)?;
        let last_commit = project_repo.head_oid()?;

        let source = single_template_source(tracking.as_ref(), &options.project_path)?;
        let template_output = options.template_path.join(&source.render_relative_root);
        let branches = tracking.branch_names(&options.project_path)?;

        debug!(
            project = %options.project_path.display(),
            template = %template_output.display(),
            last_commit = %last_commit.short(),
            "back sync ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                options,
                forward,
                tracking,
                project_repo,
                template_repo,
                template_output,
                branches,
                state: Mutex::new(BackSyncState {
                    last_commit,
                    failed_head: None,
                }),
                pass: Mutex::new(()),
                is_syncing: AtomicBool::new(false),
                is_sleeping: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        })
    }

    /// Check the project HEAD once and replay anything new. Returns whether
    /// a pass ran.
    pub fn tick(&self) -> SyncResult<bool> {
        self.inner.tick()
    }

    /// Replay everything between the last seen commit and HEAD now, even if
    /// the same HEAD failed before.
    pub fn sync(&self) -> SyncResult<()> {
        let head = self.inner.project_repo.head_oid()?;
        self.inner.sync_to(head)
    }

    /// Start the polling loop. A no-op if it is already running.
    pub fn start(&self) -> SyncResult<()> {
        let mut slot = self.worker.lock();
        if slot.is_some() {
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        let worker = ManagedThread::spawn(WORKER_NAME, move |signal| loop {
            inner.is_sleeping.store(true, Ordering::SeqCst);
            let stop = signal.wait(inner.options.check_interval);
            inner.is_sleeping.store(false, Ordering::SeqCst);
            if stop {
                break;
            }
            if let Err(e) = inner.tick() {
                error!(error = %e, "back sync failed");
            }
        })?;

        *slot = Some(worker);
        debug!(project = %self.inner.options.project_path.display(), "back sync loop started");
        Ok(())
    }

    /// Stop the polling loop. A pass in progress runs to completion unless
    /// it outlasts [`STOP_TIMEOUT`].
    pub fn stop(&self) -> SyncResult<()> {
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };
        debug!("stopping back sync loop");
        worker.shutdown_timeout(STOP_TIMEOUT)?;
        Ok(())
    }

    /// Whether the polling loop is running.
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Whether a replay is in progress.
    pub fn is_syncing(&self) -> bool {
        self.inner.is_syncing.load(Ordering::SeqCst)
    }

    /// Whether the loop is waiting between checks.
    pub fn is_sleeping(&self) -> bool {
        self.inner.is_sleeping.load(Ordering::SeqCst)
    }

    /// Snapshot of the progress state.
    pub fn state(&self) -> BackSyncState {
        *self.inner.state.lock()
    }

    /// Directory replayed changes are applied to.
    pub fn template_output(&self) -> &Path {
        &self.inner.template_output
    }
}

impl Drop for BackSync {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "failed to stop back sync");
        }
    }
}

/// Clears `is_syncing` however the pass ends.
struct SyncingFlag<'a>(&'a AtomicBool);

impl<'a> SyncingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for SyncingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Inner {
    fn tick(&self) -> SyncResult<bool> {
        let head = self.project_repo.head_oid()?;
        let state = *self.state.lock();
        if head == state.last_commit {
            return Ok(false);
        }
        if state.failed_head == Some(head) {
            return Ok(false);
        }
        self.sync_to(head)?;
        Ok(true)
    }

    fn sync_to(&self, head: GitOid) -> SyncResult<()> {
        let _pass = self.pass.lock();
        let from = self.state.lock().last_commit;
        if from == head {
            return Ok(());
        }
        let _syncing = SyncingFlag::raise(&self.is_syncing);

        let mut applied = None;
        let result = self.replay(&from, &head, &mut applied);

        let mut state = self.state.lock();
        match result {
            Ok(()) => {
                state.last_commit = head;
                state.failed_head = None;
                Ok(())
            }
            Err(e) => {
                if let Some(last) = applied {
                    state.last_commit = last;
                }
                state.failed_head = Some(head);
                Err(e)
            }
        }
    }

    /// Candidate commits in `(from, to]`, oldest first.
    ///
    /// Transaction commits and merges of a renderer branch tip are the
    /// renderer's own. Everything else is the user's, including commits a
    /// renderer branch was later cut from.
    fn candidates(&self, from: &GitOid, to: &GitOid) -> SyncResult<Vec<GitCommit>> {
        let mut renderer_tips = HashSet::new();
        for branch in self.branches.names() {
            renderer_tips.extend(self.project_repo.branch_tip(branch)?);
        }

        let commits = self.project_repo.commits_between(from, to)?;
        Ok(commits
            .into_iter()
            .filter(|commit| {
                let from_renderer = self.tracking.is_transaction_commit(&commit.message)
                    || (commit.is_merge() && commit.parents.iter().any(|p| renderer_tips.contains(p)));
                if from_renderer {
                    debug!(commit = %commit.oid.short(), summary = %commit.summary, "skipping renderer commit");
                }
                !from_renderer
            })
            .collect())
    }

    /// Replay candidates after `from` up to `to`. `applied` tracks the last
    /// original commit whose changes reached the template.
    fn replay(&self, from: &GitOid, to: &GitOid, applied: &mut Option<GitOid>) -> SyncResult<()> {
        let candidates = self.candidates(from, to)?;
        if candidates.is_empty() {
            debug!("skipping back sync as there are no new user commits");
            return Ok(());
        }

        let span = replay_span(&from.short(), &to.short(), candidates.len());
        let _entered = span.enter();
        let listing: Vec<String> = candidates
            .iter()
            .map(|c| format!("{}: {}", c.oid.short(), c.summary))
            .collect();
        info!("Back-syncing commits: {}", listing.join(", "));

        let first = &candidates[0];
        let base = *first.first_parent().ok_or_else(|| {
            SyncError::replay(
                &first.oid,
                GitError::InvalidOperation {
                    message: "cannot replay a root commit".to_string(),
                }
                .into(),
            )
        })?;

        let _paused = self.forward.pause_guard()?;

        let originals: Vec<GitOid> = candidates.iter().map(|c| c.oid).collect();
        let mut branch = TemporaryBranch::create(&self.project_repo, &base, &originals)?;
        let mut replayed = Vec::with_capacity(candidates.len());
        for commit in &candidates {
            let new_oid = branch
                .cherry_pick(&commit.oid)
                .map_err(|e| SyncError::replay(&commit.oid, e.into()))?;
            replayed.push(new_oid);
        }

        let mut previous = base;
        for (commit, new_oid) in candidates.iter().zip(replayed) {
            self.apply_commit(commit, &previous, &new_oid)
                .map_err(|e| SyncError::replay(&commit.oid, e))?;
            *applied = Some(commit.oid);
            previous = new_oid;
        }
        Ok(())
    }

    fn apply_commit(&self, original: &GitCommit, old: &GitOid, new: &GitOid) -> SyncResult<()> {
        let patch = self
            .project_repo
            .diff_commits_patch(old, new, &DiffOptions::default())?;
        let patch = PatchSet::parse(&patch)?;
        debug!(commit = %original.oid.short(), files = patch.files.len(), "applying diff to template");

        let report = DiffApplier::apply(&patch, &self.template_output)?;
        if report.total() == 0 {
            debug!(commit = %original.oid.short(), "nothing to apply");
            return Ok(());
        }

        if self.options.auto_commit {
            info!("Committing change: {}", original.summary);
            self.template_repo.commit_all(&original.message)?;
        }
        Ok(())
    }
}
