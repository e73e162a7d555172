//! Hook commands run around renders.

use crate::error::{SyncError, SyncResult};
use handlebars::Handlebars;
use serde_json::Value;
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use templar_common_config::{FullRunConfiguration, RunConfiguration, Runnable, TemplarConfig, UserCommand};
use tracing::{debug, info, instrument, warn};

/// When a hook list runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Before anything else, in the output root.
    PreCheck,
    /// After the project is first generated.
    PostInit,
    /// Before an update.
    PreUpdate,
    /// After a successful update.
    PostUpdate,
}

impl HookKind {
    /// Config key of the hook list.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreCheck => "pre_check",
            Self::PostInit => "post_init",
            Self::PreUpdate => "pre_update",
            Self::PostUpdate => "post_update",
        }
    }

    /// Runnables configured for this hook.
    pub fn runnables<'a>(&self, config: &'a RunConfiguration) -> &'a [Runnable] {
        let list = match self {
            Self::PreCheck => &config.pre_check,
            Self::PostInit => &config.post_init,
            Self::PreUpdate => &config.pre_update,
            Self::PostUpdate => &config.post_update,
        };
        list.as_deref().unwrap_or(&[])
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve runnables to commands, looking up `{id}` references among the
/// global commands.
pub fn resolve_runnables(runnables: &[Runnable], config: &TemplarConfig) -> SyncResult<Vec<UserCommand>> {
    runnables
        .iter()
        .map(|runnable| match runnable {
            Runnable::Command(run) => Ok(UserCommand::from_run(run.clone())),
            Runnable::Inline(command) => Ok(command.clone()),
            Runnable::Reference { id } => Ok(config.global_command(id)?.clone()),
        })
        .collect()
}

/// Runs hook lists for one run profile.
pub struct HookRunner<'a> {
    config: &'a TemplarConfig,
    run_config: &'a FullRunConfiguration,
    registry: Handlebars<'static>,
}

impl<'a> HookRunner<'a> {
    /// Runner for `run_config`, resolving references against `config`.
    pub fn new(config: &'a TemplarConfig, run_config: &'a FullRunConfiguration) -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        Self {
            config,
            run_config,
            registry,
        }
    }

    /// Run every command of `kind` in `cwd`, in order. A failing foreground
    /// command stops the list.
    #[instrument(skip(self), fields(hook = %kind))]
    pub fn run(&self, kind: HookKind, cwd: &Path) -> SyncResult<()> {
        let runnables = kind.runnables(&self.run_config.config);
        if runnables.is_empty() {
            return Ok(());
        }
        let commands = resolve_runnables(runnables, self.config)?;
        let context = self.run_config.template_context().map_err(|e| SyncError::Hook {
            command: kind.to_string(),
            reason: format!("cannot build template context: {e}"),
        })?;

        info!("Running {} commands", kind);
        for command in &commands {
            let line = self.render(command, &context)?;
            run_command(command, &line, cwd)?;
        }
        Ok(())
    }

    fn render(&self, command: &UserCommand, context: &Value) -> SyncResult<String> {
        self.registry
            .render_template(&command.run, context)
            .map_err(|e| SyncError::Hook {
                command: command.display_name().to_string(),
                reason: format!("invalid command template: {e}"),
            })
    }
}

/// Run one rendered command line through `sh -c`, streaming its output
/// into the log. Background commands are spawned and left running.
pub fn run_command(command: &UserCommand, line: &str, cwd: &Path) -> SyncResult<()> {
    let name = command.display_name().to_string();
    info!("Running command: {}", name);
    debug!(command = %line, cwd = %cwd.display(), "spawning shell");

    let failed = |reason: String| SyncError::Hook {
        command: name.clone(),
        reason,
    };

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(line)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| failed(format!("failed to spawn: {e}")))?;

    let stdout = child.stdout.take().map(|out| stream_lines(out, name.clone(), false));
    let stderr = child.stderr.take().map(|err| stream_lines(err, name.clone(), true));

    if command.background {
        // Reap the child once it exits so it never lingers as a zombie.
        let reaper_name = name.clone();
        thread::spawn(move || match child.wait() {
            Ok(status) if !status.success() => {
                warn!(command = %reaper_name, %status, "background command failed");
            }
            Ok(_) => debug!(command = %reaper_name, "background command finished"),
            Err(e) => warn!(command = %reaper_name, error = %e, "lost background command"),
        });
        return Ok(());
    }

    let status = child.wait().map_err(|e| failed(format!("failed to wait: {e}")))?;
    for reader in [stdout, stderr].into_iter().flatten() {
        let _ = reader.join();
    }

    if status.success() {
        Ok(())
    } else {
        Err(failed(format!("exited with {status}")))
    }
}

fn stream_lines<R>(reader: R, name: String, is_stderr: bool) -> thread::JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        for line in BufReader::new(reader).lines() {
            match line {
                Ok(line) if is_stderr => info!(command = %name, stream = "stderr", "{}", line),
                Ok(line) => info!(command = %name, "{}", line),
                Err(e) => {
                    debug!(command = %name, error = %e, "stopped reading command output");
                    break;
                }
            }
        }
    })
}
