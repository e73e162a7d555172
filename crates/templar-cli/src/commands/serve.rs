//! `templar serve`: keep an output project in sync with a template.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueHint};
use templar_common_config::{CommandKind, TemplateData};
use templar_render::{DirectoryRenderer, LocalTracking};
use templar_sync::{ServeOptions, SyncCoordinator};
use tracing::info;

use crate::args::{parse_data, parse_duration, TemplateArgs};
use crate::error::CliError;

/// Render the template, then re-render on every change until Ctrl-C
#[derive(Debug, Parser)]
pub struct ServeCommand {
    #[command(flatten)]
    pub template: TemplateArgs,

    /// Output root
    #[arg(
        short = 'o',
        long,
        value_hint = ValueHint::DirPath,
        help = "Directory to render the project into (default: a temporary directory)"
    )]
    pub out: Option<PathBuf>,

    /// Replay commits made in the output onto the template
    #[arg(short = 'b', long, help = "Replay commits made in the output onto the template")]
    pub back_sync: bool,

    /// How often back-sync checks the output for new commits
    #[arg(
        long,
        default_value = "1s",
        value_parser = parse_duration,
        requires = "back_sync",
        help = "Back-sync polling interval (e.g. 500ms, 2s)"
    )]
    pub check_interval: Duration,

    /// Apply replayed commits to the template without committing them
    #[arg(
        long,
        requires = "back_sync",
        help = "Leave back-synced changes uncommitted in the template"
    )]
    pub no_back_sync_auto_commit: bool,

    /// Do not commit manual changes in the output before updating
    #[arg(short = 'a', long, help = "Do not auto-commit manual changes in the output")]
    pub no_auto_commit: bool,

    /// Template data overriding the data profile
    #[arg(short = 'd', long, value_parser = parse_data, help = "Template data as a JSON object")]
    pub data: Option<TemplateData>,

    /// Output folder name overriding the data profile
    #[arg(short = 'f', long, help = "Project folder name")]
    pub folder_name: Option<String>,
}

impl ServeCommand {
    fn options(&self, out_root: Option<PathBuf>) -> ServeOptions {
        ServeOptions {
            template_path: self.template.template.clone(),
            out_root,
            run_config_name: self.template.run_config.clone(),
            no_input: self.template.no_input,
            auto_commit: !self.no_auto_commit,
            save: self.template.save,
            data: self.data.clone(),
            folder_name: self.folder_name.clone(),
            back_sync: self.back_sync,
            back_sync_auto_commit: !self.no_back_sync_auto_commit,
            back_sync_check_interval: self.check_interval,
        }
    }

    pub async fn execute(&self) -> Result<(), CliError> {
        let config = self.template.load_config()?;
        let run_config = config.full_run_config(CommandKind::Serve, self.template.run_config.as_deref())?;
        let out_root = self.out.clone().or(run_config.config.out_root);
        let options = self.options(out_root);

        let mut coordinator = tokio::task::spawn_blocking(move || {
            SyncCoordinator::start(
                options,
                config,
                Arc::new(DirectoryRenderer::new()),
                Arc::new(LocalTracking),
            )
        })
        .await
        .context("serve startup panicked")??;

        if let Some(project) = coordinator.out_path() {
            println!("Serving {} (Ctrl-C to stop)", project.display());
        }

        tokio::signal::ctrl_c()
            .await
            .map_err(|e| CliError::io("failed to listen for Ctrl-C", e))?;
        info!("Shutting down");

        tokio::task::spawn_blocking(move || coordinator.shutdown())
            .await
            .context("serve shutdown panicked")?
            .map_err(CliError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};

    fn parse(args: &[&str]) -> ServeCommand {
        let cli = Cli::try_parse_from(["templar", "serve"].iter().chain(args)).unwrap();
        match cli.command {
            Command::Serve(serve) => serve,
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults() {
        let serve = parse(&[]);
        let options = serve.options(None);
        assert_eq!(options.template_path, PathBuf::from("."));
        assert!(options.out_root.is_none());
        assert!(options.auto_commit);
        assert!(!options.back_sync);
        assert_eq!(options.back_sync_check_interval, Duration::from_secs(1));
        assert!(options.back_sync_auto_commit);
        assert!(options.run_config_name.is_none());
    }

    #[test]
    fn test_flags_map_to_options() {
        let serve = parse(&[
            "dev",
            "-t",
            "tmpl",
            "-o",
            "out",
            "--back-sync",
            "--check-interval",
            "250ms",
            "--no-auto-commit",
            "--no-back-sync-auto-commit",
            "--no-input",
            "--data",
            r#"{"q1": "a1"}"#,
            "--folder-name",
            "app",
        ]);
        assert_eq!(serve.out, Some(PathBuf::from("out")));
        let options = serve.options(serve.out.clone());
        assert_eq!(options.run_config_name.as_deref(), Some("dev"));
        assert_eq!(options.template_path, PathBuf::from("tmpl"));
        assert!(options.back_sync);
        assert!(!options.auto_commit);
        assert!(!options.back_sync_auto_commit);
        assert!(options.no_input);
        assert_eq!(options.back_sync_check_interval, Duration::from_millis(250));
        assert_eq!(options.data.unwrap()["q1"], "a1");
        assert_eq!(options.folder_name.as_deref(), Some("app"));
    }

    #[test]
    fn test_back_sync_flags_require_back_sync() {
        let result = Cli::try_parse_from(["templar", "serve", "--check-interval", "2s"]);
        assert!(result.is_err());
        let result = Cli::try_parse_from(["templar", "serve", "--no-back-sync-auto-commit"]);
        assert!(result.is_err());
    }
}
