//! `templar publish`: render the template once into a lasting output, for
//! one run configuration or all of them.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueHint};
use templar_common_config::{CommandKind, FullRunConfiguration, TemplarConfig, DEFAULT_PROJECT_NAME};
use templar_render::{DirectoryRenderer, LocalTracking};
use templar_sync::{ProjectOps, ProjectOptions, SyncResult};

use crate::args::TemplateArgs;
use crate::error::CliError;

/// Generate or update a project from the template, once
#[derive(Debug, Parser)]
pub struct PublishCommand {
    #[command(flatten)]
    pub template: TemplateArgs,

    /// Output root
    #[arg(
        short = 'o',
        long,
        value_hint = ValueHint::DirPath,
        help = "Directory the project is published into (default: the run configuration's out_root)"
    )]
    pub out: Option<PathBuf>,

    /// Give up on merge conflicts instead of asking
    #[arg(long, help = "Abort the update on merge conflicts")]
    pub abort_on_conflict: bool,

    /// Publish every run configuration
    #[arg(long, conflicts_with = "run_config", help = "Publish every run configuration")]
    pub all: bool,

    /// Keep the default run configuration when others exist
    #[arg(
        long,
        requires = "all",
        help = "With --all, also publish the default run configuration when others exist"
    )]
    pub include_default: bool,

    /// Run configurations to leave out
    #[arg(
        long,
        value_name = "NAME",
        requires = "all",
        help = "With --all, skip this run configuration (repeatable)"
    )]
    pub exclude: Vec<String>,
}

impl PublishCommand {
    fn out_root(&self, run_config: &FullRunConfiguration) -> Result<PathBuf, CliError> {
        self.out
            .clone()
            .or_else(|| run_config.config.out_root.clone())
            .ok_or_else(|| {
                CliError::validation(
                    format!("no output directory for run configuration '{}'", run_config.name),
                    "Pass --out or set out_root in the run configuration",
                )
            })
    }

    /// Run configurations `--all` publishes, in name order.
    fn selected_run_configs(&self, config: &TemplarConfig) -> Result<Vec<String>, CliError> {
        let names: Vec<String> = config
            .run_config_names(self.include_default)
            .into_iter()
            .filter(|name| !self.exclude.iter().any(|excluded| excluded == name))
            .map(str::to_string)
            .collect();
        if names.is_empty() {
            return Err(CliError::validation(
                "no run configurations left to publish",
                "Check the run_configs section of the config file and the --exclude flags",
            ));
        }
        Ok(names)
    }

    fn options(&self, run_config: &FullRunConfiguration) -> Result<ProjectOptions, CliError> {
        Ok(ProjectOptions {
            template_path: self.template.template.clone(),
            out_root: self.out_root(run_config)?,
            no_input: self.template.no_input,
            auto_commit: false,
            save: self.template.save,
            abort_on_conflict: self.abort_on_conflict,
            default_folder_name: run_config
                .data
                .as_ref()
                .map(|d| d.use_folder_name().to_string())
                .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string()),
        })
    }

    pub async fn execute(&self) -> Result<(), CliError> {
        let mut config = self.template.load_config()?;
        let names = if self.all {
            self.selected_run_configs(&config)?.into_iter().map(Some).collect()
        } else {
            vec![self.template.run_config.clone()]
        };

        let mut plan = Vec::with_capacity(names.len());
        for name in names {
            let run_config = config.full_run_config(CommandKind::Publish, name.as_deref())?;
            let options = self.options(&run_config)?;
            plan.push((run_config, options));
        }

        let projects = tokio::task::spawn_blocking(move || -> SyncResult<Vec<PathBuf>> {
            plan.into_iter()
                .map(|(mut run_config, options)| publish(&mut config, &mut run_config, &options))
                .collect()
        })
        .await
        .context("publish panicked")??;

        for project in projects {
            println!("Published {}", project.display());
        }
        Ok(())
    }
}

fn publish(
    config: &mut TemplarConfig,
    run_config: &mut FullRunConfiguration,
    options: &ProjectOptions,
) -> SyncResult<PathBuf> {
    let data = run_config.template_data();
    let known_folder = options.default_folder_name.clone();
    let renderer = DirectoryRenderer::new();
    let folder = ProjectOps::new(config, run_config, &renderer, &LocalTracking, options)
        .update_or_initialize(Some(&known_folder), &data)?;
    Ok(options.out_root.join(folder))
}
