//! Profile lookup and `extends` resolution.
//!
//! Chains are walked explicitly, recording every visited name, so a cycle is
//! reported before anything is merged.

use crate::loader::{ConfigError, ConfigLoader};
use crate::types::{
    CommandKind, DataConfiguration, FullRunConfiguration, RunConfiguration, TemplarConfig,
    TemplateData, UserCommand, DEFAULT_PROFILE,
};

/// Walk an `extends` chain starting at `start`, returning items root-most
/// ancestor first.
fn walk_chain<T>(
    start: &str,
    lookup: impl Fn(&str) -> Option<T>,
    parent: impl Fn(&T) -> Option<String>,
    missing: impl Fn(String) -> ConfigError,
) -> Result<Vec<T>, ConfigError> {
    let mut visited: Vec<String> = Vec::new();
    let mut chain = Vec::new();
    let mut next = Some(start.to_string());

    while let Some(name) = next {
        if visited.contains(&name) {
            visited.push(name);
            return Err(ConfigError::ExtendsCycle {
                chain: visited.join(" -> "),
            });
        }
        let item = lookup(&name).ok_or_else(|| missing(name.clone()))?;
        next = parent(&item);
        visited.push(name);
        chain.push(item);
    }

    chain.reverse();
    Ok(chain)
}

impl TemplarConfig {
    /// Run configuration `name` (default `default`) for `command`, with
    /// command-specific fields over shared ones and `extends` resolved.
    pub fn run_config(
        &self,
        command: CommandKind,
        name: Option<&str>,
    ) -> Result<RunConfiguration, ConfigError> {
        let name = name.unwrap_or(DEFAULT_PROFILE);
        let chain = walk_chain(
            name,
            |n| self.run_configs.get(n).map(|root| root.for_command(command)),
            |config| config.extends.clone(),
            ConfigError::NoSuchRunConfig,
        )?;

        Ok(chain
            .iter()
            .fold(RunConfiguration::default(), |acc, config| acc.overlaid_with(config)))
    }

    /// Data profile `name` with `extends` resolved: child keys win,
    /// `folder_name` falls back to the parent, ignore lists concatenate
    /// parent first.
    pub fn data_config(&self, name: &str) -> Result<DataConfiguration, ConfigError> {
        let chain = walk_chain(
            name,
            |n| self.data.get(n).cloned(),
            |profile| profile.extends.clone(),
            ConfigError::NoSuchData,
        )?;

        let mut resolved = DataConfiguration::default();
        for profile in &chain {
            resolved
                .data
                .extend(profile.data.iter().map(|(k, v)| (k.clone(), v.clone())));
            if profile.folder_name.is_some() {
                resolved.folder_name = profile.folder_name.clone();
            }
            resolved.ignore.extend(profile.ignore.iter().cloned());
        }
        Ok(resolved)
    }

    /// The `default` data profile, if defined.
    pub fn default_data(&self) -> Result<Option<DataConfiguration>, ConfigError> {
        if self.data.contains_key(DEFAULT_PROFILE) {
            self.data_config(DEFAULT_PROFILE).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Run configuration plus the data profile it names (or `default`).
    pub fn full_run_config(
        &self,
        command: CommandKind,
        name: Option<&str>,
    ) -> Result<FullRunConfiguration, ConfigError> {
        let config = self.run_config(command, name)?;
        let data = match &config.data_name {
            Some(data_name) => Some(self.data_config(data_name)?),
            None => self.default_data()?,
        };
        Ok(FullRunConfiguration {
            name: name.unwrap_or(DEFAULT_PROFILE).to_string(),
            command,
            config,
            data,
        })
    }

    /// Global command by id.
    pub fn global_command(&self, id: &str) -> Result<&UserCommand, ConfigError> {
        self.commands
            .iter()
            .find(|command| command.id.as_deref() == Some(id))
            .ok_or_else(|| ConfigError::NoSuchCommand(id.to_string()))
    }

    /// Run profile names, `default` omitted when others exist unless asked for.
    pub fn run_config_names(&self, always_include_default: bool) -> Vec<&str> {
        let names: Vec<&str> = self.run_configs.keys().map(String::as_str).collect();
        if always_include_default || names.len() <= 1 {
            return names;
        }
        names.into_iter().filter(|n| *n != DEFAULT_PROFILE).collect()
    }

    /// Store `data` as the data profile of `run_config` and rewrite the file.
    ///
    /// The profile is `run_config`'s `data_name`, else `default`, created if
    /// needed; the run profile is pinned to it afterwards.
    pub fn save_data_for_run_config(
        &mut self,
        run_config: &mut FullRunConfiguration,
        data: TemplateData,
    ) -> Result<(), ConfigError> {
        let data_name = run_config
            .config
            .data_name
            .clone()
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string());

        self.data.entry(data_name.clone()).or_default().data = data.clone();

        if let Some(root) = self.run_configs.get_mut(&run_config.name) {
            root.set_data_name(run_config.command, &data_name);
        }
        run_config.config.data_name = Some(data_name);
        match &mut run_config.data {
            Some(resolved) => resolved.data = data,
            None => {
                run_config.data = Some(DataConfiguration {
                    data,
                    ..DataConfiguration::default()
                })
            }
        }

        self.save()
    }

    /// Rewrite the file this config is bound to.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = self.path.as_deref().ok_or(ConfigError::Unbound)?;
        ConfigLoader::at(path).save(self)
    }
}
