//! Configuration file loading and saving.

use crate::types::TemplarConfig;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// File names searched for, in order, when no path is given.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["templar.yaml", "templar.yml"];

/// Config errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("failed to read or write config: {source}")]
    ReadError {
        #[from]
        source: std::io::Error,
    },

    #[error("invalid YAML at line {}: {message}", line.map(|l| l.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    ParseError { line: Option<usize>, message: String },

    #[error("validation error: {message}")]
    ValidationError { message: String },

    #[error("environment variable not found: {var}")]
    EnvVarNotFound { var: String },

    #[error("no run configuration named '{0}'")]
    NoSuchRunConfig(String),

    #[error("no data configuration named '{0}'")]
    NoSuchData(String),

    #[error("no global command with id '{0}'")]
    NoSuchCommand(String),

    #[error("extends cycle: {chain}")]
    ExtendsCycle { chain: String },

    #[error("config is not bound to a file")]
    Unbound,
}

/// Configuration loader bound to one file path.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    /// Loader for an explicit config path, or the first of
    /// [`CONFIG_FILE_NAMES`] found in the working directory, or
    /// `./templar.yaml` if none exists yet.
    pub fn new(path: Option<&Path>) -> Self {
        let dir = std::env::current_dir().unwrap_or_default();
        Self::in_dir(&dir, path)
    }

    /// Like [`ConfigLoader::new`] but searching `dir` instead of the working
    /// directory.
    pub fn in_dir(dir: &Path, path: Option<&Path>) -> Self {
        if let Some(path) = path {
            return Self {
                path: dir.join(path),
            };
        }
        let path = CONFIG_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.exists())
            .unwrap_or_else(|| dir.join(CONFIG_FILE_NAMES[0]));
        Self { path }
    }

    /// Loader for exactly `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path the loader reads and writes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the config. A missing file yields the default config, still bound
    /// to the path so a later save creates it.
    pub fn load(&self) -> Result<TemplarConfig, ConfigError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no config file, using defaults");
            return Ok(TemplarConfig {
                path: Some(self.path.clone()),
                ..TemplarConfig::default()
            });
        }

        self.load_dotenv();
        let contents = std::fs::read_to_string(&self.path)?;
        let expanded = expand_env_vars(&contents)?;

        let mut config: TemplarConfig = if expanded.trim().is_empty() {
            TemplarConfig::default()
        } else {
            serde_yaml::from_str(&expanded).map_err(|e| ConfigError::ParseError {
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?
        };

        validate(&config)?;
        config.path = Some(self.path.clone());
        debug!(path = %self.path.display(), "loaded config");
        Ok(config)
    }

    /// Load, failing if the file does not exist.
    pub fn load_existing(&self) -> Result<TemplarConfig, ConfigError> {
        if !self.path.exists() {
            return Err(ConfigError::NotFound {
                path: self.path.clone(),
            });
        }
        self.load()
    }

    /// `.env` next to the config file feeds `${VAR}` expansion.
    fn load_dotenv(&self) {
        if let Some(dir) = self.path.parent() {
            let env_file = dir.join(".env");
            if env_file.exists() {
                if let Err(e) = dotenvy::from_path(&env_file) {
                    debug!(error = %e, "failed to load .env");
                }
            }
        }
    }

    /// Write the whole config to the file.
    pub fn save(&self, config: &TemplarConfig) -> Result<(), ConfigError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let yaml = serde_yaml::to_string(config).map_err(|e| ConfigError::ParseError {
            line: None,
            message: e.to_string(),
        })?;

        std::fs::write(&self.path, yaml)?;
        debug!(path = %self.path.display(), "saved config");
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Expand environment variables in the form `${VAR}` or `${VAR:-default}`.
pub(crate) fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").map_err(|e| {
        ConfigError::ValidationError {
            message: e.to_string(),
        }
    })?;

    let mut result = String::with_capacity(content.len());
    let mut last = 0;
    for cap in re.captures_iter(content) {
        let whole = match cap.get(0) {
            Some(m) => m,
            None => continue,
        };
        let var_name = &cap[1];
        let value = match (std::env::var(var_name), cap.get(2)) {
            (Ok(v), _) => v,
            (Err(_), Some(default)) => default.as_str().to_string(),
            (Err(_), None) => {
                return Err(ConfigError::EnvVarNotFound {
                    var: var_name.to_string(),
                })
            }
        };
        result.push_str(&content[last..whole.start()]);
        result.push_str(&value);
        last = whole.end();
    }
    result.push_str(&content[last..]);

    Ok(result)
}

/// Validate configuration values.
fn validate(config: &TemplarConfig) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for command in &config.commands {
        let id = command.id.as_deref().ok_or_else(|| ConfigError::ValidationError {
            message: format!("global command '{}' needs an id", command.display_name()),
        })?;
        if !seen.insert(id) {
            return Err(ConfigError::ValidationError {
                message: format!("duplicate global command id '{id}'"),
            });
        }
    }

    for (name, profile) in &config.data {
        if profile.extends.as_deref() == Some(name.as_str()) {
            return Err(ConfigError::ExtendsCycle {
                chain: format!("{name} -> {name}"),
            });
        }
    }

    Ok(())
}
