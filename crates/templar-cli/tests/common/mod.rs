//! Common test utilities for CLI testing.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use tempfile::{tempdir, TempDir};

/// Config that replaces the built-in publish hooks, which need a remote.
pub const LOCAL_CONFIG: &str = "\
data:
  default:
    data:
      q1: a1
      q2: 1
run_configs:
  default: {}
";

/// Temporary working directory holding a template and a config file.
pub struct TestContext {
    pub temp_dir: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        fs::create_dir_all(temp_dir.path().join("template")).expect("Failed to create template dir");
        Self { temp_dir }
    }

    /// Write `templar.yaml` in the working directory
    pub fn with_config(self, config: &str) -> Self {
        fs::write(self.path().join("templar.yaml"), config).expect("Failed to write config");
        self
    }

    /// Write a file into the template
    pub fn with_template_file(self, name: &str, content: &str) -> Self {
        self.write_template_file(name, content);
        self
    }

    pub fn write_template_file(&self, name: &str, content: &str) {
        fs::write(self.path().join("template").join(name), content).expect("Failed to write template file");
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a command configured for this context
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("templar").expect("Binary not found");
        cmd.current_dir(self.path())
            .env_remove("TEMPLAR_CONFIG")
            .env_remove("TEMPLAR_LOG_FORMAT")
            .env_remove("RUST_LOG")
            .env("NO_COLOR", "1");
        cmd
    }
}
