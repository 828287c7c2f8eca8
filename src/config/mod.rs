pub mod queue_config;

pub use queue_config::QueueConfig;

use crate::queue::MIN_COMMAND_LENGTH;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure matching the config.yaml format
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_commands_file")]
    pub commands_file: PathBuf,
    #[serde(default)]
    pub queue: QueueConfig,
    /// Reload the command file whenever it changes on disk
    #[serde(default)]
    pub watch: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            commands_file: default_commands_file(),
            queue: QueueConfig::default(),
            watch: false,
        }
    }
}

fn default_commands_file() -> PathBuf {
    PathBuf::from("commands.txt")
}

impl Config {
    /// Load configuration from YAML file
    pub fn from_file(config_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config =
            serde_yaml::from_str(&content).with_context(|| "Failed to parse YAML config file")?;

        Ok(config)
    }

    /// Reject settings the queue cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.queue.max_length == 0 {
            anyhow::bail!("queue.max_length must be at least 1");
        }
        if self.queue.max_command_length < MIN_COMMAND_LENGTH {
            anyhow::bail!(
                "queue.max_command_length must be at least {}, got {}",
                MIN_COMMAND_LENGTH,
                self.queue.max_command_length
            );
        }
        Ok(())
    }
}
