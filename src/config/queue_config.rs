use crate::queue::OverflowPolicy;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct QueueConfig {
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default = "default_max_command_length")]
    pub max_command_length: usize,
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            max_command_length: default_max_command_length(),
            overflow: OverflowPolicy::default(),
        }
    }
}

fn default_max_length() -> usize {
    64
}

fn default_max_command_length() -> usize {
    1024
}
