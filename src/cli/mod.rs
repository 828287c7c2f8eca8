pub mod args;
pub mod helpers;

pub use args::{Cli, Commands, ShowArgs};
pub use helpers::{format_queue, resolve_config};
