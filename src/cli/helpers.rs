use crate::cli::Cli;
use crate::config::Config;
use crate::control::QueueListing;
use crate::queue::CommandQueue;
use anyhow::{Context, Result};
use std::fmt::Write;

/// Load the configuration file (or defaults) and apply command line overrides
pub fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path).context("Failed to load config")?,
        None => Config::default(),
    };

    if cli.debug {
        config.debug = true;
    }
    if let Some(commands) = &cli.commands {
        config.commands_file = commands.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Render the queue for the `show` subcommand
pub fn format_queue(queue: &CommandQueue, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(&QueueListing::from_queue(queue))?);
    }

    let mut out = String::new();
    writeln!(
        out,
        "Loaded {} of {} commands ({} pending)",
        queue.len(),
        queue.capacity(),
        queue.pending_count()
    )?;

    for command in queue.iter() {
        let marker = if command.done { "x" } else { " " };
        writeln!(out, "  [{}] {}: {}", marker, command.id, command.value)?;
    }

    match queue.next_pending().and_then(|index| queue.get(index)) {
        Some(command) => writeln!(out, "\nNext: {}: {}", command.id, command.value)?,
        None => writeln!(out, "\nNext: none")?,
    }

    Ok(out)
}
