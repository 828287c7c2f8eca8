//! Bounded command queue fed from a plain-text command file
//!
//! This module provides:
//! - A fixed-capacity, insertion-ordered queue of commands
//! - Bulk loading that replaces the queue from a command file
//! - Single appends with a configurable overflow policy
//! - Selection of the earliest command that is not done yet
//! - Hot reload when the command file changes

pub mod command;
pub mod loader;
pub mod manager;
pub mod watcher;

pub use command::Command;
pub use loader::{CommandFile, ParsedCommands};
pub use manager::{CommandQueue, OverflowPolicy, MIN_COMMAND_LENGTH};
pub use watcher::CommandFileWatcher;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors produced by queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Cannot access {} input file: {}", .path.display(), crate::trace::describe_io_error(.source))]
    Access {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot open {} input file: {}", .path.display(), crate::trace::describe_io_error(.source))]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot read {} input file: {}", .path.display(), crate::trace::describe_io_error(.source))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Command queue is full ({capacity} commands)")]
    CapacityExceeded { capacity: usize },
    #[error("No command with id {0} in the queue")]
    UnknownCommand(usize),
    #[error("Command queue capacity must be at least 1")]
    InvalidCapacity,
    #[error("Max command length must be at least 2, got {0}")]
    InvalidCommandLength(usize),
    #[error("Stale id {id}: handed out in generation {generation}, queue is at generation {current}")]
    StaleCommand {
        id: usize,
        generation: u64,
        current: u64,
    },
}

/// Shared command queue instance
///
/// Bulk load, append and mark-done take the write lock; selection and
/// listing take the read lock.
pub type SharedCommandQueue = Arc<RwLock<CommandQueue>>;

/// Wrap a queue for sharing between the control channel and reload tasks
pub fn create_shared_queue(queue: CommandQueue) -> SharedCommandQueue {
    Arc::new(RwLock::new(queue))
}

/// Replace the shared queue's contents from a command file.
///
/// The file is parsed before the write lock is taken, so readers never see a
/// partially loaded queue. On failure the queue is left untouched.
pub async fn reload_from_file(
    queue: &SharedCommandQueue,
    path: &Path,
) -> Result<usize, QueueError> {
    let (capacity, max_command_length) = {
        let guard = queue.read().await;
        (guard.capacity(), guard.max_command_length())
    };

    let parsed = CommandFile::new(path).read(capacity, max_command_length)?;

    let mut guard = queue.write().await;
    Ok(guard.replace(parsed))
}
