use super::{reload_from_file, SharedCommandQueue};
use anyhow::{Context, Result};
use notify::{RecommendedWatcher, RecursiveMode, Result as NotifyResult, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, info, warn};

const RELOAD_DELAY: Duration = Duration::from_millis(500);

/// Reloads the shared queue whenever the command file changes on disk.
///
/// The parent directory is watched, so editors that save through a rename
/// are picked up too. Bursts of events collapse into a single reload.
pub struct CommandFileWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
    reload_task: JoinHandle<()>,
}

impl std::fmt::Debug for CommandFileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandFileWatcher")
            .field("path", &self.path)
            .field("_watcher", &"<watcher>")
            .finish()
    }
}

impl CommandFileWatcher {
    /// Start watching `path`. Must be called from inside a tokio runtime.
    ///
    /// The file itself may be missing; its directory must exist.
    pub fn new(queue: SharedCommandQueue, path: &Path) -> Result<Self> {
        // The notify callback runs on its own thread, outside the runtime
        let handle = tokio::runtime::Handle::try_current()?;

        let file_name = path
            .file_name()
            .with_context(|| format!("Not a file path: {}", path.display()))?
            .to_os_string();
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        // One slot: a pending reload absorbs every event that arrives before it runs
        let (tx, rx) = mpsc::channel::<()>(1);
        let reload_task = handle.spawn(reload_loop(queue, path.to_path_buf(), rx));

        let mut watcher = notify::recommended_watcher(move |res: NotifyResult<notify::Event>| {
            match res {
                Ok(event) => {
                    let relevant = event.kind.is_modify()
                        || event.kind.is_create()
                        || event.kind.is_remove();
                    let touches_file = event
                        .paths
                        .iter()
                        .any(|changed| changed.file_name() == Some(file_name.as_os_str()));
                    if relevant && touches_file {
                        let _ = tx.try_send(());
                    }
                }
                Err(e) => warn!("Command file watch error: {}", e),
            }
        })?;

        if let Err(e) = watcher.watch(&directory, RecursiveMode::NonRecursive) {
            reload_task.abort();
            return Err(e.into());
        }
        info!("Watching command file: {}", path.display());

        Ok(CommandFileWatcher {
            path: path.to_path_buf(),
            _watcher: watcher,
            reload_task,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CommandFileWatcher {
    fn drop(&mut self) {
        self.reload_task.abort();
    }
}

async fn reload_loop(queue: SharedCommandQueue, path: PathBuf, mut changes: mpsc::Receiver<()>) {
    while changes.recv().await.is_some() {
        // Debouncing - wait for file operations to complete
        tokio::time::sleep(RELOAD_DELAY).await;
        while changes.try_recv().is_ok() {}

        debug!("Command file changed: {}", path.display());
        reload_commands(&queue, &path).await;
    }
}

async fn reload_commands(queue: &SharedCommandQueue, path: &Path) {
    match reload_from_file(queue, path).await {
        Ok(count) => info!("Reloaded {} commands from {}", count, path.display()),
        Err(e) => warn!("Failed to reload commands, keeping existing queue: {}", e),
    }
}
