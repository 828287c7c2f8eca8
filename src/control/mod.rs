//! Line-oriented control channel
//!
//! One request per input line, one response per output line:
//! - `add <command>` appends a command, replies `ok <id>`
//! - `next` replies `next <id> <generation> <command>` or `none`
//! - `done <id> [generation]` marks a command done, replies `ok`
//! - `list` replies with the queue as a single JSON line
//! - `reload` bulk-loads the command file, replies `ok <count>`
//!
//! Failures reply `error <message>` and never end the session.
//!
//! Ids are positions, so a reload, a restart or an eviction can hand an id
//! to a different command. `next` reports the queue generation; passing it
//! back with `done` makes a stale id fail with `error Stale id ...` instead
//! of marking whatever command moved into that slot.

use crate::queue::{reload_from_file, Command, CommandQueue, SharedCommandQueue};
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A parsed control request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    Add(String),
    Next,
    Done { id: usize, generation: Option<u64> },
    List,
    Reload,
}

impl FromStr for ControlRequest {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        let (verb, rest) = match line.split_once(' ') {
            Some((verb, rest)) => (verb, rest),
            None => (line, ""),
        };

        match verb {
            "add" => {
                if rest.trim().is_empty() {
                    return Err(anyhow!("add requires a command"));
                }
                Ok(ControlRequest::Add(rest.to_string()))
            }
            "next" => Ok(ControlRequest::Next),
            "done" => {
                let mut fields = rest.split_whitespace();
                let id_text = fields.next().unwrap_or("");
                let id = id_text
                    .parse::<usize>()
                    .map_err(|_| anyhow!("Invalid command id: '{}'", id_text))?;
                let generation = match fields.next() {
                    Some(text) => Some(
                        text.parse::<u64>()
                            .map_err(|_| anyhow!("Invalid generation: '{}'", text))?,
                    ),
                    None => None,
                };
                if fields.next().is_some() {
                    return Err(anyhow!("done takes an id and an optional generation"));
                }
                Ok(ControlRequest::Done { id, generation })
            }
            "list" => Ok(ControlRequest::List),
            "reload" => Ok(ControlRequest::Reload),
            "" => Err(anyhow!("Empty request")),
            _ => Err(anyhow!("Unknown request: {}", verb)),
        }
    }
}

/// Snapshot of the queue as reported by `list`
#[derive(Debug, Serialize)]
pub struct QueueListing<'a> {
    pub length: usize,
    pub capacity: usize,
    pub generation: u64,
    pub next: Option<usize>,
    pub commands: Vec<&'a Command>,
}

impl<'a> QueueListing<'a> {
    pub fn from_queue(queue: &'a CommandQueue) -> Self {
        Self {
            length: queue.len(),
            capacity: queue.capacity(),
            generation: queue.generation(),
            next: queue.next_pending(),
            commands: queue.iter().collect(),
        }
    }
}

/// Run one request against the shared queue and build the response line.
///
/// Mutating requests re-check the queue invariants afterwards; a violation
/// comes back as an `Err` wrapping [`crate::trace::FatalError`].
pub async fn handle_request(
    queue: &SharedCommandQueue,
    commands_file: &Path,
    request: ControlRequest,
) -> Result<String> {
    let response = match request {
        ControlRequest::Add(value) => {
            let mut guard = queue.write().await;
            let response = match guard.append(&value) {
                Ok(id) => format!("ok {}", id),
                Err(e) => format!("error {}", e),
            };
            guard.verify()?;
            response
        }
        ControlRequest::Next => {
            let guard = queue.read().await;
            match guard.next_pending().and_then(|index| guard.get(index)) {
                Some(command) => format!(
                    "next {} {} {}",
                    command.id,
                    guard.generation(),
                    command.value
                ),
                None => "none".to_string(),
            }
        }
        ControlRequest::Done { id, generation } => {
            let mut guard = queue.write().await;
            let result = match generation {
                Some(generation) => guard.mark_done_in(id, generation),
                None => guard.mark_done(id),
            };
            match result {
                Ok(()) => "ok".to_string(),
                Err(e) => format!("error {}", e),
            }
        }
        ControlRequest::List => {
            let guard = queue.read().await;
            serde_json::to_string(&QueueListing::from_queue(&guard))?
        }
        ControlRequest::Reload => {
            let response = match reload_from_file(queue, commands_file).await {
                Ok(count) => format!("ok {}", count),
                Err(e) => format!("error {}", e),
            };
            queue.read().await.verify()?;
            response
        }
    };

    Ok(response)
}

/// Answer one raw input line. Blank lines get no response.
async fn respond<W>(
    queue: &SharedCommandQueue,
    commands_file: &Path,
    line: &str,
    writer: &mut W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if line.trim().is_empty() {
        return Ok(());
    }
    debug!("Control request: {}", line);

    let response = match line.parse::<ControlRequest>() {
        Ok(request) => handle_request(queue, commands_file, request).await?,
        Err(e) => format!("error {}", e),
    };

    writer.write_all(format!("{}\n", response).as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Serve control requests until the reader reaches end of input
pub async fn serve<R, W>(
    queue: &SharedCommandQueue,
    commands_file: &Path,
    reader: R,
    mut writer: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        respond(queue, commands_file, &line, &mut writer).await?;
    }

    info!("Control channel closed");
    Ok(())
}

/// Serve control requests arriving on a channel until every sender is gone
pub async fn serve_channel<W>(
    queue: &SharedCommandQueue,
    commands_file: &Path,
    mut requests: mpsc::Receiver<String>,
    mut writer: W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = requests.recv().await {
        respond(queue, commands_file, &line, &mut writer).await?;
    }

    info!("Control channel closed");
    Ok(())
}

/// Read stdin lines on a dedicated thread.
///
/// The thread is detached, so a blocked read never holds up runtime
/// shutdown. The channel closes at end of input or on a read error.
pub fn spawn_stdin_reader() -> Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel(64);

    std::thread::Builder::new()
        .name("dozord-stdin".to_string())
        .spawn(move || {
            use std::io::BufRead;

            for line in std::io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Failed to read control input: {}", e);
                        break;
                    }
                };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        })?;

    Ok(rx)
}
