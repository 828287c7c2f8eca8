//! Reading the plain-text command file

use super::{Command, QueueError};
use crate::trace::describe_io_error;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Commands parsed from a command file, ready to replace a queue's contents
#[derive(Debug, Default)]
pub struct ParsedCommands {
    pub commands: Vec<Command>,
    /// Non-empty lines dropped because the queue was already full
    pub ignored: usize,
}

/// Handles reading a newline-delimited command file
#[derive(Debug, Clone)]
pub struct CommandFile {
    file_path: PathBuf,
}

impl CommandFile {
    /// Create a reader for the given file
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
        }
    }

    /// Check if the command file exists
    pub fn exists(&self) -> bool {
        self.file_path.exists()
    }

    /// Get the command file path
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Read and parse the whole file.
    ///
    /// Failures are logged at error level and returned; nothing is parsed
    /// partially. The file handle is dropped on every path out of here.
    pub fn read(
        &self,
        capacity: usize,
        max_command_length: usize,
    ) -> Result<ParsedCommands, QueueError> {
        if let Err(source) = std::fs::metadata(&self.file_path) {
            error!(
                "Cannot access {} input file. Last system error description: {}",
                self.file_path.display(),
                describe_io_error(&source)
            );
            return Err(QueueError::Access {
                path: self.file_path.clone(),
                source,
            });
        }

        let file = match File::open(&self.file_path) {
            Ok(file) => file,
            Err(source) => {
                error!(
                    "Cannot open {} input file. Last system error description: {}",
                    self.file_path.display(),
                    describe_io_error(&source)
                );
                return Err(QueueError::Open {
                    path: self.file_path.clone(),
                    source,
                });
            }
        };

        debug!("Reading commands from: {}", self.file_path.display());

        parse_commands(BufReader::new(file), capacity, max_command_length).map_err(|source| {
            error!(
                "Cannot read {} input file. Last system error description: {}",
                self.file_path.display(),
                describe_io_error(&source)
            );
            QueueError::Read {
                path: self.file_path.clone(),
                source,
            }
        })
    }
}

/// Parse newline-delimited commands.
///
/// Empty lines are skipped, the line terminator (`\n` or `\r\n`) is stripped
/// and each command is truncated to `max_command_length`. At most `capacity`
/// commands are kept; further non-empty lines are only counted.
pub fn parse_commands<R: BufRead>(
    mut reader: R,
    capacity: usize,
    max_command_length: usize,
) -> std::io::Result<ParsedCommands> {
    let mut parsed = ParsedCommands::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }

        let text = String::from_utf8_lossy(&buf);
        let line = text.strip_suffix('\n').unwrap_or(&text);
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }

        if parsed.commands.len() >= capacity {
            parsed.ignored += 1;
            continue;
        }

        let command = Command::new(parsed.commands.len(), line, max_command_length);
        debug!("new command - '{}'", command.value);
        parsed.commands.push(command);
    }

    Ok(parsed)
}
