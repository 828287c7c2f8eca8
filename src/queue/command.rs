//! A single queued command

use serde::Serialize;

/// One unit of queued work
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Command {
    /// 1-based id, always `position + 1` at insertion time
    pub id: usize,
    /// Command text, bounded by the queue's max command length
    pub value: String,
    /// Set by the dispatcher once the command has run
    pub done: bool,
}

impl Command {
    /// Create a pending command at `position`, truncating `value` to fit
    /// a buffer of `max_length` bytes (one byte is reserved for the terminator)
    pub fn new(position: usize, value: &str, max_length: usize) -> Self {
        Self {
            id: position + 1,
            value: truncate_command(value, max_length).to_string(),
            done: false,
        }
    }
}

/// Truncate `value` so it fits a buffer of `max_length` bytes.
///
/// The result holds at most `max_length - 1` bytes and never splits a UTF-8
/// character, so a multi-byte character straddling the limit is dropped whole.
pub fn truncate_command(value: &str, max_length: usize) -> &str {
    let limit = max_length.saturating_sub(1);
    if value.len() <= limit {
        return value;
    }

    let mut end = limit;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
