//! Fixed-capacity command queue with bulk load, append and next-pending selection

use super::{Command, CommandFile, ParsedCommands, QueueError};
use crate::config::QueueConfig;
use crate::trace::FatalError;
use crate::trap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// What an append does when the queue is already at capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Start over at position 0, overwriting that slot; length becomes 1
    #[default]
    Restart,
    /// Drop the oldest command, shift the rest down and renumber their ids
    EvictOldest,
    /// Refuse the append with [`QueueError::CapacityExceeded`]
    Reject,
}

/// Smallest usable max command length: one byte of text plus the terminator slot
pub const MIN_COMMAND_LENGTH: usize = 2;

/// Ordered, bounded queue of commands.
///
/// Positions `0..len()` are valid and contiguous; insertion order is dispatch
/// priority. The queue does no locking of its own, share it through
/// [`super::SharedCommandQueue`].
///
/// Ids are positions, so anything that moves existing commands (bulk load,
/// restart, eviction) bumps the generation. A dispatcher that remembers the
/// generation next to an id can tell when that id went stale.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    commands: Vec<Command>,
    capacity: usize,
    max_command_length: usize,
    overflow: OverflowPolicy,
    generation: u64,
}

impl CommandQueue {
    /// Create an empty queue holding at most `capacity` commands
    pub fn new(
        capacity: usize,
        max_command_length: usize,
        overflow: OverflowPolicy,
    ) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::InvalidCapacity);
        }
        if max_command_length < MIN_COMMAND_LENGTH {
            return Err(QueueError::InvalidCommandLength(max_command_length));
        }

        Ok(Self {
            commands: Vec::with_capacity(capacity),
            capacity,
            max_command_length,
            overflow,
            generation: 0,
        })
    }

    /// Create an empty queue from the `queue` configuration section
    pub fn from_config(config: &QueueConfig) -> Result<Self, QueueError> {
        Self::new(config.max_length, config.max_command_length, config.overflow)
    }

    /// Replace the whole queue from a command file.
    ///
    /// Every previous entry is discarded, done or not. If the file cannot be
    /// accessed, opened or read the queue is left exactly as it was.
    pub fn load_from_file(&mut self, path: &Path) -> Result<usize, QueueError> {
        let parsed = CommandFile::new(path).read(self.capacity, self.max_command_length)?;
        Ok(self.replace(parsed))
    }

    /// Replace the whole queue from newline-delimited text
    pub fn load_from_str(&mut self, text: &str) -> usize {
        // Reading from a byte slice cannot fail
        let parsed = super::loader::parse_commands(
            text.as_bytes(),
            self.capacity,
            self.max_command_length,
        )
        .unwrap_or_default();
        self.replace(parsed)
    }

    /// Swap in freshly parsed commands and return the new length
    pub fn replace(&mut self, parsed: ParsedCommands) -> usize {
        if parsed.ignored > 0 {
            warn!(
                "Command queue is full ({} commands), ignored {} remaining lines",
                self.capacity, parsed.ignored
            );
        }

        self.commands.clear();
        self.commands
            .extend(parsed.commands.into_iter().take(self.capacity));
        self.generation += 1;

        info!("Loaded {} commands", self.commands.len());
        self.commands.len()
    }

    /// Append one command and return its id.
    ///
    /// The value is truncated to the configured max length. When the queue
    /// is full the overflow policy decides where the command goes.
    pub fn append(&mut self, value: &str) -> Result<usize, QueueError> {
        if self.commands.len() >= self.capacity {
            match self.overflow {
                OverflowPolicy::Restart => {
                    warn!(
                        "Command queue is full ({} commands), restarting at position 0",
                        self.capacity
                    );
                    self.commands.clear();
                    self.generation += 1;
                }
                OverflowPolicy::EvictOldest => {
                    let evicted = self.commands.remove(0);
                    warn!(
                        "Command queue is full ({} commands), evicting '{}'",
                        self.capacity, evicted.value
                    );
                    for (position, command) in self.commands.iter_mut().enumerate() {
                        command.id = position + 1;
                    }
                    self.generation += 1;
                }
                OverflowPolicy::Reject => {
                    warn!("Command queue is full ({} commands), rejecting append", self.capacity);
                    return Err(QueueError::CapacityExceeded {
                        capacity: self.capacity,
                    });
                }
            }
        }

        let command = Command::new(self.commands.len(), value, self.max_command_length);
        debug!("new command - '{}'", command.value);

        let id = command.id;
        self.commands.push(command);
        Ok(id)
    }

    /// Position of the earliest command that is not done yet
    pub fn next_pending(&self) -> Option<usize> {
        if self.commands.is_empty() {
            return None;
        }

        self.commands.iter().position(|command| !command.done)
    }

    /// Flag the command with the given id as done
    pub fn mark_done(&mut self, id: usize) -> Result<(), QueueError> {
        let command = self
            .commands
            .iter_mut()
            .find(|command| command.id == id)
            .ok_or(QueueError::UnknownCommand(id))?;

        command.done = true;
        debug!("command {} done - '{}'", id, command.value);
        Ok(())
    }

    /// Flag a command done, but only if its id still refers to the command
    /// handed out in `generation`
    pub fn mark_done_in(&mut self, id: usize, generation: u64) -> Result<(), QueueError> {
        if generation != self.generation {
            return Err(QueueError::StaleCommand {
                id,
                generation,
                current: self.generation,
            });
        }
        self.mark_done(id)
    }

    /// Check the storage invariants, trapping on any violation
    pub fn verify(&self) -> Result<(), FatalError> {
        trap!(
            self.commands.len() > self.capacity,
            "Command queue holds {} commands but its capacity is {}",
            self.commands.len(),
            self.capacity
        )?;

        for (position, command) in self.commands.iter().enumerate() {
            trap!(
                command.id != position + 1,
                "Command at position {} has id {}",
                position,
                command.id
            )?;
        }

        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&Command> {
        self.commands.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_command_length(&self) -> usize {
        self.max_command_length
    }

    pub fn overflow(&self) -> OverflowPolicy {
        self.overflow
    }

    /// Bumped whenever existing commands are replaced, moved or renumbered
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of commands not marked done
    pub fn pending_count(&self) -> usize {
        self.commands.iter().filter(|command| !command.done).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    fn queue(capacity: usize, overflow: OverflowPolicy) -> CommandQueue {
        CommandQueue::new(capacity, 16, overflow).unwrap()
    }

    fn values(queue: &CommandQueue) -> Vec<&str> {
        queue.iter().map(|c| c.value.as_str()).collect()
    }

    #[test]
    fn test_new_queue_is_empty() {
        let queue = queue(4, OverflowPolicy::Restart);
        assert!(queue.is_empty());
        assert_eq!(queue.capacity(), 4);
        assert_eq!(queue.next_pending(), None);
    }

    #[test]
    fn test_tiny_command_length_is_rejected() {
        for max_command_length in [0, 1] {
            let result = CommandQueue::new(4, max_command_length, OverflowPolicy::Restart);
            assert!(matches!(
                result,
                Err(QueueError::InvalidCommandLength(n)) if n == max_command_length
            ));
        }
        assert!(CommandQueue::new(4, MIN_COMMAND_LENGTH, OverflowPolicy::Restart).is_ok());
    }

    #[test]
    fn test_generation_tracks_renumbering() {
        let mut queue = queue(2, OverflowPolicy::EvictOldest);
        assert_eq!(queue.generation(), 0);

        queue.append("a").unwrap();
        queue.append("b").unwrap();
        assert_eq!(queue.generation(), 0);

        queue.append("c").unwrap();
        assert_eq!(queue.generation(), 1);

        queue.load_from_str("x\n");
        assert_eq!(queue.generation(), 2);

        let mut restart = CommandQueue::new(1, 16, OverflowPolicy::Restart).unwrap();
        restart.append("a").unwrap();
        restart.append("b").unwrap();
        assert_eq!(restart.generation(), 1);
    }

    #[test]
    fn test_mark_done_in_rejects_stale_generation() {
        let mut queue = queue(3, OverflowPolicy::EvictOldest);
        for value in ["a", "b", "c"] {
            queue.append(value).unwrap();
        }
        let generation = queue.generation();
        queue.append("d").unwrap();

        let result = queue.mark_done_in(2, generation);
        assert!(matches!(result, Err(QueueError::StaleCommand { id: 2, .. })));
        assert_eq!(queue.pending_count(), 3);

        queue.mark_done_in(2, queue.generation()).unwrap();
        assert!(queue.get(1).unwrap().done);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let result = CommandQueue::new(0, 16, OverflowPolicy::Restart);
        assert!(matches!(result, Err(QueueError::InvalidCapacity)));
    }

    #[test]
    fn test_append_assigns_position_ids() {
        let mut queue = queue(4, OverflowPolicy::Restart);
        assert_eq!(queue.append("first").unwrap(), 1);
        assert_eq!(queue.append("second").unwrap(), 2);

        let second = queue.get(1).unwrap();
        assert_eq!(second.id, 2);
        assert_eq!(second.value, "second");
        assert!(!second.done);
        assert_eq!(queue.get(0).unwrap().value, "first");
    }

    #[test]
    fn test_append_truncates() {
        let mut queue = queue(4, OverflowPolicy::Restart);
        queue.append("0123456789abcdefghij").unwrap();
        assert_eq!(queue.get(0).unwrap().value, "0123456789abcde");
    }

    #[test]
    fn test_append_restarts_when_full() {
        let mut queue = queue(3, OverflowPolicy::Restart);
        for value in ["a", "b", "c"] {
            queue.append(value).unwrap();
        }
        queue.mark_done(1).unwrap();

        assert_eq!(queue.append("d").unwrap(), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(values(&queue), vec!["d"]);
        assert!(!queue.get(0).unwrap().done);

        assert_eq!(queue.append("e").unwrap(), 2);
        assert_eq!(values(&queue), vec!["d", "e"]);
    }

    #[test]
    fn test_append_evicts_oldest_when_full() {
        let mut queue = queue(3, OverflowPolicy::EvictOldest);
        for value in ["a", "b", "c"] {
            queue.append(value).unwrap();
        }
        queue.mark_done(2).unwrap();

        assert_eq!(queue.append("d").unwrap(), 3);
        assert_eq!(queue.len(), 3);
        assert_eq!(values(&queue), vec!["b", "c", "d"]);

        let ids: Vec<usize> = queue.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(queue.get(0).unwrap().done);
        assert!(queue.verify().is_ok());
    }

    #[test]
    fn test_append_rejects_when_full() {
        let mut queue = queue(2, OverflowPolicy::Reject);
        queue.append("a").unwrap();
        queue.append("b").unwrap();

        let result = queue.append("c");
        assert!(matches!(result, Err(QueueError::CapacityExceeded { capacity: 2 })));
        assert_eq!(values(&queue), vec!["a", "b"]);
    }

    #[test]
    fn test_next_pending_selection() {
        let mut queue = queue(4, OverflowPolicy::Restart);
        for value in ["a", "b", "c", "d"] {
            queue.append(value).unwrap();
        }
        queue.mark_done(1).unwrap();
        queue.mark_done(2).unwrap();

        assert_eq!(queue.next_pending(), Some(2));
        queue.mark_done(3).unwrap();
        assert_eq!(queue.next_pending(), Some(3));
        queue.mark_done(4).unwrap();
        assert_eq!(queue.next_pending(), None);
        assert_eq!(queue.pending_count(), 0);
    }

    #[test]
    fn test_next_pending_prefers_earliest() {
        let mut queue = queue(4, OverflowPolicy::Restart);
        for value in ["a", "b", "c"] {
            queue.append(value).unwrap();
        }
        queue.mark_done(2).unwrap();

        assert_eq!(queue.next_pending(), Some(0));
        assert_eq!(queue.pending_count(), 2);
    }

    #[test]
    fn test_mark_done_unknown_id() {
        let mut queue = queue(4, OverflowPolicy::Restart);
        queue.append("a").unwrap();

        assert!(matches!(queue.mark_done(0), Err(QueueError::UnknownCommand(0))));
        assert!(matches!(queue.mark_done(2), Err(QueueError::UnknownCommand(2))));
    }

    #[test]
    fn test_load_from_str_replaces_everything() {
        let mut queue = queue(8, OverflowPolicy::Restart);
        for value in ["old1", "old2", "old3", "old4"] {
            queue.append(value).unwrap();
        }
        queue.mark_done(1).unwrap();

        assert_eq!(queue.load_from_str("new1\n\nnew2\n"), 2);
        assert_eq!(values(&queue), vec!["new1", "new2"]);
        assert!(queue.iter().all(|c| !c.done));
        assert_eq!(queue.next_pending(), Some(0));
    }

    #[test]
    fn test_load_from_str_stops_at_capacity() {
        let mut queue = queue(2, OverflowPolicy::Restart);
        assert_eq!(queue.load_from_str("a\nb\nc\n"), 2);
        assert_eq!(values(&queue), vec!["a", "b"]);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "echo hello").unwrap();
        writeln!(file, "sleep 1").unwrap();

        let mut queue = queue(8, OverflowPolicy::Restart);
        queue.append("previous").unwrap();

        assert_eq!(queue.load_from_file(file.path()).unwrap(), 2);
        assert_eq!(values(&queue), vec!["echo hello", "sleep 1"]);
    }

    #[test]
    fn test_load_from_missing_file_leaves_queue_unchanged() {
        let mut queue = queue(8, OverflowPolicy::Restart);
        queue.append("a").unwrap();
        queue.append("b").unwrap();
        queue.mark_done(1).unwrap();
        let before: Vec<Command> = queue.iter().cloned().collect();

        let temp_dir = tempdir().unwrap();
        let result = queue.load_from_file(&temp_dir.path().join("missing.txt"));

        assert!(result.is_err());
        let after: Vec<Command> = queue.iter().cloned().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_load_from_directory_leaves_queue_unchanged() {
        let mut queue = queue(8, OverflowPolicy::Restart);
        queue.append("a").unwrap();
        queue.append("b").unwrap();
        queue.mark_done(2).unwrap();
        let before: Vec<Command> = queue.iter().cloned().collect();
        let generation = queue.generation();

        let temp_dir = tempdir().unwrap();
        let result = queue.load_from_file(temp_dir.path());

        assert!(matches!(
            result,
            Err(QueueError::Open { .. }) | Err(QueueError::Read { .. })
        ));
        let after: Vec<Command> = queue.iter().cloned().collect();
        assert_eq!(before, after);
        assert_eq!(queue.generation(), generation);
    }

    #[cfg(unix)]
    #[test]
    fn test_load_from_unreadable_file_leaves_queue_unchanged() {
        use std::os::unix::fs::PermissionsExt;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "echo secret").unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o000)).unwrap();
        if std::fs::File::open(file.path()).is_ok() {
            // Permission bits do not bind this user (root)
            return;
        }

        let mut queue = queue(8, OverflowPolicy::Restart);
        queue.append("keep").unwrap();
        let before: Vec<Command> = queue.iter().cloned().collect();

        let result = queue.load_from_file(file.path());

        assert!(matches!(result, Err(QueueError::Open { .. })));
        let after: Vec<Command> = queue.iter().cloned().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_verify_holds_after_operations() {
        let mut queue = queue(2, OverflowPolicy::Restart);
        queue.load_from_str("a\nb\n");
        queue.append("c").unwrap();
        assert!(queue.verify().is_ok());
    }
}
