//! Process-wide diagnostics: logging setup, OS error descriptions and fatal traps

use std::io::IsTerminal;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, error, info, Level};

pub const UNKNOWN_FILENAME: &str = "<UNKNOWN FILENAME>";

/// Diagnostics settings, decided once at startup
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceConfig {
    /// Show debug-level events and abort (instead of exiting) on fatal traps
    pub debug: bool,
}

impl TraceConfig {
    pub fn max_level(&self) -> Level {
        if self.debug {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Every level goes to stderr: stdout belongs to the control channel and
/// to `show` output. Colours are only used when stderr is a terminal.
pub fn init_tracing(config: &TraceConfig) {
    tracing_subscriber::fmt()
        .with_max_level(config.max_level())
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();
}

/// Human-readable description of an OS error code
pub fn describe_os_error(code: i32) -> String {
    let description = std::io::Error::from_raw_os_error(code).to_string();
    let suffix = format!(" (os error {})", code);
    match description.strip_suffix(&suffix) {
        Some(stripped) => stripped.to_string(),
        None => description,
    }
}

/// Describe an I/O error, preferring the OS description when there is one
pub fn describe_io_error(err: &std::io::Error) -> String {
    match err.raw_os_error() {
        Some(code) => describe_os_error(code),
        None => err.to_string(),
    }
}

/// Last path component of a source file path
pub fn file_basename(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(UNKNOWN_FILENAME)
}

/// A trapped "must never happen" condition
#[derive(Debug, Clone, Error)]
#[error("{message} (trapped by condition '{condition}' at {file}:{line})")]
pub struct FatalError {
    pub condition: &'static str,
    pub file: &'static str,
    pub line: u32,
    pub message: String,
    /// Description of the OS error that was current when the trap fired
    pub last_error: String,
}

/// Return a [`FatalError`] when `condition` holds.
///
/// Prefer the [`trap!`](crate::trap) macro, which fills in the condition
/// text and source location.
pub fn check(
    condition: bool,
    condition_text: &'static str,
    file: &'static str,
    line: u32,
    message: String,
) -> Result<(), FatalError> {
    if !condition {
        return Ok(());
    }

    let last_error = describe_io_error(&std::io::Error::last_os_error());
    Err(FatalError {
        condition: condition_text,
        file: file_basename(file),
        line,
        message,
        last_error,
    })
}

/// Trap a violated precondition: evaluates to `Err(FatalError)` if the
/// condition holds, `Ok(())` otherwise.
#[macro_export]
macro_rules! trap {
    ($condition:expr, $($arg:tt)+) => {
        $crate::trace::check(
            $condition,
            stringify!($condition),
            file!(),
            line!(),
            format!($($arg)+),
        )
    };
}

/// How the process ends after a fatal trap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalPolicy {
    /// Abort so a core dump or debugger can pick it up
    Abort,
    /// Exit with a failure status
    Exit,
}

impl FatalPolicy {
    pub fn from_config(config: &TraceConfig) -> Self {
        if config.debug {
            FatalPolicy::Abort
        } else {
            FatalPolicy::Exit
        }
    }

    /// Log the trapped condition and terminate the process
    pub fn terminate(&self, fatal: &FatalError) -> ! {
        debug!(
            "Bug has been trapped by condition '{}' at {}:{}.",
            fatal.condition, fatal.file, fatal.line
        );
        error!("{}", fatal.message);
        info!("Last system error code description: {}", fatal.last_error);

        match self {
            FatalPolicy::Abort => std::process::abort(),
            FatalPolicy::Exit => std::process::exit(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_level() {
        assert_eq!(TraceConfig { debug: true }.max_level(), Level::DEBUG);
        assert_eq!(TraceConfig { debug: false }.max_level(), Level::INFO);
    }

    #[test]
    fn test_fatal_policy_from_config() {
        assert_eq!(
            FatalPolicy::from_config(&TraceConfig { debug: true }),
            FatalPolicy::Abort
        );
        assert_eq!(
            FatalPolicy::from_config(&TraceConfig::default()),
            FatalPolicy::Exit
        );
    }

    #[test]
    fn test_describe_os_error() {
        let description = describe_os_error(2);
        assert!(!description.is_empty());
        assert!(!description.contains("os error"));
    }

    #[test]
    fn test_describe_io_error_without_os_code() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "custom failure");
        assert_eq!(describe_io_error(&err), "custom failure");
    }

    #[test]
    fn test_file_basename() {
        assert_eq!(file_basename("src/queue/manager.rs"), "manager.rs");
        assert_eq!(file_basename("main.rs"), "main.rs");
        assert_eq!(file_basename(""), UNKNOWN_FILENAME);
        assert_eq!(file_basename("/"), UNKNOWN_FILENAME);
    }

    #[test]
    fn test_trap_passes_when_condition_is_false() {
        let capacity = 4;
        assert!(crate::trap!(capacity == 0, "capacity is {}", capacity).is_ok());
    }

    #[test]
    fn test_trap_captures_context() {
        let length = 5;
        let capacity = 4;
        let fatal =
            crate::trap!(length > capacity, "length {} over {}", length, capacity).unwrap_err();

        assert_eq!(fatal.condition, "length > capacity");
        assert_eq!(fatal.file, "mod.rs");
        assert_eq!(fatal.message, "length 5 over 4");
        assert!(fatal.line > 0);
        assert!(fatal.to_string().contains("length > capacity"));
    }
}
