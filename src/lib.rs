pub mod cli;
pub mod config;
pub mod control;
pub mod queue;
pub mod trace;

// Public API
pub use config::{Config, QueueConfig};
pub use queue::{
    create_shared_queue, reload_from_file, Command, CommandFile, CommandQueue, OverflowPolicy,
    QueueError, SharedCommandQueue,
};
pub use trace::{FatalError, FatalPolicy, TraceConfig};
