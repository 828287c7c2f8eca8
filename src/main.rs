use anyhow::{Context, Result};
use clap::Parser;
use dozord::cli::{format_queue, resolve_config, Cli, Commands, ShowArgs};
use dozord::config::Config;
use dozord::control;
use dozord::queue::{
    create_shared_queue, reload_from_file, CommandFileWatcher, CommandQueue, SharedCommandQueue,
};
use dozord::trace::{init_tracing, FatalError, FatalPolicy, TraceConfig};
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments first to get debug flag
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    let trace_config = TraceConfig {
        debug: config.debug,
    };
    init_tracing(&trace_config);
    let policy = FatalPolicy::from_config(&trace_config);

    match &cli.command {
        None => run_daemon(config, policy).await?,
        Some(Commands::Show(args)) => handle_show_command(&config, args)?,
    }

    Ok(())
}

/// Serve the control channel on stdin/stdout (default mode when no subcommand is provided).
///
/// Logs go to stderr so stdout carries protocol responses only.
async fn run_daemon(config: Config, policy: FatalPolicy) -> Result<()> {
    let queue = create_shared_queue(
        CommandQueue::from_config(&config.queue).context("Failed to create command queue")?,
    );
    let commands_file = config.commands_file.clone();

    info!("dozord started");
    info!("Command file: {}", commands_file.display());

    if let Err(e) = reload_from_file(&queue, &commands_file).await {
        warn!("Starting with an empty queue: {}", e);
    }

    let _watcher = if config.watch {
        Some(CommandFileWatcher::new(queue.clone(), &commands_file)?)
    } else {
        None
    };

    let hangup_handle = tokio::spawn(reload_on_hangup(queue.clone(), commands_file.clone()));

    // A detached reader thread, so Ctrl+C is not held up by a blocked read
    let requests = control::spawn_stdin_reader().context("Failed to start stdin reader")?;
    let stdout = tokio::io::stdout();

    tokio::select! {
        result = control::serve_channel(&queue, &commands_file, requests, stdout) => {
            if let Err(e) = result {
                if let Some(fatal) = e.downcast_ref::<FatalError>() {
                    policy.terminate(fatal);
                }
                hangup_handle.abort();
                return Err(e);
            }
        }
        result = signal::ctrl_c() => {
            result.context("Failed to listen for ctrl_c")?;
            info!("Received Ctrl+C, shutting down...");
        }
    }

    hangup_handle.abort();
    Ok(())
}

/// Bulk-load the command file again on every SIGHUP
#[cfg(unix)]
async fn reload_on_hangup(queue: SharedCommandQueue, commands_file: PathBuf) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to listen for SIGHUP")?;
    while hangup.recv().await.is_some() {
        info!("Received SIGHUP, reloading {}", commands_file.display());
        if let Err(e) = reload_from_file(&queue, &commands_file).await {
            warn!("Failed to reload commands, keeping existing queue: {}", e);
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn reload_on_hangup(_queue: SharedCommandQueue, _commands_file: PathBuf) -> Result<()> {
    std::future::pending::<()>().await;
    Ok(())
}

/// Handle show command
fn handle_show_command(config: &Config, args: &ShowArgs) -> Result<()> {
    let mut queue =
        CommandQueue::from_config(&config.queue).context("Failed to create command queue")?;
    queue
        .load_from_file(&config.commands_file)
        .context("Failed to load command file")?;

    print!("{}", format_queue(&queue, args.json)?);
    Ok(())
}
