use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use flexi_logger::{
    Age, Cleanup, Criterion, Duplicate, FileSpec, LogSpecBuilder, Logger, LoggerHandle, Naming,
};
use futures::StreamExt;
use log::{LevelFilter, info};
use riverbridge::{
    RiverEvent, RiverService,
    config::{Config, read_config},
    services::river::{CommandOutcome, RiverCommand},
    services::Service,
};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::path::PathBuf;

/// Watch and drive the river compositor.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Path to the config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the log level from the config file
    #[arg(long)]
    log_level: Option<LevelFilter>,

    #[command(subcommand)]
    command: Option<Action>,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Print compositor events as they arrive (default)
    Watch {
        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },
    /// Run a river command, e.g. `run set-focused-tags 4`
    Run {
        command: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Focus only the tag with the given zero-based index
    ToggleTag { tag: u32 },
}

fn init_logger(level: LevelFilter) -> Result<LoggerHandle> {
    Logger::with(
        LogSpecBuilder::new()
            .module(
                "riverbridge",
                if cfg!(debug_assertions) {
                    LevelFilter::Debug.max(level)
                } else {
                    level
                },
            )
            .build(),
    )
    .log_to_file(FileSpec::default().directory("/tmp/riverbridge"))
    .duplicate_to_stderr(Duplicate::All)
    .rotate(
        Criterion::Age(Age::Day),
        Naming::Timestamps,
        Cleanup::KeepLogFiles(7),
    )
    .start()
    .context("Failed to start logger")
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = read_config(cli.config.as_deref())?;
    let _logger = init_logger(cli.log_level.unwrap_or(config.log_level))?;

    info!("Starting riverbridge {}", env!("CARGO_PKG_VERSION"));

    match cli.command.unwrap_or(Action::Watch { json: false }) {
        Action::Watch { json } => watch(&config, json).await,
        Action::Run { command, args } => {
            execute(&config, RiverCommand::Run { command, args }).await
        }
        Action::ToggleTag { tag } => execute(&config, RiverCommand::ToggleFocusedTag(tag)).await,
    }
}

async fn watch(config: &Config, json: bool) -> Result<()> {
    let mut service = RiverService::start(config)?;
    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Failed to register signals")?;
    let handle = signals.handle();

    let result = loop {
        tokio::select! {
            event = service.next_event() => {
                let Some(event) = event else {
                    break Ok(());
                };

                if json {
                    println!("{}", serde_json::to_string(&event)?);
                } else {
                    println!("{event}");
                }

                if let RiverEvent::Terminated { reason } = event {
                    break Err(anyhow::anyhow!("river session ended: {reason}"));
                }
            }
            Some(signal) = signals.next() => {
                info!("Received signal {signal}, exiting");
                break Ok(());
            }
        }
    };

    handle.close();
    result
}

/// Waits for the session to settle, runs `command` and prints its output.
async fn execute(config: &Config, command: RiverCommand) -> Result<()> {
    let mut service = RiverService::start(config)?;

    while !service.is_ready() {
        match service.next_event().await {
            Some(RiverEvent::Ready) => {}
            Some(RiverEvent::Terminated { reason }) => {
                // Without a session the fallback tool can still run it.
                info!("River session unavailable ({reason}), using fallback");
                break;
            }
            Some(_) => {}
            None => break,
        }
    }

    let Some(invocation) = service.command(command) else {
        bail!("Nothing to run");
    };

    let outcome = loop {
        tokio::select! {
            outcome = invocation.completed() => break outcome,
            event = service.next_event() => match event {
                Some(RiverEvent::Terminated { reason }) => {
                    if let Some(outcome) = invocation.outcome() {
                        break outcome;
                    }
                    bail!("river session ended before the command completed: {reason}");
                }
                Some(_) => {}
                None => bail!("river event queue closed"),
            }
        }
    };

    // Let the continuation run before exiting.
    service.dispatch_pending(|_| {});

    match outcome {
        CommandOutcome::Success(output) => {
            if !output.is_empty() {
                println!("{output}");
            }
            Ok(())
        }
        CommandOutcome::Failure(message) => bail!("{message}"),
    }
}
