use std::path::PathBuf;
use std::sync::Arc;

use actuator_commands::{register_builtin, LogFiles};
use actuator_common::{load_or_default, FileConfig};
use actuator_core::Actuator;
use actuator_stream::StreamingEventReader;
use anyhow::Result;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod repl;

#[derive(Parser)]
#[command(name = "actuator", about = "Dispatch JSON batch events to built-in commands")]
struct Cli {
    /// Path to config TOML file (defaults to ./actuator.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every event in a batch file, then exit
    Run {
        file: PathBuf,
        /// Stop after this many events
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Interactive session: start, pause and resume batch traversals
    Repl,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_or_default(cli.config.as_deref())?;
    init_tracing(&config)?;

    match cli.command {
        Command::Run { file, limit } => run(&config, file, limit).await,
        Command::Repl => repl::run(&config).await,
    }
}

fn init_tracing(config: &FileConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("actuator=info".parse()?);
    if config.logging.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

/// Dispatcher with the built-in commands and the configured fields.
pub(crate) fn build_actuator(config: &FileConfig) -> Result<(Actuator, LogFiles)> {
    let mut actuator = Actuator::new();
    if let Some(timeout) = config.handler_timeout() {
        actuator = actuator.with_handler_timeout(timeout);
    }
    actuator.configure_allowed(config.dispatcher.allowed_vars.iter().cloned());
    actuator.set(
        "end_msg",
        serde_json::Value::from(config.dispatcher.end_msg.as_str()),
        true,
    )?;

    let logs = LogFiles::new(&config.logging.log_root);
    register_builtin(&actuator, &logs);
    Ok((actuator, logs))
}

async fn run(config: &FileConfig, file: PathBuf, limit: Option<usize>) -> Result<()> {
    let (actuator, logs) = build_actuator(config)?;
    let reader = Arc::new(StreamingEventReader::new(config.reader_config()));

    info!(file = %file.display(), instance_id = actuator.instance_id(), "Starting batch run");
    let stream = reader.stream(&file);
    match limit {
        Some(n) => actuator.bind(stream.take(n)),
        None => actuator.bind(stream),
    }

    let result = actuator.run().await;
    let closed = logs.close_all("").await?;
    if closed > 0 {
        info!(closed, "Closed log files left open by the batch");
    }

    let summary = result?;
    info!(
        handled = summary.handled,
        unknown = summary.unknown,
        failed = summary.failed,
        cached = reader.cache_size(),
        "Batch run complete"
    );
    Ok(())
}
