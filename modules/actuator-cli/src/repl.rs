//! Interactive session over stdin.
//!
//! The dispatcher runs in its own task, fed through a channel source. Each
//! `start` spawns a feeder that pushes one file's traversal into the
//! channel; `pause` and `resume` act on the shared reader.

use std::path::PathBuf;
use std::sync::Arc;

use actuator_common::FileConfig;
use actuator_core::source::{self, EventSender};
use actuator_stream::StreamingEventReader;
use anyhow::{bail, Context, Result};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::build_actuator;

const HELP: &str = "\
commands:
  start <path> [limit]  feed a batch file to the dispatcher
  pause                 suspend the running traversal
  resume                continue a paused traversal
  clear                 drop the event history
  list                  show the last 10 events
  help                  show this text
  quit                  stop and exit";

#[derive(Debug, PartialEq, Eq)]
enum ReplCommand {
    Start { path: PathBuf, limit: Option<usize> },
    Pause,
    Resume,
    Clear,
    List,
    Help,
    Quit,
}

impl ReplCommand {
    /// `Ok(None)` for a blank line.
    fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Ok(None);
        };
        let command = match word.to_ascii_lowercase().as_str() {
            "start" => {
                let path = words.next().context("usage: start <path> [limit]")?;
                let limit = words
                    .next()
                    .map(|n| n.parse::<usize>())
                    .transpose()
                    .context("limit must be a non-negative number")?;
                Self::Start {
                    path: PathBuf::from(path),
                    limit,
                }
            }
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "clear" => Self::Clear,
            "list" => Self::List,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => bail!("unknown command '{other}', try 'help'"),
        };
        Ok(Some(command))
    }
}

pub async fn run(config: &FileConfig) -> Result<()> {
    let (actuator, logs) = build_actuator(config)?;
    let reader = Arc::new(StreamingEventReader::new(config.reader_config()));
    let (sender, events) = source::channel(64);
    actuator.bind(events);

    let mut dispatcher = tokio::spawn({
        let actuator = actuator.clone();
        async move { actuator.run().await }
    });
    let mut feeder: Option<JoinHandle<()>> = None;

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let command = match ReplCommand::parse(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(e) => {
                        println!("{e:#}");
                        continue;
                    }
                };
                match command {
                    ReplCommand::Start { path, limit } => {
                        if feeder.as_ref().is_some_and(|f| !f.is_finished()) {
                            println!("a traversal is already running");
                            continue;
                        }
                        feeder = Some(spawn_feeder(&reader, sender.clone(), path, limit));
                    }
                    ReplCommand::Pause => {
                        reader.pause();
                        println!("paused");
                    }
                    ReplCommand::Resume => {
                        reader.resume();
                        println!("resumed");
                    }
                    ReplCommand::Clear => {
                        reader.clear_cache();
                        println!("history cleared");
                    }
                    ReplCommand::List => {
                        let recent = reader.recent(10);
                        if recent.is_empty() {
                            println!("no events yet");
                        }
                        for event in recent {
                            println!("{} {}", event.event_type(), event.data());
                        }
                    }
                    ReplCommand::Help => println!("{HELP}"),
                    ReplCommand::Quit => break,
                }
            }
            finished = &mut dispatcher => {
                let summary = finished.context("dispatcher task failed")??;
                info!(handled = summary.handled, failed = summary.failed, "Dispatcher stopped");
                logs.close_all("").await?;
                return Ok(());
            }
        }
    }

    // Resume so a paused feeder can observe the closed channel.
    reader.resume();
    actuator.stop();
    if let Some(feeder) = feeder {
        feeder.abort();
    }
    drop(sender);

    let summary = dispatcher.await.context("dispatcher task failed")??;
    info!(handled = summary.handled, failed = summary.failed, "Session ended");
    logs.close_all("").await?;
    Ok(())
}

fn spawn_feeder(
    reader: &Arc<StreamingEventReader>,
    sender: EventSender,
    path: PathBuf,
    limit: Option<usize>,
) -> JoinHandle<()> {
    let stream = reader.stream(&path);
    tokio::spawn(async move {
        let mut stream = stream.take(limit.unwrap_or(usize::MAX));
        let mut fed = 0usize;
        while let Some(item) = stream.next().await {
            match item {
                Ok(event) => {
                    if sender.send(event).await.is_err() {
                        warn!("Dispatcher is gone, dropping traversal");
                        return;
                    }
                    fed += 1;
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Traversal failed");
                    return;
                }
            }
        }
        info!(path = %path.display(), fed, "Traversal fed to dispatcher");
    })
}
