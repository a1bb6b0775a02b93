//! Flow-control commands: `sleep`, `exit` and `get_command`.

use std::time::Duration;

use actuator_core::{context_handler_fn, handler_fn, Actuator, CommandNames, QueryMode};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

pub fn register(actuator: &Actuator) {
    actuator.register(
        "sleep",
        handler_fn(|data| async move { sleep(&data).await })
            .with_help("Wait `sleep` (or `duration`) seconds before the next event."),
    );

    actuator.register(
        "exit",
        context_handler_fn(|ctx, data| async move {
            let end = match data.get("end").and_then(Value::as_str) {
                Some(end) => end.to_string(),
                None => ctx
                    .get("end_msg")
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_else(|| "0".to_string()),
            };
            ctx.stop();
            info!("[END]: {end}");
            Ok(())
        })
        .with_help("Stop the dispatcher, reporting `end` or the end_msg field."),
    );

    actuator.register(
        "get_command",
        context_handler_fn(|ctx, data| async move {
            let args = GetCommandArgs::parse(data)?;
            let mode: QueryMode = args.return_type.parse()?;
            let info = ctx.query_commands(args.include_help, mode);

            let names: Vec<String> = match info.commands {
                CommandNames::Set(set) => {
                    let mut names: Vec<String> = set.into_iter().collect();
                    names.sort();
                    names
                }
                lazy @ CommandNames::Lazy(_) => lazy.collect(),
            };
            info!(commands = ?names, "Registered commands");

            if let Some(help) = info.help {
                for (name, text) in help {
                    let text = if text.is_empty() { "no help" } else { text.as_str() };
                    info!("{name}: {text}");
                }
            }
            Ok(())
        })
        .with_help("Log the registered commands. Args: return_type (set|generator), include_help."),
    );
}

/// Seconds from `sleep`, falling back to `duration`.
fn sleep_duration(data: &Value) -> Result<Duration> {
    let secs = data
        .get("sleep")
        .or_else(|| data.get("duration"))
        .context("sleep needs a `sleep` or `duration` field")?;
    let Some(secs) = secs.as_f64() else {
        bail!("sleep duration must be a number of seconds, got {secs}");
    };
    Duration::try_from_secs_f64(secs).with_context(|| format!("invalid sleep duration {secs}"))
}

async fn sleep(data: &Value) -> Result<()> {
    let duration = sleep_duration(data)?;
    tokio::time::sleep(duration).await;
    info!(secs = duration.as_secs_f64(), "Slept");
    Ok(())
}

#[derive(Debug, Deserialize)]
struct GetCommandArgs {
    #[serde(default = "default_return_type")]
    return_type: String,
    #[serde(default)]
    include_help: bool,
}

fn default_return_type() -> String {
    "generator".to_string()
}

impl GetCommandArgs {
    fn parse(data: Value) -> Result<Self> {
        if data.is_null() {
            return Ok(Self {
                return_type: default_return_type(),
                include_help: false,
            });
        }
        serde_json::from_value(data).context("get_command expects {return_type?, include_help?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sleep_reads_either_field() {
        assert_eq!(
            sleep_duration(&json!({"sleep": 0.5})).unwrap(),
            Duration::from_millis(500)
        );
        assert_eq!(
            sleep_duration(&json!({"duration": 2})).unwrap(),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn sleep_rejects_bad_durations() {
        assert!(sleep_duration(&json!({})).is_err());
        assert!(sleep_duration(&json!({"sleep": "soon"})).is_err());
        assert!(sleep_duration(&json!({"sleep": -1})).is_err());
    }

    #[test]
    fn get_command_args_default() {
        let args = GetCommandArgs::parse(Value::Null).unwrap();
        assert_eq!(args.return_type, "generator");
        assert!(!args.include_help);

        let args = GetCommandArgs::parse(json!({"return_type": "set"})).unwrap();
        assert_eq!(args.return_type, "set");
    }
}
