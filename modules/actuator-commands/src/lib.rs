//! Built-in commands for the dispatcher.
//!
//! `basic` covers flow control (`sleep`, `exit`, `get_command`); `logger`
//! covers log files kept open across events (`log_open`, `log_write`,
//! `log_close`).

pub mod basic;
pub mod logger;

use actuator_core::Actuator;

pub use logger::LogFiles;

/// Register every built-in command on `actuator`. The log commands share
/// `logs`, so the caller can inspect or close files after the run.
pub fn register_builtin(actuator: &Actuator, logs: &LogFiles) {
    basic::register(actuator);
    logger::register(actuator, logs);
}
