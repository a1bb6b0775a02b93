use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use actuator_stream::{MalformedPolicy, ReaderConfig, DEFAULT_CACHE_CAPACITY, DEFAULT_HOOK_POINT};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::info;

/// Looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "actuator.toml";

/// TOML-backed configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub reader: ReaderSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatcherConfig {
    pub handler_timeout_ms: Option<u64>,
    /// Merged into the dispatcher's allow-list at startup.
    pub allowed_vars: Vec<String>,
    pub end_msg: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            handler_timeout_ms: None,
            allowed_vars: Vec::new(),
            end_msg: "0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReaderSection {
    pub hook_point: String,
    /// History size. Must be at least 1; leave it out for the default.
    pub cache_capacity: Option<usize>,
    pub skip_malformed: bool,
}

impl Default for ReaderSection {
    fn default() -> Self {
        Self {
            hook_point: DEFAULT_HOOK_POINT.to_string(),
            cache_capacity: Some(DEFAULT_CACHE_CAPACITY),
            skip_malformed: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Relative log-file paths resolve against this directory.
    pub log_root: PathBuf,
    /// Emit JSON log lines instead of the human format.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_root: PathBuf::from("logs"),
            json: false,
        }
    }
}

impl FileConfig {
    pub fn handler_timeout(&self) -> Option<Duration> {
        self.dispatcher.handler_timeout_ms.map(Duration::from_millis)
    }

    pub fn reader_config(&self) -> ReaderConfig {
        let malformed = if self.reader.skip_malformed {
            MalformedPolicy::Skip
        } else {
            MalformedPolicy::Abort
        };
        ReaderConfig::builder()
            .hook_point(self.reader.hook_point.clone())
            .cache_capacity(self.reader.cache_capacity)
            .malformed(malformed)
            .build()
    }

    /// Apply `ACTUATOR_*` environment variables on top of the file values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| env::var(key).ok())
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(ms) = lookup("ACTUATOR_HANDLER_TIMEOUT_MS") {
            let ms = ms
                .parse()
                .context("ACTUATOR_HANDLER_TIMEOUT_MS must be a number of milliseconds")?;
            self.dispatcher.handler_timeout_ms = Some(ms);
        }
        if let Some(root) = lookup("ACTUATOR_LOG_ROOT") {
            self.logging.log_root = PathBuf::from(root);
        }
        if let Some(capacity) = lookup("ACTUATOR_CACHE_CAPACITY") {
            let capacity = capacity
                .parse()
                .context("ACTUATOR_CACHE_CAPACITY must be a number")?;
            self.reader.cache_capacity = Some(capacity);
        }
        if let Some(json) = lookup("ACTUATOR_LOG_JSON") {
            self.logging.json = matches!(json.as_str(), "1" | "true" | "yes");
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.reader.cache_capacity == Some(0) {
            bail!("reader.cache_capacity must be at least 1");
        }
        Ok(())
    }
}

/// Load and parse a TOML config file, resolving `{env:NAME}` strings.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content, |key| env::var(key).ok())
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load `path` if given (it must exist), else `actuator.toml` when present,
/// else defaults. Environment overrides are applied last.
pub fn load_or_default(path: Option<&Path>) -> Result<FileConfig> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            load_config(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => {
            info!("No config file found, using defaults");
            FileConfig::default()
        }
    };
    config.apply_env_overrides()?;
    Ok(config)
}

fn parse_config(content: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<FileConfig> {
    let mut value: toml::Value = content.parse().context("Invalid TOML")?;
    substitute_env(&mut value, &lookup);
    let config: FileConfig = value.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Replace every string of the form `{env:NAME}` with that variable's
/// value, or an empty string when unset.
fn substitute_env(value: &mut toml::Value, lookup: &impl Fn(&str) -> Option<String>) {
    match value {
        toml::Value::String(s) => {
            if let Some(name) = s.strip_prefix("{env:").and_then(|rest| rest.strip_suffix('}')) {
                *s = lookup(name).unwrap_or_default();
            }
        }
        toml::Value::Array(items) => {
            for item in items {
                substitute_env(item, lookup);
            }
        }
        toml::Value::Table(table) => {
            for (_, item) in table.iter_mut() {
                substitute_env(item, lookup);
            }
        }
        _ => {}
    }
}
