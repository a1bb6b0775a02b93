//! Log files that stay open across events.
//!
//! `log_open` writes a header and registers the file, `log_write` appends
//! lines to it and `log_close` writes an `end:` marker and releases it.
//! Files are keyed by their resolved path. The root is made absolute up
//! front, so `a.log` and the absolute spelling of the same file share one
//! entry even when the configured root is relative.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use actuator_core::{Actuator, CommandContext, CommandHandler};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Open log files, shared by the log commands of one dispatcher.
#[derive(Clone)]
pub struct LogFiles {
    root: PathBuf,
    open: Arc<Mutex<HashMap<PathBuf, File>>>,
}

impl LogFiles {
    /// Relative paths resolve against `root`. A relative `root` is taken
    /// against the current directory now, not at each open.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self {
            root,
            open: Arc::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Open `path` for appending, writing the header first. `truncate`
    /// discards earlier content. Opening an already open file is a no-op.
    pub async fn open(&self, path: impl AsRef<Path>, truncate: bool) -> Result<PathBuf> {
        let resolved = self.resolve(path);
        let mut open = self.open.lock().await;
        if open.contains_key(&resolved) {
            debug!(path = %resolved.display(), "Log file already open");
            return Ok(resolved);
        }

        if let Some(dir) = resolved.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        }

        let mut options = OpenOptions::new();
        options.create(true);
        if truncate {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }
        let mut file = options
            .open(&resolved)
            .await
            .with_context(|| format!("Failed to open log file {}", resolved.display()))?;

        file.write_all(header(&resolved).as_bytes()).await?;
        file.flush().await?;

        info!(path = %resolved.display(), "Opened log file");
        open.insert(resolved.clone(), file);
        Ok(resolved)
    }

    /// Append `content` as one line. The file must be open.
    pub async fn write(&self, path: impl AsRef<Path>, content: &str) -> Result<()> {
        let resolved = self.resolve(path);
        let mut open = self.open.lock().await;
        let Some(file) = open.get_mut(&resolved) else {
            bail!("Log file not open: {}", resolved.display());
        };
        file.write_all(format!("{content}\n").as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Close one file, writing `end:<marker>` unless the marker is empty.
    /// Returns whether the file was open.
    pub async fn close(&self, path: impl AsRef<Path>, marker: &str) -> Result<bool> {
        let resolved = self.resolve(path);
        let file = self.open.lock().await.remove(&resolved);
        match file {
            Some(file) => {
                finish(&resolved, file, marker).await?;
                Ok(true)
            }
            None => {
                warn!(path = %resolved.display(), "Closing a log file that is not open");
                Ok(false)
            }
        }
    }

    /// Close every open file. Returns how many were closed.
    pub async fn close_all(&self, marker: &str) -> Result<usize> {
        let drained: Vec<(PathBuf, File)> = self.open.lock().await.drain().collect();
        let count = drained.len();
        for (path, file) in drained {
            finish(&path, file, marker).await?;
        }
        Ok(count)
    }

    pub async fn is_open(&self, path: impl AsRef<Path>) -> bool {
        self.open.lock().await.contains_key(&self.resolve(path))
    }

    /// Resolved paths of the open files, sorted.
    pub async fn open_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.open.lock().await.keys().cloned().collect();
        paths.sort();
        paths
    }
}

/// Path line, timestamp line, blank line.
fn header(path: &Path) -> String {
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("{}\n{now}\n\n", path.display())
}

async fn finish(path: &Path, mut file: File, marker: &str) -> Result<()> {
    if !marker.is_empty() {
        file.write_all(format!("\nend:{marker}\n").as_bytes()).await?;
    }
    file.flush().await?;
    info!(path = %path.display(), "Closed log file");
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub fn register(actuator: &Actuator, logs: &LogFiles) {
    actuator.register("log_open", LogOpen(logs.clone()));
    actuator.register("log_write", LogWrite(logs.clone()));
    actuator.register("log_close", LogClose(logs.clone()));
}

fn parse_args<T: DeserializeOwned>(command: &str, data: Value) -> Result<T> {
    serde_json::from_value(data).with_context(|| format!("Invalid arguments for {command}"))
}

#[derive(Debug, Deserialize)]
struct OpenArgs {
    path: String,
    /// `"a"` appends, `"w"` truncates.
    #[serde(default)]
    mode: Option<String>,
}

struct LogOpen(LogFiles);

#[async_trait]
impl CommandHandler for LogOpen {
    async fn handle(&self, _ctx: &CommandContext, data: Value) -> Result<()> {
        let args: OpenArgs = parse_args("log_open", data)?;
        let truncate = match args.mode.as_deref() {
            None | Some("a") => false,
            Some("w") => true,
            Some(other) => bail!("log_open mode must be 'a' or 'w', got '{other}'"),
        };
        self.0.open(&args.path, truncate).await?;
        Ok(())
    }

    fn help(&self) -> Option<&str> {
        Some("Open a log file and write its header. Args: path, mode (a|w).")
    }
}

#[derive(Debug, Deserialize)]
struct WriteArgs {
    path: String,
    content: Value,
    #[serde(default)]
    terminal_output: bool,
}

struct LogWrite(LogFiles);

#[async_trait]
impl CommandHandler for LogWrite {
    async fn handle(&self, _ctx: &CommandContext, data: Value) -> Result<()> {
        let args: WriteArgs = parse_args("log_write", data)?;
        let content = match args.content {
            Value::String(s) => s,
            other => other.to_string(),
        };
        self.0.write(&args.path, &content).await?;
        if args.terminal_output {
            info!(path = args.path.as_str(), "[Logger] {content}");
        }
        Ok(())
    }

    fn help(&self) -> Option<&str> {
        Some("Append a line to an open log file. Args: path, content, terminal_output.")
    }
}

#[derive(Debug, Default, Deserialize)]
struct CloseArgs {
    path: Option<String>,
    end_marker: Option<String>,
}

struct LogClose(LogFiles);

#[async_trait]
impl CommandHandler for LogClose {
    async fn handle(&self, ctx: &CommandContext, data: Value) -> Result<()> {
        let args: CloseArgs = if data.is_null() {
            CloseArgs::default()
        } else {
            parse_args("log_close", data)?
        };
        let marker = match args.end_marker {
            Some(marker) => marker,
            None => ctx
                .get("end_msg")
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
        };

        match args.path {
            Some(path) => {
                self.0.close(&path, &marker).await?;
            }
            None => {
                let closed = self.0.close_all(&marker).await?;
                debug!(closed, "Closed all log files");
            }
        }
        Ok(())
    }

    fn help(&self) -> Option<&str> {
        Some("Close one log file, or all of them. Args: path?, end_marker?.")
    }
}
