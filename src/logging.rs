//! Diagnostics: tracing setup for the binary and the optional log sink callback.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{fmt as tfmt, prelude::*, EnvFilter};

/// Callback receiving engine diagnostics (busy rejections, timeouts, panics,
/// dropped stale output). Not part of any tab's message stream.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone, Default)]
pub struct Diagnostics {
    sink: Option<LogSink>,
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl Diagnostics {
    pub fn new(sink: Option<LogSink>) -> Self {
        Self { sink }
    }

    pub fn emit(&self, msg: impl AsRef<str>) {
        if let Some(sink) = &self.sink {
            sink(msg.as_ref());
        }
    }
}

/// `<data_local_dir>/devtui/devtui.log`
pub fn default_log_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("devtui").join("devtui.log"))
}

/// Install the global subscriber. Logs go to a file because the terminal
/// belongs to the dashboard; when no file can be opened logging is off.
pub fn init_tracing(log_file: Option<&Path>) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let path = log_file.map(Path::to_path_buf).or_else(default_log_path);
    let opened = path.as_ref().and_then(|p| match open_log(p) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("devtui: logging disabled, cannot open {}: {e}", p.display());
            None
        }
    });

    match (opened, path) {
        (Some(file), Some(path)) => {
            let _ = tracing_subscriber::registry()
                .with(tfmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .with(env_filter)
                .try_init();
            tracing::info!(path = %path.display(), "logging initialized");
        }
        _ => {
            let _ = tracing_subscriber::registry().with(env_filter).try_init();
        }
    }
}

fn open_log(path: &Path) -> std::io::Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
