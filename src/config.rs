//! Dashboard configuration.
//!
//! Loaded from JSON; every field has a default so a partial file is fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub title: String,
    /// Timeout for fields that do not set their own. Zero runs handlers synchronously.
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,
    /// Capacity of the merge queue between workers and the stream.
    pub queue_capacity: usize,
    #[serde(with = "humantime_serde")]
    pub tick_rate: Duration,
    pub log_file: Option<PathBuf>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            title: "devtui".into(),
            default_timeout: Duration::from_secs(10),
            queue_capacity: 256,
            tick_rate: Duration::from_millis(100),
            log_file: None,
        }
    }
}

/// `<config_dir>/devtui/config.json`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("devtui").join("config.json"))
}

/// Read a config file. An explicit path must exist; the default path may be absent.
pub fn load(explicit: Option<&Path>) -> Result<DashboardConfig> {
    let (path, required) = match explicit {
        Some(p) => (p.to_path_buf(), true),
        None => match default_path() {
            Some(p) => (p, false),
            None => return Ok(DashboardConfig::default()),
        },
    };

    if !required && !path.exists() {
        return Ok(DashboardConfig::default());
    }

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("read config {}", path.display()))?;
    let cfg: DashboardConfig = serde_json::from_str(&raw)
        .with_context(|| format!("parse config {}", path.display()))?;
    Ok(cfg.sanitized())
}

impl DashboardConfig {
    fn sanitized(mut self) -> Self {
        if self.queue_capacity == 0 {
            tracing::warn!("queue_capacity of 0 is not allowed, using 1");
            self.queue_capacity = 1;
        }
        self
    }
}
