//! Error taxonomy.
//!
//! Caller-facing errors (`DashError`, `ConfigError`) are returned synchronously.
//! Handler-originated failures (`HandlerError`, `OperationError`) never cross the
//! engine boundary as errors; they end up as messages in a tab's stream.

use crate::tracker::OperationId;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to the navigation/rendering layer.
#[derive(Debug, Error)]
pub enum DashError {
    #[error("field `{field}` is busy with operation {operation}")]
    Busy {
        field: String,
        operation: OperationId,
    },
    #[error("no tab at index {0}")]
    UnknownTab(usize),
    #[error("no field at index {field} in tab {tab}")]
    UnknownField { tab: usize, field: usize },
    #[error("no writer named `{name}` in tab {tab}")]
    UnknownWriter { tab: usize, name: String },
    #[error("field `{0}` cannot be triggered")]
    NotTriggerable(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("dashboard must be built inside a tokio runtime")]
    NoRuntime,
    #[error("dashboard has shut down")]
    Closed,
}

/// Setup-time misconfiguration. Detected while building the dashboard.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("handler `{handler}` exposes no supported capability")]
    NoCapability { handler: String },
    #[error("handler `{handler}` waits for user input but has no editable value")]
    InteractiveWithoutEdit { handler: String },
    #[error("handler `{handler}` is registered as a writer but does not expose one")]
    NotAWriter { handler: String },
    #[error("tab `{0}` has no fields")]
    EmptyTab(String),
    #[error("writer `{writer}` registered twice in tab `{tab}`")]
    DuplicateWriter { tab: String, writer: String },
}

/// What a handler returns when it rejects or fails an action.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    /// Input rejected (empty, out of range, malformed). The field keeps its value.
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Terminal failure of one operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OperationError {
    #[error(transparent)]
    Handler(#[from] HandlerError),
    #[error("operation timed out after {}", humantime::format_duration(*.0))]
    TimedOut(Duration),
    #[error("handler panicked: {0}")]
    Panicked(String),
}
