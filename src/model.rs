use crate::error::{HandlerError, OperationError};
use crate::handler::Role;
use crate::stream::TabContent;
use crate::tracker::OperationId;
use serde::Serialize;

/// Address of a field: tab index, then field index within the tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FieldRef {
    pub tab: usize,
    pub field: usize,
}

impl FieldRef {
    pub fn new(tab: usize, field: usize) -> Self {
        Self { tab, field }
    }
}

/// Where a field is in its operation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldPhase {
    Idle,
    InFlight(OperationId),
}

/// How the last operation on a field ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutcomeKind {
    Completed,
    TimedOut,
    Failed,
}

/// Terminal result of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed(Result<String, HandlerError>),
    Aborted(OperationError),
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Completed(Ok(_)) => OutcomeKind::Completed,
            Outcome::Completed(Err(_)) => OutcomeKind::Failed,
            Outcome::Aborted(OperationError::TimedOut(_)) => OutcomeKind::TimedOut,
            Outcome::Aborted(_) => OutcomeKind::Failed,
        }
    }
}

/// Items on the merge queue. Everything that changes a stream from a worker
/// or a writer travels as one of these.
#[derive(Debug)]
pub(crate) enum StreamEvent {
    Progress {
        at: FieldRef,
        operation: OperationId,
        text: String,
    },
    Finished {
        at: FieldRef,
        operation: OperationId,
        outcome: Outcome,
        /// Field value read back after a successful change.
        refreshed: Option<String>,
    },
    Write {
        tab: usize,
        writer: usize,
        text: String,
    },
}

/// What `trigger` did with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Ran on the caller's thread; this is the final message.
    Completed(TabContent),
    /// Running on a worker; results arrive through the merge queue.
    Started(OperationId),
}

/// Renderer-facing snapshot of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldView {
    pub label: String,
    pub name: String,
    pub value: String,
    pub role: Role,
    pub editable: bool,
    pub phase: FieldPhase,
    pub last_outcome: Option<OutcomeKind>,
    pub waiting_for_user: bool,
}

impl FieldView {
    pub fn in_flight(&self) -> bool {
        matches!(self.phase, FieldPhase::InFlight(_))
    }
}

/// Renderer-facing snapshot of a tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TabView {
    pub title: String,
    pub fields: Vec<FieldView>,
    pub contents: Vec<TabContent>,
    pub revision: u64,
}
