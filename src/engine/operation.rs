//! Running one operation: the progress conduit, the worker, the deadline.

use crate::error::{HandlerError, OperationError};
use crate::handler::{Handler, Role};
use crate::logging::Diagnostics;
use crate::model::{FieldRef, Outcome, StreamEvent};
use crate::tracker::OperationId;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::mpsc;

/// Conduit a handler uses to report intermediate output while it runs.
///
/// Reports are relayed to the field's tab tagged with the operation id. Once
/// the operation times out they are silently ignored.
#[derive(Debug, Clone)]
pub struct Progress {
    conduit: Option<Conduit>,
}

#[derive(Debug, Clone)]
struct Conduit {
    at: FieldRef,
    operation: OperationId,
    events: mpsc::Sender<StreamEvent>,
    cancelled: Arc<AtomicBool>,
}

impl Progress {
    /// A conduit that goes nowhere. Synchronous fields get one of these, and
    /// it is handy when exercising a handler on its own.
    pub fn detached() -> Self {
        Self { conduit: None }
    }

    pub(crate) fn attached(
        at: FieldRef,
        operation: OperationId,
        events: mpsc::Sender<StreamEvent>,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            conduit: Some(Conduit {
                at,
                operation,
                events,
                cancelled,
            }),
        }
    }

    /// Send a progress line. Blocks while the merge queue is full, so it must
    /// not be called from inside an async task.
    pub fn report(&self, text: impl Into<String>) {
        let Some(c) = &self.conduit else {
            return;
        };
        if c.cancelled.load(Ordering::Relaxed) {
            return;
        }
        let ev = StreamEvent::Progress {
            at: c.at,
            operation: c.operation,
            text: text.into(),
        };
        if c.events.blocking_send(ev).is_err() {
            tracing::debug!(operation = %c.operation, "merge queue closed, progress dropped");
        }
    }

    /// True once the engine stopped accepting this operation's output.
    pub fn is_cancelled(&self) -> bool {
        self.conduit
            .as_ref()
            .is_some_and(|c| c.cancelled.load(Ordering::Relaxed))
    }

    pub fn operation(&self) -> Option<OperationId> {
        self.conduit.as_ref().map(|c| c.operation)
    }
}

/// Everything a worker needs, detached from the dashboard.
pub(crate) struct Job {
    pub at: FieldRef,
    pub operation: OperationId,
    pub timeout: Duration,
    pub handler: Arc<dyn Handler>,
    pub role: Role,
    pub input: String,
}

/// Call the handler action matching its role.
fn invoke(
    handler: &dyn Handler,
    role: Role,
    input: &str,
    progress: &Progress,
) -> Result<String, HandlerError> {
    match role {
        Role::Edit | Role::Interactive => match handler.as_edit() {
            Some(edit) => edit.change(input, progress),
            None => Err(HandlerError::failed("handler lost its edit capability")),
        },
        Role::Execution => match handler.as_execution() {
            Some(exec) => exec.execute(progress),
            None => Err(HandlerError::failed("handler lost its execution capability")),
        },
        Role::Display | Role::Writer | Role::WriterTracker => Err(HandlerError::failed(
            format!("{} handlers cannot be triggered", role_name(role)),
        )),
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::Display => "display",
        Role::Edit => "edit",
        Role::Execution => "execution",
        Role::Interactive => "interactive",
        Role::Writer => "writer",
        Role::WriterTracker => "tracking writer",
    }
}

/// Every handler call made for one operation: record the id on a tracking
/// handler, run the action, then read back the value after a successful change.
pub(crate) fn perform(
    handler: &dyn Handler,
    role: Role,
    operation: OperationId,
    input: &str,
    progress: &Progress,
) -> (Result<String, HandlerError>, Option<String>) {
    if let Some(tracked) = handler.as_tracker() {
        tracked.set_last_operation_id(Some(operation));
    }
    let result = invoke(handler, role, input, progress);
    let refreshed = match &result {
        Ok(_) if role.takes_input() => handler.as_edit().map(|e| e.value()),
        _ => None,
    };
    (result, refreshed)
}

/// Run handler code that is not already on a worker. A panic comes back as its message.
pub(crate) fn catch_panic<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(panic_message)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run a job on a blocking worker under its deadline and queue the outcome.
///
/// On timeout the worker is detached, not killed: it keeps running until the
/// handler returns, but its progress is muted and its result is dropped with
/// the join handle.
pub(crate) async fn supervise(job: Job, events: mpsc::Sender<StreamEvent>, diag: Diagnostics) {
    let Job {
        at,
        operation,
        timeout,
        handler,
        role,
        input,
    } = job;

    let cancelled = Arc::new(AtomicBool::new(false));
    let progress = Progress::attached(at, operation, events.clone(), cancelled.clone());
    let name = handler.name().to_string();
    let worker = tokio::task::spawn_blocking(move || {
        perform(&*handler, role, operation, &input, &progress)
    });

    let (outcome, refreshed) = match tokio::time::timeout(timeout, worker).await {
        Ok(Ok((result, refreshed))) => (Outcome::Completed(result), refreshed),
        Ok(Err(join_err)) => {
            let msg = if join_err.is_panic() {
                panic_message(join_err.into_panic())
            } else {
                join_err.to_string()
            };
            tracing::warn!(handler = %name, %operation, "handler panicked: {msg}");
            diag.emit(format!("[{name}] {operation} panicked: {msg}"));
            (Outcome::Aborted(OperationError::Panicked(msg)), None)
        }
        Err(_) => {
            cancelled.store(true, Ordering::Relaxed);
            tracing::info!(handler = %name, %operation, ?timeout, "operation timed out");
            diag.emit(format!("[{name}] {operation} timed out"));
            (Outcome::Aborted(OperationError::TimedOut(timeout)), None)
        }
    };

    let finished = StreamEvent::Finished {
        at,
        operation,
        outcome,
        refreshed,
    };
    if events.send(finished).await.is_err() {
        tracing::debug!(%operation, "merge queue closed before result was delivered");
    }
}
