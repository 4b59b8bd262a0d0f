//! Asynchronous execution engine.
//!
//! `trigger` starts at most one operation per field. Zero-timeout fields run
//! inline on the caller; everything else runs on a blocking worker supervised
//! by a tokio task that enforces the deadline. Results and progress come back
//! through the merge queue.

mod merge;
mod operation;
pub(crate) mod store;

pub use operation::Progress;

pub(crate) use merge::run_merge;
pub(crate) use operation::catch_panic;

use crate::dashboard::{Field, Layout};
use crate::error::{DashError, OperationError};
use crate::logging::Diagnostics;
use crate::model::{Dispatch, FieldRef, Outcome, StreamEvent};
use crate::stream::TabContent;
use crate::tracker::OperationId;
use operation::{perform, supervise, Job};
use std::sync::{Arc, Mutex};
use store::Store;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

pub struct Engine {
    layout: Arc<Layout>,
    store: Arc<Mutex<Store>>,
    events: mpsc::Sender<StreamEvent>,
    runtime: Handle,
    diag: Diagnostics,
}

impl Engine {
    pub(crate) fn new(
        layout: Arc<Layout>,
        store: Arc<Mutex<Store>>,
        events: mpsc::Sender<StreamEvent>,
        runtime: Handle,
        diag: Diagnostics,
    ) -> Self {
        Self {
            layout,
            store,
            events,
            runtime,
            diag,
        }
    }

    /// Start an operation on `at` with `input` (ignored by execution handlers).
    ///
    /// Never blocks on the handler unless the field's timeout is zero.
    pub fn trigger(&self, at: FieldRef, input: &str) -> Result<Dispatch, DashError> {
        let field = self.layout.field(at)?;
        if !field.triggerable() {
            return Err(DashError::NotTriggerable(field.label.clone()));
        }

        let begun = store::lock(&self.store).begin(at, field);
        let operation = match begun {
            Ok(id) => id,
            Err(err) => {
                tracing::debug!(?at, "trigger rejected: {err}");
                self.diag.emit(format!("[{}] {err}", field.handler.name()));
                return Err(err);
            }
        };
        tracing::debug!(%operation, ?at, handler = field.handler.name(), "operation started");

        if field.timeout.is_zero() {
            return self
                .run_inline(at, field, operation, input)
                .map(Dispatch::Completed);
        }

        let job = Job {
            at,
            operation,
            timeout: field.timeout,
            handler: field.handler.clone(),
            role: field.binding.role,
            input: input.to_string(),
        };
        self.runtime
            .spawn(supervise(job, self.events.clone(), self.diag.clone()));
        Ok(Dispatch::Started(operation))
    }

    fn run_inline(
        &self,
        at: FieldRef,
        field: &Field,
        operation: OperationId,
        input: &str,
    ) -> Result<TabContent, DashError> {
        let progress = Progress::detached();
        let handler = &*field.handler;
        let role = field.binding.role;
        let (outcome, refreshed) =
            match catch_panic(|| perform(handler, role, operation, input, &progress)) {
                Ok((result, refreshed)) => (Outcome::Completed(result), refreshed),
                Err(msg) => {
                    tracing::warn!(handler = handler.name(), %operation, "handler panicked: {msg}");
                    self.diag
                        .emit(format!("[{}] {operation} panicked: {msg}", handler.name()));
                    (Outcome::Aborted(OperationError::Panicked(msg)), None)
                }
            };
        // The field stays in flight until this returns, so the id is still
        // current and `finish` only comes back empty for a tab without state.
        store::lock(&self.store)
            .finish(at, field, operation, outcome, refreshed)
            .ok_or(DashError::UnknownTab(at.tab))
    }
}
