//! Single consumer of the merge queue.
//!
//! Workers and writers only ever send; this task is the only one that applies
//! their events to the store, one at a time, in queue order.

use super::store::{self, Store};
use crate::dashboard::Layout;
use crate::logging::Diagnostics;
use crate::model::StreamEvent;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

pub(crate) async fn run_merge(
    layout: Arc<Layout>,
    store: Arc<Mutex<Store>>,
    mut events: mpsc::Receiver<StreamEvent>,
    mut shutdown: oneshot::Receiver<()>,
    diag: Diagnostics,
) {
    loop {
        tokio::select! {
            ev = events.recv() => {
                match ev {
                    Some(ev) => apply(&layout, &store, &diag, ev),
                    None => break,
                }
            }
            _ = &mut shutdown => {
                tracing::debug!("merge task stopping");
                break;
            }
        }
    }
}

pub(crate) fn apply(layout: &Layout, store: &Mutex<Store>, diag: &Diagnostics, ev: StreamEvent) {
    match ev {
        StreamEvent::Progress {
            at,
            operation,
            text,
        } => {
            let Ok(field) = layout.field(at) else {
                return;
            };
            if store::lock(store)
                .progress(at, field, operation, &text)
                .is_none()
            {
                tracing::debug!(%operation, ?at, "dropped progress from stale operation");
                diag.emit(format!(
                    "[{}] dropped stale progress from {operation}",
                    field.handler.name()
                ));
            }
        }
        StreamEvent::Finished {
            at,
            operation,
            outcome,
            refreshed,
        } => {
            let Ok(field) = layout.field(at) else {
                return;
            };
            let kind = outcome.kind();
            match store::lock(store).finish(at, field, operation, outcome, refreshed) {
                Some(_) => tracing::debug!(%operation, ?at, ?kind, "operation finished"),
                None => {
                    tracing::debug!(%operation, ?at, "discarded result of stale operation");
                    diag.emit(format!(
                        "[{}] discarded result of {operation}",
                        field.handler.name()
                    ));
                }
            }
        }
        StreamEvent::Write { tab, writer, text } => {
            let Some(slot) = layout.writer(tab, writer) else {
                return;
            };
            store::lock(store).write(tab, slot, &text);
        }
    }
}
