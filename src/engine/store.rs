//! The one piece of state shared between the control thread and the merge task.
//!
//! Every stream append and every field state transition happens through the
//! methods here while the store lock is held. Stamps are taken under that same
//! lock, so append order and timestamp order cannot disagree.

use super::operation::catch_panic;
use crate::dashboard::{Field, WriterSlot};
use crate::error::DashError;
use crate::handler::Role;
use crate::model::{FieldPhase, FieldRef, Outcome, OutcomeKind};
use crate::stream::{classify, Draft, MessageStream, Severity, TabContent};
use crate::tracker::{OperationId, OperationTracker, Sequencer};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub(crate) struct FieldState {
    pub value: String,
    pub phase: FieldPhase,
    pub last_outcome: Option<OutcomeKind>,
}

impl FieldState {
    pub fn new(value: String) -> Self {
        Self {
            value,
            phase: FieldPhase::Idle,
            last_outcome: None,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct TabState {
    pub contents: MessageStream,
    pub fields: Vec<FieldState>,
}

#[derive(Debug, Default)]
pub(crate) struct Store {
    pub tabs: Vec<TabState>,
    pub tracker: OperationTracker,
    sequencer: Sequencer,
    revision: u64,
}

/// Lock the store, recovering from a poisoned lock. No code path panics while
/// holding it, and the data stays consistent per method call regardless.
pub(crate) fn lock(store: &Mutex<Store>) -> MutexGuard<'_, Store> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Store {
    pub fn new(tabs: Vec<TabState>) -> Self {
        Self {
            tabs,
            ..Default::default()
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn field_state(&self, at: FieldRef) -> Option<&FieldState> {
        self.tabs.get(at.tab)?.fields.get(at.field)
    }

    fn field_state_mut(&mut self, at: FieldRef) -> Option<&mut FieldState> {
        self.tabs.get_mut(at.tab)?.fields.get_mut(at.field)
    }

    /// Single append path for every message.
    pub fn append(&mut self, tab: usize, draft: Draft) -> Option<TabContent> {
        let stamp = self.sequencer.stamp();
        let stream = &mut self.tabs.get_mut(tab)?.contents;
        let entry = stream.append(stamp, draft).clone();
        self.revision += 1;
        Some(entry)
    }

    fn update(
        &mut self,
        tab: usize,
        id: OperationId,
        text: &str,
        severity: Severity,
    ) -> Option<TabContent> {
        let entry = self
            .tabs
            .get_mut(tab)?
            .contents
            .update(id, text, severity)?
            .clone();
        self.revision += 1;
        Some(entry)
    }

    /// Move a field from Idle to InFlight, or refuse with `Busy`.
    pub fn begin(&mut self, at: FieldRef, field: &Field) -> Result<OperationId, DashError> {
        let state = self
            .field_state(at)
            .ok_or(DashError::UnknownField {
                tab: at.tab,
                field: at.field,
            })?;
        if let FieldPhase::InFlight(operation) = state.phase {
            return Err(DashError::Busy {
                field: field.label.clone(),
                operation,
            });
        }

        let id = self.tracker.begin(at);
        if let Some(state) = self.field_state_mut(at) {
            state.phase = FieldPhase::InFlight(id);
        }
        self.revision += 1;
        Ok(id)
    }

    /// Record intermediate output. Returns `None` when `id` is no longer the
    /// field's current operation and the text was dropped.
    pub fn progress(
        &mut self,
        at: FieldRef,
        field: &Field,
        id: OperationId,
        text: &str,
    ) -> Option<TabContent> {
        if !self.tracker.is_current(at, id) {
            return None;
        }
        let severity = classify(text);
        if field.binding.tracks() {
            if let Some(entry) = self.update(at.tab, id, text, severity) {
                return Some(entry);
            }
        }
        let draft = Draft::new(field.handler.name(), text)
            .operation(id)
            .updatable(field.binding.tracks());
        self.append(at.tab, draft)
    }

    /// Close an operation and write its final message. `refreshed` is the
    /// handler's value read after a successful change.
    ///
    /// Returns `None` for a stale id: the operation already timed out or was
    /// superseded, so its result is discarded.
    pub fn finish(
        &mut self,
        at: FieldRef,
        field: &Field,
        id: OperationId,
        outcome: Outcome,
        refreshed: Option<String>,
    ) -> Option<TabContent> {
        if !self.tracker.finish(at, id) {
            return None;
        }
        let kind = outcome.kind();
        if let Some(state) = self.field_state_mut(at) {
            state.phase = FieldPhase::Idle;
            state.last_outcome = Some(kind);
            if let Some(value) = refreshed {
                state.value = value;
            }
        }

        let origin = field.handler.name();
        match outcome {
            Outcome::Completed(result) => {
                let (text, severity) = match result {
                    Ok(text) => {
                        let severity = match classify(&text) {
                            Severity::Normal => Severity::Success,
                            other => other,
                        };
                        (text, severity)
                    }
                    Err(err) => (err.to_string(), Severity::Error),
                };
                if field.binding.tracks() {
                    if let Some(entry) = self.update(at.tab, id, &text, severity) {
                        return Some(entry);
                    }
                }
                let draft = Draft::new(origin, text)
                    .severity(severity)
                    .operation(id)
                    .updatable(field.binding.tracks());
                self.append(at.tab, draft)
            }
            Outcome::Aborted(err) => {
                let draft = Draft::new(origin, err.to_string())
                    .severity(Severity::Error)
                    .operation(id);
                self.append(at.tab, draft)
            }
        }
    }

    /// Append or update on behalf of a writer. A writer whose accessors panic
    /// gets an Error entry in place of its line.
    pub fn write(&mut self, tab: usize, slot: &WriterSlot, text: &str) -> Option<TabContent> {
        let origin = slot.handler.name();
        let pinned = match catch_panic(|| slot.handler.as_writer().and_then(|w| w.severity())) {
            Ok(pinned) => pinned,
            Err(msg) => return self.writer_panicked(tab, origin, msg),
        };
        let severity = pinned.unwrap_or_else(|| classify(text));

        if slot.binding.role != Role::WriterTracker {
            return self.append(tab, Draft::new(origin, text).severity(severity));
        }

        let last = match catch_panic(|| {
            slot.handler
                .as_tracker()
                .and_then(|t| t.last_operation_id())
        }) {
            Ok(last) => last,
            Err(msg) => return self.writer_panicked(tab, origin, msg),
        };
        if let Some(id) = last {
            if let Some(entry) = self.update(tab, id, text, severity) {
                return Some(entry);
            }
        }

        let id = self.tracker.issue();
        let recorded = catch_panic(|| {
            if let Some(t) = slot.handler.as_tracker() {
                t.set_last_operation_id(Some(id));
            }
        });
        if let Err(msg) = recorded {
            return self.writer_panicked(tab, origin, msg);
        }
        let draft = Draft::new(origin, text)
            .severity(severity)
            .operation(id)
            .updatable(true);
        self.append(tab, draft)
    }

    fn writer_panicked(&mut self, tab: usize, origin: &str, msg: String) -> Option<TabContent> {
        tracing::warn!(writer = origin, "writer panicked: {msg}");
        let draft = Draft::new(origin, format!("writer panicked: {msg}")).severity(Severity::Error);
        self.append(tab, draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Progress;
    use crate::error::{HandlerError, OperationError};
    use crate::handler::{Binding, Execution, Handler, Tracker, Writer};
    use std::sync::Arc;
    use std::time::Duration;

    struct Step {
        tracks: bool,
    }

    impl Handler for Step {
        fn name(&self) -> &str {
            "step"
        }
        fn as_execution(&self) -> Option<&dyn Execution> {
            Some(self)
        }
        fn as_tracker(&self) -> Option<&dyn Tracker> {
            if self.tracks {
                Some(self as &dyn Tracker)
            } else {
                None
            }
        }
    }

    impl Execution for Step {
        fn execute(&self, _progress: &Progress) -> Result<String, HandlerError> {
            Ok("done".into())
        }
    }

    impl Tracker for Step {
        fn last_operation_id(&self) -> Option<OperationId> {
            None
        }
        fn set_last_operation_id(&self, _id: Option<OperationId>) {}
    }

    struct Faulty;

    impl Handler for Faulty {
        fn name(&self) -> &str {
            "faulty"
        }
        fn as_writer(&self) -> Option<&dyn Writer> {
            Some(self)
        }
    }

    impl Writer for Faulty {
        fn severity(&self) -> Option<Severity> {
            panic!("no severity today")
        }
    }

    fn field(tracks: bool) -> Field {
        let handler: Arc<dyn Handler> = Arc::new(Step { tracks });
        let binding = Binding::for_field(&*handler).unwrap();
        Field {
            label: "step".into(),
            timeout: Duration::from_secs(1),
            editable: true,
            handler,
            binding,
        }
    }

    fn store() -> Store {
        Store::new(vec![TabState {
            fields: vec![FieldState::new(String::new())],
            ..Default::default()
        }])
    }

    fn ok(text: &str) -> Outcome {
        Outcome::Completed(Ok(text.to_string()))
    }

    fn timed_out() -> Outcome {
        Outcome::Aborted(OperationError::TimedOut(Duration::from_millis(150)))
    }

    #[test]
    fn closed_operation_output_is_dropped() {
        let f = field(false);
        let at = FieldRef::new(0, 0);
        let mut s = store();

        let a = s.begin(at, &f).unwrap();
        assert!(s.progress(at, &f, a, "working").is_some());
        assert!(s.finish(at, &f, a, ok("done"), None).is_some());
        let len = s.tabs[0].contents.len();
        let revision = s.revision();

        assert!(s.progress(at, &f, a, "late").is_none());
        assert!(s.finish(at, &f, a, timed_out(), None).is_none());
        assert_eq!(s.tabs[0].contents.len(), len);
        assert_eq!(s.revision(), revision);
        assert_eq!(
            s.field_state(at).unwrap().last_outcome,
            Some(OutcomeKind::Completed)
        );
    }

    #[test]
    fn timed_out_operation_cannot_write_into_the_next_one() {
        let f = field(false);
        let at = FieldRef::new(0, 0);
        let mut s = store();

        let a = s.begin(at, &f).unwrap();
        assert!(s.finish(at, &f, a, timed_out(), None).is_some());
        let b = s.begin(at, &f).unwrap();

        assert!(s.progress(at, &f, a, "from a").is_none());
        assert!(s.finish(at, &f, a, ok("a finished"), None).is_none());
        assert_eq!(s.field_state(at).unwrap().phase, FieldPhase::InFlight(b));

        assert!(s.progress(at, &f, b, "from b").is_some());
        let texts: Vec<&str> = s.tabs[0]
            .contents
            .entries()
            .iter()
            .map(|c| c.text.as_str())
            .collect();
        assert_eq!(texts, vec!["operation timed out after 150ms", "from b"]);
    }

    #[test]
    fn in_flight_field_is_busy() {
        let f = field(false);
        let at = FieldRef::new(0, 0);
        let mut s = store();
        let a = s.begin(at, &f).unwrap();
        let revision = s.revision();
        match s.begin(at, &f) {
            Err(DashError::Busy { operation, .. }) => assert_eq!(operation, a),
            other => panic!("expected busy, got {other:?}"),
        }
        assert_eq!(s.revision(), revision);
        assert!(s.tracker.is_current(at, a));
    }

    #[test]
    fn tracker_rewrites_one_entry_through_to_the_result() {
        let f = field(true);
        let at = FieldRef::new(0, 0);
        let mut s = store();

        let a = s.begin(at, &f).unwrap();
        let first = s.progress(at, &f, a, "10%").unwrap();
        let second = s.progress(at, &f, a, "50%").unwrap();
        assert_eq!(second.stamp, first.stamp);
        assert_eq!(second.revisions, 1);

        let done = s.finish(at, &f, a, ok("deployed"), None).unwrap();
        assert_eq!(done.stamp, first.stamp);
        assert_eq!(done.text, "deployed");
        assert_eq!(done.severity, Severity::Success);
        assert_eq!(done.revisions, 2);
        assert_eq!(s.tabs[0].contents.len(), 1);
    }

    #[test]
    fn tracker_timeout_appends_after_progress() {
        let f = field(true);
        let at = FieldRef::new(0, 0);
        let mut s = store();

        let a = s.begin(at, &f).unwrap();
        s.progress(at, &f, a, "10%").unwrap();
        let err = s.finish(at, &f, a, timed_out(), None).unwrap();
        assert_eq!(err.severity, Severity::Error);
        assert_eq!(s.tabs[0].contents.len(), 2);
        assert_eq!(s.tabs[0].contents.entries()[0].text, "10%");
    }

    #[test]
    fn refreshed_value_lands_on_the_field() {
        let f = field(false);
        let at = FieldRef::new(0, 0);
        let mut s = store();
        let a = s.begin(at, &f).unwrap();
        s.finish(at, &f, a, ok("saved"), Some("8080".into()));
        assert_eq!(s.field_state(at).unwrap().value, "8080");
        assert_eq!(s.field_state(at).unwrap().phase, FieldPhase::Idle);
    }

    #[test]
    fn panicking_writer_leaves_an_error_entry() {
        let handler: Arc<dyn Handler> = Arc::new(Faulty);
        let slot = WriterSlot {
            binding: Binding::for_writer(&*handler).unwrap(),
            handler,
        };
        let mut s = store();

        let entry = s.write(0, &slot, "hello").unwrap();
        assert_eq!(entry.severity, Severity::Error);
        assert_eq!(entry.origin, "faulty");
        assert!(entry.text.contains("no severity today"), "{}", entry.text);

        let next = s.append(0, Draft::new("system", "still here")).unwrap();
        assert!(next.stamp > entry.stamp);
    }
}
