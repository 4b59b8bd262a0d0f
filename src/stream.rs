//! Per-tab message log.
//!
//! Entries are only ever appended; the one exception is an entry marked
//! updatable, which the operation that created it may rewrite in place.
//! Rewrites keep the entry's original stamp so append order and timestamp
//! order always agree.

use crate::tracker::{OperationId, Stamp};
use serde::{Deserialize, Serialize};
use time::macros::format_description;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    #[default]
    Normal,
    Success,
    Warning,
    Error,
}

const PREFIXES: [(&str, Severity); 3] = [
    ("error:", Severity::Error),
    ("warning:", Severity::Warning),
    ("success:", Severity::Success),
];

/// Classify free text. Pure: the same text always yields the same severity.
///
/// An explicit `ERROR:`/`WARNING:`/`SUCCESS:` prefix (any case) wins. Otherwise
/// words are scanned for markers, checked in order success, fail/error, warn.
/// Markers match at word starts, so "failed" and "warnings" count but
/// "terror" does not.
pub fn classify(text: &str) -> Severity {
    let lower = text.trim_start().to_lowercase();
    for (prefix, severity) in PREFIXES {
        if lower.starts_with(prefix) {
            return severity;
        }
    }

    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has = |markers: &[&str]| {
        words
            .iter()
            .any(|w| markers.iter().any(|m| w.starts_with(m)))
    };

    if has(&["success"]) {
        Severity::Success
    } else if has(&["fail", "error"]) {
        Severity::Error
    } else if has(&["warn"]) {
        Severity::Warning
    } else {
        Severity::Normal
    }
}

/// One message in a tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TabContent {
    pub stamp: Stamp,
    pub text: String,
    pub severity: Severity,
    /// Name of the handler that produced the message.
    pub origin: String,
    pub operation: Option<OperationId>,
    pub updatable: bool,
    /// How many times the entry was rewritten after being appended.
    pub revisions: u32,
}

impl TabContent {
    pub fn time_label(&self) -> String {
        self.stamp
            .at
            .format(format_description!("[hour]:[minute]:[second]"))
            .unwrap_or_default()
    }

    /// Render as `HH:MM:SS [origin] text`.
    pub fn format(&self) -> String {
        if self.origin.is_empty() {
            format!("{} {}", self.time_label(), self.text)
        } else {
            format!("{} [{}] {}", self.time_label(), self.origin, self.text)
        }
    }
}

/// Everything about a new entry except its stamp.
#[derive(Debug, Clone)]
pub struct Draft {
    pub text: String,
    pub severity: Severity,
    pub origin: String,
    pub operation: Option<OperationId>,
    pub updatable: bool,
}

impl Draft {
    /// Draft with severity classified from `text`.
    pub fn new(origin: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            severity: classify(&text),
            text,
            origin: origin.into(),
            operation: None,
            updatable: false,
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn operation(mut self, id: OperationId) -> Self {
        self.operation = Some(id);
        self
    }

    pub fn updatable(mut self, yes: bool) -> Self {
        self.updatable = yes;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct MessageStream {
    entries: Vec<TabContent>,
}

impl MessageStream {
    pub fn append(&mut self, stamp: Stamp, draft: Draft) -> &TabContent {
        debug_assert!(
            self.entries.last().map_or(true, |last| last.stamp <= stamp),
            "stamps must be appended in order"
        );
        self.entries.push(TabContent {
            stamp,
            text: draft.text,
            severity: draft.severity,
            origin: draft.origin,
            operation: draft.operation,
            updatable: draft.updatable,
            revisions: 0,
        });
        &self.entries[self.entries.len() - 1]
    }

    /// Rewrite the most recent updatable entry carrying `id`. Returns `None`
    /// when there is no such entry; the caller appends instead.
    pub fn update(
        &mut self,
        id: OperationId,
        text: impl Into<String>,
        severity: Severity,
    ) -> Option<&TabContent> {
        let entry = self
            .entries
            .iter_mut()
            .rev()
            .find(|e| e.operation == Some(id))?;
        if !entry.updatable {
            return None;
        }
        entry.text = text.into();
        entry.severity = severity;
        entry.revisions += 1;
        Some(entry)
    }

    pub fn entries(&self) -> &[TabContent] {
        &self.entries
    }

    pub fn last(&self) -> Option<&TabContent> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::{OperationTracker, Sequencer};

    #[test]
    fn explicit_prefixes_win() {
        assert_eq!(classify("ERROR: disk full"), Severity::Error);
        assert_eq!(classify("  warning: low memory"), Severity::Warning);
        assert_eq!(classify("Success: but the word error appears"), Severity::Success);
        assert_eq!(classify("error: build completed successfully"), Severity::Error);
    }

    #[test]
    fn markers_classify_without_prefix() {
        assert_eq!(
            classify("Deployment completed successfully"),
            Severity::Success
        );
        assert_eq!(classify("Build failed on step 3"), Severity::Error);
        assert_eq!(classify("3 errors found"), Severity::Error);
        assert_eq!(classify("deprecated flag, warn only"), Severity::Warning);
        assert_eq!(classify("Compiling main.go"), Severity::Normal);
    }

    #[test]
    fn markers_must_start_a_word() {
        assert_eq!(classify("terrorform plan"), Severity::Normal);
        assert_eq!(classify("unsuccessful attempt"), Severity::Normal);
    }

    #[test]
    fn classification_is_order_independent() {
        let inputs = ["ERROR: x", "ok", "WARNING: y", "completed successfully"];
        let first: Vec<_> = inputs.iter().map(|t| classify(t)).collect();
        let second: Vec<_> = inputs.iter().rev().map(|t| classify(t)).collect();
        assert_eq!(first, second.into_iter().rev().collect::<Vec<_>>());
    }

    #[test]
    fn update_only_touches_updatable_entries() {
        let mut seq = Sequencer::new();
        let mut ids = OperationTracker::default();
        let op = ids.issue();
        let mut stream = MessageStream::default();

        stream.append(seq.stamp(), Draft::new("build", "step 1").operation(op));
        assert!(stream.update(op, "step 2", Severity::Normal).is_none());

        let tracked = ids.issue();
        let stamp = seq.stamp();
        stream.append(stamp, Draft::new("deploy", "10%").operation(tracked).updatable(true));
        let updated = stream.update(tracked, "90%", Severity::Normal).unwrap();
        assert_eq!(updated.text, "90%");
        assert_eq!(updated.stamp, stamp);
        assert_eq!(updated.revisions, 1);
        assert_eq!(stream.len(), 2);
    }

    #[test]
    fn format_includes_time_and_origin() {
        let mut seq = Sequencer::new();
        let mut stream = MessageStream::default();
        let line = stream
            .append(seq.stamp(), Draft::new("db", "Port configured: 8080"))
            .format();
        assert!(line.ends_with(" [db] Port configured: 8080"), "{line}");
        assert_eq!(line.len(), "HH:MM:SS".len() + " [db] Port configured: 8080".len());
    }
}
