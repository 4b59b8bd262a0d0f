//! Operation ids and the single ordering source for message timestamps.

use crate::model::FieldRef;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use time::{OffsetDateTime, UtcOffset};

/// Correlation id of one operation. Ids are issued from a single counter, so a
/// larger id always belongs to a later operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct OperationId(u64);

impl OperationId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Position of a message in the global append order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Stamp {
    pub seq: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

/// Hands out stamps whose `seq` strictly increases and whose wall-clock time
/// never goes backwards, even if the system clock does.
#[derive(Debug)]
pub struct Sequencer {
    seq: u64,
    last: OffsetDateTime,
    offset: UtcOffset,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequencer {
    pub fn new() -> Self {
        // Resolving the local offset can fail once other threads exist; UTC is fine then.
        let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
        Self {
            seq: 0,
            last: OffsetDateTime::UNIX_EPOCH.to_offset(offset),
            offset,
        }
    }

    pub fn stamp(&mut self) -> Stamp {
        let now = OffsetDateTime::now_utc().to_offset(self.offset);
        let at = now.max(self.last);
        self.last = at;
        self.seq += 1;
        Stamp { seq: self.seq, at }
    }
}

/// Issues operation ids and remembers which one is current per field.
///
/// Only the current id of a field may write to the stream on that field's
/// behalf. Starting, finishing or timing out an operation moves the current
/// id, which is how late output from abandoned workers gets discarded.
#[derive(Debug, Default)]
pub struct OperationTracker {
    issued: u64,
    current: HashMap<FieldRef, OperationId>,
    last: HashMap<FieldRef, OperationId>,
}

impl OperationTracker {
    /// Fresh id not bound to any field (writers use these).
    pub fn issue(&mut self) -> OperationId {
        self.issued += 1;
        OperationId(self.issued)
    }

    /// Start a new operation on `at`. Any previous id for the field stops being current.
    pub fn begin(&mut self, at: FieldRef) -> OperationId {
        let id = self.issue();
        if let Some(prev) = self.current.insert(at, id) {
            tracing::debug!(%prev, next = %id, ?at, "superseding operation");
        }
        self.last.insert(at, id);
        id
    }

    pub fn is_current(&self, at: FieldRef, id: OperationId) -> bool {
        self.current.get(&at) == Some(&id)
    }

    pub fn current(&self, at: FieldRef) -> Option<OperationId> {
        self.current.get(&at).copied()
    }

    /// Last id issued for the field, whether or not it is still running.
    pub fn last(&self, at: FieldRef) -> Option<OperationId> {
        self.last.get(&at).copied()
    }

    /// Close `id`. Returns false if it was already superseded or closed.
    pub fn finish(&mut self, at: FieldRef, id: OperationId) -> bool {
        if self.is_current(at, id) {
            self.current.remove(&at);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_operation_invalidates_previous() {
        let mut t = OperationTracker::default();
        let at = FieldRef::new(0, 1);
        let first = t.begin(at);
        let second = t.begin(at);
        assert!(second > first);
        assert!(!t.is_current(at, first));
        assert!(t.is_current(at, second));
        assert!(!t.finish(at, first));
        assert!(t.finish(at, second));
        assert_eq!(t.current(at), None);
        assert_eq!(t.last(at), Some(second));
    }

    #[test]
    fn fields_are_tracked_independently() {
        let mut t = OperationTracker::default();
        let a = FieldRef::new(0, 0);
        let b = FieldRef::new(1, 0);
        let op_a = t.begin(a);
        let op_b = t.begin(b);
        assert!(t.is_current(a, op_a));
        assert!(t.is_current(b, op_b));
        assert!(!t.is_current(b, op_a));
    }

    #[test]
    fn stamps_are_monotonic() {
        let mut seq = Sequencer::new();
        let mut prev = seq.stamp();
        for _ in 0..1000 {
            let next = seq.stamp();
            assert!(next.seq > prev.seq);
            assert!(next.at >= prev.at);
            prev = next;
        }
    }
}
