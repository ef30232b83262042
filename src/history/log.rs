//! Bounded, reversible log of committed field values

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reference capacity of a field history
pub const DEFAULT_CAPACITY: usize = 50;

/// One committed value and its position in the log
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry<'a> {
    pub index: usize,
    pub value: &'a Value,
}

/// Persisted form of a log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySnapshot {
    pub current_index: usize,
    pub history: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Ordered values plus a cursor.
///
/// Invariant: when non-empty, `cursor < entries.len()`.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryLog {
    entries: Vec<Value>,
    cursor: usize,
    capacity: usize,
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl HistoryLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
            capacity: capacity.max(1),
        }
    }

    /// Rebuild a log from a persisted snapshot, repairing anything that
    /// breaks the invariants (oversized history, cursor out of range)
    pub fn from_snapshot(snapshot: HistorySnapshot, capacity: usize) -> Self {
        let mut log = Self::new(capacity);
        let mut entries = snapshot.history;
        let mut cursor = snapshot.current_index;

        if entries.len() > log.capacity {
            let overflow = entries.len() - log.capacity;
            entries.drain(0..overflow);
            cursor = cursor.saturating_sub(overflow);
        }
        if !entries.is_empty() && cursor >= entries.len() {
            cursor = entries.len() - 1;
        }

        log.entries = entries;
        log.cursor = if log.entries.is_empty() { 0 } else { cursor };
        log
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            current_index: self.cursor,
            history: self.entries.clone(),
            updated_at: Some(Utc::now()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn current_index(&self) -> Option<usize> {
        (!self.entries.is_empty()).then_some(self.cursor)
    }

    pub fn current(&self) -> Option<&Value> {
        self.entries.get(self.cursor)
    }

    pub fn entries(&self) -> impl Iterator<Item = HistoryEntry<'_>> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, value)| HistoryEntry { index, value })
    }

    pub fn can_undo(&self) -> bool {
        !self.entries.is_empty() && self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        !self.entries.is_empty() && self.cursor < self.entries.len() - 1
    }

    /// Record a new value: drop everything after the cursor, append, evict
    /// from the front past capacity and move the cursor to the new last entry
    pub fn set(&mut self, value: Value) -> usize {
        if !self.entries.is_empty() {
            self.entries.truncate(self.cursor + 1);
        }
        self.entries.push(value);

        if self.entries.len() > self.capacity {
            let overflow = self.entries.len() - self.capacity;
            self.entries.drain(0..overflow);
        }

        self.cursor = self.entries.len() - 1;
        self.cursor
    }

    /// Step back; returns the value now under the cursor
    pub fn undo(&mut self) -> Option<&Value> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.current()
    }

    /// Step forward; returns the value now under the cursor
    pub fn redo(&mut self) -> Option<&Value> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.current()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }
}
