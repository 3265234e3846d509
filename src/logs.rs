// src/logs.rs
//
// =============================================================================
// PIPETLAB: OPERATION JOURNAL (v 0.1 )
// =============================================================================
//
// A thread-safe circular buffer of executed workflow operations.
//
// The executor writes one entry per operation; the CLI (or any observer
// thread holding a clone) reads them back as text lines.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

// ============================================================================
// 1. ENTRIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Outcome {
    Success,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct JournalEntry {
    pub timestamp: DateTime<Local>,
    pub index: usize,
    pub operation: String,
    pub outcome: Outcome,
}

impl JournalEntry {
    pub fn render(&self) -> String {
        let ts = self.timestamp.format("%Y-%m-%d %H:%M:%S");
        match &self.outcome {
            Outcome::Success => format!("[{ts}] #{} SUCCESS {}", self.index, self.operation),
            Outcome::Failed(e) => {
                format!("[{ts}] #{} FAILED {} :: {e}", self.index, self.operation)
            }
        }
    }
}

// ============================================================================
// 2. THE BUFFER (State)
// ============================================================================

#[derive(Clone)]
pub struct OperationJournal {
    entries: Arc<Mutex<VecDeque<JournalEntry>>>,
    capacity: usize,
}

impl Default for OperationJournal {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl OperationJournal {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    // A panic while holding the lock leaves the entries intact; keep using them.
    fn lock(&self) -> MutexGuard<'_, VecDeque<JournalEntry>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Adds an entry, dropping the oldest if full.
    pub fn record(&self, index: usize, operation: impl Into<String>, outcome: Outcome) {
        let entry = JournalEntry {
            timestamp: Local::now(),
            index,
            operation: operation.into(),
            outcome,
        };
        match &entry.outcome {
            Outcome::Success => log::info!("✓ #{} {}", entry.index, entry.operation),
            Outcome::Failed(e) => log::error!("✗ #{} {} :: {e}", entry.index, entry.operation),
        }
        let mut entries = self.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.lock().iter().cloned().collect()
    }

    /// Snapshot of the journal for rendering.
    pub fn lines(&self) -> Vec<String> {
        self.lock().iter().map(JournalEntry::render).collect()
    }

    pub fn failures(&self) -> usize {
        self.lock()
            .iter()
            .filter(|e| matches!(e.outcome, Outcome::Failed(_)))
            .count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_entries_fall_out() {
        let journal = OperationJournal::new(2);
        journal.record(0, "home", Outcome::Success);
        journal.record(1, "pick tips", Outcome::Success);
        journal.record(2, "suck", Outcome::Failed("no tips".into()));
        let entries = journal.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].index, 1);
        assert_eq!(journal.failures(), 1);
        assert!(journal.lines()[1].contains("FAILED suck :: no tips"));
    }

    #[test]
    fn clones_share_the_buffer() {
        let journal = OperationJournal::default();
        let observer = journal.clone();
        journal.record(0, "home", Outcome::Success);
        assert_eq!(observer.len(), 1);
    }
}
