// SPDX-License-Identifier: MIT OR Apache-2.0
//! Undo/redo ledger.
//!
//! A single bounded sequence of entries plus a pointer. Entries before the
//! pointer can be undone, entries at or after it can be redone.

use crate::commands::{Command, Inverse};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

/// Maximum undo history depth
pub const MAX_HISTORY: usize = 100;

/// History errors
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Nothing to undo
    #[error("Nothing to undo")]
    NothingToUndo,

    /// Nothing to redo
    #[error("Nothing to redo")]
    NothingToRedo,
}

/// Result type for history operations
pub type Result<T> = std::result::Result<T, HistoryError>;

/// One undoable step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Human-readable description
    pub description: String,
    /// Command as originally invoked; re-applied on redo
    pub command: Command,
    /// Inverse that reverts the command
    pub undo: Inverse,
}

/// History statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStats {
    /// Entries that can be undone
    pub undo_count: usize,
    /// Entries that can be redone
    pub redo_count: usize,
    /// Maximum history depth
    pub max_depth: usize,
}

/// Undo/redo history manager
#[derive(Debug)]
pub struct History {
    entries: VecDeque<LedgerEntry>,
    /// Number of entries currently applied
    pointer: usize,
    max_depth: usize,
}

impl History {
    /// Create a new history manager
    pub fn new() -> Self {
        Self::with_max_depth(MAX_HISTORY)
    }

    /// Create with custom maximum depth
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            pointer: 0,
            max_depth: max_depth.max(1),
        }
    }

    /// Record a freshly executed command.
    ///
    /// Discards the redo tail and evicts the oldest entries past the limit.
    pub fn commit(&mut self, entry: LedgerEntry) {
        self.entries.truncate(self.pointer);
        self.entries.push_back(entry);

        while self.entries.len() > self.max_depth {
            self.entries.pop_front();
        }
        self.pointer = self.entries.len();
    }

    /// Entry the next undo reverts
    pub fn peek_undo(&self) -> Result<&LedgerEntry> {
        self.pointer
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .ok_or(HistoryError::NothingToUndo)
    }

    /// Entry the next redo re-applies
    pub fn peek_redo(&self) -> Result<&LedgerEntry> {
        self.entries
            .get(self.pointer)
            .ok_or(HistoryError::NothingToRedo)
    }

    /// Move the pointer back after a successful undo
    pub fn step_back(&mut self) -> Result<()> {
        self.peek_undo()?;
        self.pointer -= 1;
        Ok(())
    }

    /// Move the pointer forward after a successful redo, storing the fresh inverse
    pub fn step_forward(&mut self, undo: Inverse) -> Result<()> {
        let entry = self
            .entries
            .get_mut(self.pointer)
            .ok_or(HistoryError::NothingToRedo)?;
        entry.undo = undo;
        self.pointer += 1;
        Ok(())
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        self.pointer > 0
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        self.pointer < self.entries.len()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over stored entries, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter()
    }

    /// Clear all history
    pub fn clear(&mut self) {
        self.entries.clear();
        self.pointer = 0;
    }

    /// Get history statistics
    pub fn stats(&self) -> HistoryStats {
        HistoryStats {
            undo_count: self.pointer,
            redo_count: self.entries.len() - self.pointer,
            max_depth: self.max_depth,
        }
    }

    /// Get description of next undo operation
    pub fn undo_description(&self) -> Option<&str> {
        self.peek_undo().ok().map(|e| e.description.as_str())
    }

    /// Get description of next redo operation
    pub fn redo_description(&self) -> Option<&str> {
        self.peek_redo().ok().map(|e| e.description.as_str())
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cueplay_timeline::RundownId;

    fn entry(n: usize) -> LedgerEntry {
        LedgerEntry {
            description: format!("step {n}"),
            command: Command::NewRundown {
                rundown_id: RundownId::from(format!("r{n}")),
                name: format!("R{n}"),
            },
            undo: Inverse::RemoveRundown {
                rundown_id: RundownId::from(format!("r{n}")),
            },
        }
    }

    #[test]
    fn test_undo_redo_pointer() {
        let mut history = History::new();
        assert!(!history.can_undo());
        assert!(matches!(history.peek_undo(), Err(HistoryError::NothingToUndo)));

        history.commit(entry(1));
        history.commit(entry(2));
        assert_eq!(history.undo_description(), Some("step 2"));

        history.step_back().unwrap();
        assert!(history.can_redo());
        assert_eq!(history.redo_description(), Some("step 2"));

        history.step_forward(entry(9).undo).unwrap();
        assert!(!history.can_redo());
        assert_eq!(
            history.peek_undo().unwrap().undo,
            Inverse::RemoveRundown {
                rundown_id: RundownId::from("r9")
            }
        );
    }

    #[test]
    fn test_commit_discards_redo_tail() {
        let mut history = History::new();
        for n in 0..3 {
            history.commit(entry(n));
        }
        history.step_back().unwrap();
        history.step_back().unwrap();
        history.commit(entry(7));

        assert_eq!(history.len(), 2);
        assert!(!history.can_redo());
        assert_eq!(history.undo_description(), Some("step 7"));
    }

    #[test]
    fn test_bounded_oldest_first() {
        let mut history = History::new();
        for n in 0..MAX_HISTORY + 5 {
            history.commit(entry(n));
        }
        assert_eq!(history.len(), MAX_HISTORY);
        assert_eq!(history.entries().next().unwrap().description, "step 5");
        assert_eq!(
            history.stats(),
            HistoryStats {
                undo_count: MAX_HISTORY,
                redo_count: 0,
                max_depth: MAX_HISTORY,
            }
        );
    }

    #[test]
    fn test_clear() {
        let mut history = History::with_max_depth(3);
        history.commit(entry(1));
        history.clear();
        assert!(history.is_empty());
        assert!(!history.can_undo());
        assert!(matches!(history.step_forward(entry(1).undo), Err(HistoryError::NothingToRedo)));
    }
}
