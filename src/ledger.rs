use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::{ConsensusError, Result};

/// Commands replicated through consensus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    /// No-op entry (ledger sentinel, leader take-office commit).
    Noop,
    /// An application-level operation to apply in order.
    Invoke {
        action: String,
        params: serde_json::Value,
    },
}

/// A single entry in the replicated ledger.
///
/// Log matching invariant: if two replicas each hold an entry at the same
/// index with the same term, the entries are identical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub index: u64,
    pub term: u64,
    pub command: Command,
}

impl LogEntry {
    pub fn new(index: u64, term: u64, command: Command) -> Self {
        Self {
            index,
            term,
            command,
        }
    }
}

/// Bounded, offset-indexed sequence of log entries.
///
/// `offset` is the global index of the oldest retained entry. Retention is
/// a sliding window: once the window is full, appending drops the oldest
/// entry and advances `offset`. A sentinel no-op at index 0, term 0 is
/// seeded at creation so the ledger is never empty.
#[derive(Debug)]
pub struct Ledger {
    entries: VecDeque<LogEntry>,
    offset: u64,
    capacity: usize,
}

impl Ledger {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut entries = VecDeque::with_capacity(capacity);
        entries.push_back(LogEntry::new(0, 0, Command::Noop));
        Self {
            entries,
            offset: 0,
            capacity,
        }
    }

    /// Append an entry at the tail. The entry's index must be exactly
    /// `offset + len`.
    pub fn append(&mut self, entry: LogEntry) -> Result<()> {
        let expected = self.offset + self.entries.len() as u64;
        if entry.index != expected {
            return Err(ConsensusError::NonContiguousIndex {
                expected,
                got: entry.index,
            });
        }
        self.entries.push_back(entry);
        if self.entries.len() > self.capacity {
            self.entries.pop_front();
            self.offset += 1;
        }
        Ok(())
    }

    /// Discard the in-memory tail from `start_index` onward and append
    /// `entries` in its place.
    pub fn replace(&mut self, start_index: u64, entries: Vec<LogEntry>) -> Result<()> {
        if start_index < self.offset {
            return Err(ConsensusError::StaleTruncation {
                requested: start_index,
                offset: self.offset,
            });
        }
        let expected = self.offset + self.entries.len() as u64;
        if start_index > expected {
            return Err(ConsensusError::NonContiguousIndex {
                expected,
                got: start_index,
            });
        }
        self.entries.truncate((start_index - self.offset) as usize);
        for entry in entries {
            self.append(entry)?;
        }
        Ok(())
    }

    /// Look up an entry by global index.
    pub fn get(&self, index: u64) -> Result<&LogEntry> {
        let end = self.offset + self.entries.len() as u64;
        if index < self.offset || index >= end {
            return Err(ConsensusError::OutOfRange {
                index,
                offset: self.offset,
                end,
            });
        }
        Ok(&self.entries[(index - self.offset) as usize])
    }

    /// Transient tail view: the last `n` retained entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<&LogEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).collect()
    }

    /// Scanning backward from the tail, find the greatest term `<= term`
    /// and the first retained index carrying it. Returns `None` when every
    /// retained entry has a newer term.
    pub fn find_term_start(&self, term: u64) -> Option<(u64, u64)> {
        let mut found: Option<(u64, u64)> = None;
        for (i, entry) in self.entries.iter().enumerate().rev() {
            match found {
                None if entry.term <= term => {
                    found = Some((entry.term, self.offset + i as u64));
                }
                Some((t, _)) if entry.term == t => {
                    found = Some((t, self.offset + i as u64));
                }
                Some(_) => break,
                None => {}
            }
        }
        found
    }

    /// The tail entry. The sentinel guarantees at least one entry.
    pub fn last(&self) -> &LogEntry {
        self.entries.back().expect("ledger is never empty")
    }

    pub fn last_index(&self) -> u64 {
        self.last().index
    }

    pub fn last_term(&self) -> u64 {
        self.last().term
    }

    pub fn term_at(&self, index: u64) -> Result<u64> {
        self.get(index).map(|e| e.term)
    }

    /// Whether the local ledger matches `(index, term)`. History evicted
    /// by the retention window is treated as settled and matching.
    pub fn matches(&self, index: u64, term: u64) -> bool {
        if index < self.offset {
            return true;
        }
        matches!(self.term_at(index), Ok(t) if t == term)
    }

    /// Clone of the retained entries from `index` onward (for replication).
    pub fn entries_from(&self, index: u64) -> Vec<LogEntry> {
        if index < self.offset {
            return Vec::new();
        }
        let start = (index - self.offset) as usize;
        self.entries.iter().skip(start).cloned().collect()
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
