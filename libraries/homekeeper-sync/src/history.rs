//! Bounded per-directory sync history
//!
//! Kept in memory only; lost on restart.

use crate::types::SyncRecord;
use std::collections::VecDeque;

/// Ring of the most recent sync records for one directory
#[derive(Debug, Clone)]
pub struct SyncHistory {
    records: VecDeque<SyncRecord>,
    max_size: usize,
}

impl SyncHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(max_size.min(64)),
            max_size,
        }
    }

    /// Record a finished sync, discarding the oldest record when full
    pub fn push(&mut self, record: SyncRecord) {
        if self.max_size == 0 {
            return;
        }

        while self.records.len() >= self.max_size {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Most recent record
    pub fn last(&self) -> Option<&SyncRecord> {
        self.records.back()
    }

    /// Records ordered oldest first
    pub fn to_vec(&self) -> Vec<SyncRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}
