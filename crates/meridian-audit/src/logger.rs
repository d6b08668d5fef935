//! Bounded in-memory run log, newest-first.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::record::RunRecord;

/// Default record cap.
pub const DEFAULT_CAPACITY: usize = 500;

/// Smallest accepted record cap.
pub const MIN_CAPACITY: usize = 50;

/// Bounded ring of [`RunRecord`]s.
///
/// Records are held newest-first; when the cap is reached the oldest record
/// is dropped. Mutations are compact critical sections behind a mutex, and
/// `list` returns a snapshot.
pub struct RunLogger {
    records: Mutex<VecDeque<RunRecord>>,
    capacity: usize,
}

impl RunLogger {
    /// Create a logger with the default cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a logger with an explicit cap, floored at [`MIN_CAPACITY`].
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_CAPACITY);
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// The record cap.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a record, dropping the oldest when at cap.
    pub fn log(&self, record: RunRecord) {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        records.push_front(record);
        while records.len() > self.capacity {
            records.pop_back();
        }
    }

    /// Snapshot of at most `min(limit, cap)` records, newest first.
    #[must_use]
    pub fn list(&self, limit: usize) -> Vec<RunRecord> {
        let records = self
            .records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        records.iter().take(limit.min(self.capacity)).cloned().collect()
    }

    /// Number of retained records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every retained record.
    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }
}

impl Default for RunLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RunLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLogger")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RunOutcome;
    use chrono::Utc;
    use meridian_core::{Backend, Capability, IntegrationId};

    fn record(message: &str) -> RunRecord {
        RunRecord {
            run_id: RunRecord::new_run_id(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            duration_ms: 1,
            chat_id: None,
            agent_id: None,
            integration_id: IntegrationId::Stac,
            capability: Capability::new("catalog.search"),
            backend: Some(Backend::Native),
            outcome: RunOutcome::Success,
            message: message.to_string(),
            error_code: None,
        }
    }

    #[test]
    fn test_newest_first() {
        let logger = RunLogger::new();
        logger.log(record("first"));
        logger.log(record("second"));

        let records = logger.list(10);
        assert_eq!(records[0].message, "second");
        assert_eq!(records[1].message, "first");
    }

    #[test]
    fn test_cap_drops_oldest() {
        let logger = RunLogger::with_capacity(50);
        for i in 0..60 {
            logger.log(record(&format!("run-{i}")));
        }
        assert_eq!(logger.len(), 50);
        let records = logger.list(50);
        assert_eq!(records[0].message, "run-59");
        assert_eq!(records[49].message, "run-10");
    }

    #[test]
    fn test_capacity_floor() {
        let logger = RunLogger::with_capacity(5);
        assert_eq!(logger.capacity(), MIN_CAPACITY);
    }

    #[test]
    fn test_list_clamps_limit() {
        let logger = RunLogger::with_capacity(50);
        for _ in 0..10 {
            logger.log(record("x"));
        }
        assert_eq!(logger.list(3).len(), 3);
        assert_eq!(logger.list(1000).len(), 10);
    }

    #[test]
    fn test_clear() {
        let logger = RunLogger::new();
        logger.log(record("x"));
        assert!(!logger.is_empty());
        logger.clear();
        assert!(logger.is_empty());
    }
}
