//! In-memory sink that keeps every record it receives.

use std::fmt::Arguments;
use std::sync::{Mutex, MutexGuard};

use super::{LogLevel, LogSink};

/// A single captured log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub category: String,
    pub level: LogLevel,
    pub message: String,
}

/// Sink that appends formatted records to an in-memory list.
///
/// Used by tests to assert on what a component logged, and in what order.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all records captured so far.
    pub fn records(&self) -> Vec<LogRecord> {
        self.lock().clone()
    }

    /// Counts records whose message equals `message`.
    pub fn count_message(&self, message: &str) -> usize {
        self.lock().iter().filter(|r| r.message == message).count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    // A panic while holding the lock cannot leave a half-written record.
    fn lock(&self) -> MutexGuard<'_, Vec<LogRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LogSink for MemorySink {
    fn log(&self, category: &str, level: LogLevel, args: Arguments<'_>) {
        let record = LogRecord {
            category: category.to_owned(),
            level,
            message: args.to_string(),
        };
        self.lock().push(record);
    }
}
