//! Production and silent sinks.

use std::fmt::Arguments;

use super::{LogLevel, LogSink};

/// Sink that forwards records to the `tracing` ecosystem.
///
/// The category is attached as a `category` field. `tracing` has no level
/// above ERROR, so [`LogLevel::Critical`] becomes an ERROR event carrying
/// `severity = "critical"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TracingSink {
    pub fn new() -> Self {
        Self
    }
}

impl LogSink for TracingSink {
    fn log(&self, category: &str, level: LogLevel, args: Arguments<'_>) {
        match level {
            LogLevel::Trace => tracing::trace!(category, "{}", args),
            LogLevel::Debug => tracing::debug!(category, "{}", args),
            LogLevel::Information => tracing::info!(category, "{}", args),
            LogLevel::Warning => tracing::warn!(category, "{}", args),
            LogLevel::Error => tracing::error!(category, "{}", args),
            LogLevel::Critical => tracing::error!(category, severity = "critical", "{}", args),
        }
    }
}

/// Sink that discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpSink;

impl LogSink for NoOpSink {
    #[inline]
    fn log(&self, _category: &str, _level: LogLevel, _args: Arguments<'_>) {}
}
