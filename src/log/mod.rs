//! Leveled logging abstraction.
//!
//! Components log through a [`Logger`], a cheap handle that pairs a category
//! name with a shared [`LogSink`]. The sink decides where records go:
//! [`TracingSink`] forwards them to `tracing`, [`MemorySink`] keeps them for
//! inspection, and [`NoOpSink`] drops them.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use loghost::log::{LogLevel, Logger, MemorySink};
//!
//! let sink = Arc::new(MemorySink::new());
//! let logger = Logger::new(sink.clone(), "app.startup");
//! logger.info(format_args!("ready in {}ms", 12));
//!
//! let records = sink.records();
//! assert_eq!(records[0].level, LogLevel::Information);
//! assert_eq!(records[0].message, "ready in 12ms");
//! ```

use std::borrow::Cow;
use std::fmt::{self, Arguments};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

pub mod memory;
pub mod sinks;

pub use memory::{LogRecord, MemorySink};
pub use sinks::{NoOpSink, TracingSink};

/// Severity of a log record, from least to most important.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Step-by-step diagnostics, usually disabled.
    Trace,
    /// Developer diagnostics.
    Debug,
    /// Normal operational messages.
    Information,
    /// Something unexpected that the process recovered from.
    Warning,
    /// An operation failed.
    Error,
    /// The process or a component cannot continue.
    Critical,
}

impl LogLevel {
    /// All levels in increasing severity.
    pub const ALL: [LogLevel; 6] = [
        Self::Trace,
        Self::Debug,
        Self::Information,
        Self::Warning,
        Self::Error,
        Self::Critical,
    ];

    /// Returns the lowercase level name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Information => "information",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    /// The nearest `tracing` level. Critical maps to ERROR.
    pub fn to_tracing(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Information => tracing::Level::INFO,
            Self::Warning => tracing::Level::WARN,
            Self::Error | Self::Critical => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a [`LogLevel`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level: {0:?}")]
pub struct ParseLogLevelError(String);

impl std::str::FromStr for LogLevel {
    type Err = ParseLogLevelError;

    /// Accepts full names and the short forms used by most logging stacks,
    /// case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "information" | "info" => Ok(Self::Information),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" | "fatal" => Ok(Self::Critical),
            _ => Err(ParseLogLevelError(s.to_owned())),
        }
    }
}

/// Destination for log records.
///
/// Implementations must be `Send + Sync`: one sink is shared by every
/// [`Logger`] in the process, across tasks and threads.
pub trait LogSink: Send + Sync {
    /// Writes one record emitted under `category`.
    fn log(&self, category: &str, level: LogLevel, args: Arguments<'_>);
}

/// A category-bound logging handle.
///
/// Cloning is cheap; the sink is reference counted.
#[derive(Clone)]
pub struct Logger {
    category: Cow<'static, str>,
    sink: Arc<dyn LogSink>,
}

impl Logger {
    /// Creates a logger that writes to `sink` under `category`.
    pub fn new(sink: Arc<dyn LogSink>, category: impl Into<Cow<'static, str>>) -> Self {
        Self {
            category: category.into(),
            sink,
        }
    }

    /// Creates a logger whose category is the fully qualified name of `T`.
    pub fn for_type<T: ?Sized>(sink: Arc<dyn LogSink>) -> Self {
        Self::new(sink, std::any::type_name::<T>())
    }

    /// Returns the category records are emitted under.
    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn log(&self, level: LogLevel, args: Arguments<'_>) {
        self.sink.log(&self.category, level, args);
    }

    pub fn trace(&self, args: Arguments<'_>) {
        self.log(LogLevel::Trace, args);
    }

    pub fn debug(&self, args: Arguments<'_>) {
        self.log(LogLevel::Debug, args);
    }

    pub fn info(&self, args: Arguments<'_>) {
        self.log(LogLevel::Information, args);
    }

    pub fn warn(&self, args: Arguments<'_>) {
        self.log(LogLevel::Warning, args);
    }

    pub fn error(&self, args: Arguments<'_>) {
        self.log(LogLevel::Error, args);
    }

    pub fn critical(&self, args: Arguments<'_>) {
        self.log(LogLevel::Critical, args);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

/// Installs a console `tracing` subscriber for [`TracingSink`] to write to.
///
/// `RUST_LOG` takes precedence; otherwise records at `default_level` and
/// above are shown.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_console(
    default_level: LogLevel,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(default_level.to_tracing()).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered_by_severity() {
        for pair in LogLevel::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn parse_short_and_long_names() {
        assert_eq!("info".parse::<LogLevel>(), Ok(LogLevel::Information));
        assert_eq!("Warning".parse::<LogLevel>(), Ok(LogLevel::Warning));
        assert_eq!(" TRACE ".parse::<LogLevel>(), Ok(LogLevel::Trace));
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for level in LogLevel::ALL {
            assert_eq!(level.to_string().parse::<LogLevel>(), Ok(level));
        }
    }

    #[test]
    fn critical_maps_to_tracing_error() {
        assert_eq!(LogLevel::Critical.to_tracing(), tracing::Level::ERROR);
        assert_eq!(LogLevel::Warning.to_tracing(), tracing::Level::WARN);
    }

    #[test]
    fn for_type_uses_type_name_as_category() {
        struct Probe;
        let logger = Logger::for_type::<Probe>(Arc::new(NoOpSink));
        assert!(logger.category().ends_with("Probe"));
    }

    #[test]
    fn convenience_methods_map_to_levels() {
        let sink = Arc::new(MemorySink::new());
        let logger = Logger::new(sink.clone(), "test");
        logger.trace(format_args!("t"));
        logger.debug(format_args!("d"));
        logger.info(format_args!("i"));
        logger.warn(format_args!("w"));
        logger.error(format_args!("e"));
        logger.critical(format_args!("c"));

        let levels: Vec<_> = sink.records().into_iter().map(|r| r.level).collect();
        assert_eq!(levels, LogLevel::ALL.to_vec());
    }
}
