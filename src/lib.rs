//! # loghost
//!
//! A hosted background worker that emits one log record per severity level
//! on a fixed cycle and delegates a small unit of work in between.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use loghost::config::{Configuration, HostEnvironment};
//! use loghost::host::Host;
//! use loghost::log::{Logger, TracingSink};
//! use loghost::worker::{FaultPolicy, Helper, Supervisor, Worker};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sink = Arc::new(TracingSink::new());
//!     let builder = Host::builder(HostEnvironment::from_process()?, Configuration::new());
//!
//!     let helper = Helper::new(Logger::for_type::<Helper>(sink.clone()));
//!     let supervisor = Supervisor::new(FaultPolicy::default(), builder.lifetime());
//!     let worker = Worker::new(Arc::new(helper), Logger::for_type::<Worker>(sink), supervisor);
//!
//!     let code = builder.add_service(worker).build()?.run().await?;
//!     std::process::exit(code);
//! }
//! ```

pub mod config;
pub mod host;
pub mod log;
pub mod worker;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use host::{ApplicationLifetime, Host, HostError, HostedService};
pub use log::{LogLevel, LogSink, Logger};
pub use worker::{Helper, StopReport, Worker};
