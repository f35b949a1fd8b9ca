//! The periodic background worker.
//!
//! A [`Worker`] owns one background task that repeats a fixed cycle until it
//! is cancelled:
//!
//! 1. emit one record per severity level, trace through critical;
//! 2. wait [`CYCLE_INTERVAL`];
//! 3. run the injected unit of [`Work`];
//! 4. wait [`CYCLE_INTERVAL`] again.
//!
//! Cancellation is cooperative. The loop checks its token at the top of every
//! cycle and races it against both waits, so a stop issued while the loop is
//! waiting ends it without starting another cycle. Work runs on the blocking
//! pool and is never interrupted, but a stop does not wait past its timeout
//! for it to return.
//!
//! Panics inside the loop are handled by the worker's [`Supervisor`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::host::{HostError, HostedService};
use crate::log::{LogLevel, Logger};

pub mod helper;
pub mod supervisor;

pub use helper::{Helper, Work};
pub use supervisor::{Backoff, FAULT_EXIT_CODE, FaultPolicy, Supervisor};

/// Length of each of the two waits in a cycle.
pub const CYCLE_INTERVAL: Duration = Duration::from_secs(10);

/// Default bound on how long [`Worker::stop`] waits for the loop to finish.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Messages emitted at the top of every cycle, in emission order.
pub const LEVEL_MESSAGES: [(LogLevel, &str); 6] = [
    (LogLevel::Trace, "log trace"),
    (LogLevel::Debug, "log debug"),
    (LogLevel::Information, "log info"),
    (LogLevel::Warning, "log warn"),
    (LogLevel::Error, "log error"),
    (LogLevel::Critical, "log critical"),
];

/// How the background task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The loop observed cancellation.
    Cancelled,
    /// The loop panicked and the supervisor gave up on it.
    Faulted,
}

/// Outcome of [`Worker::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReport {
    /// The background task finished within the timeout.
    Completed(LoopExit),
    /// The timeout elapsed first; the task was aborted.
    TimedOut,
    /// The caller gave up waiting; the task was aborted.
    Abandoned,
    /// There was no background task to stop.
    NotRunning,
}

impl StopReport {
    /// Returns `true` if the loop is known to have terminated on its own.
    pub fn is_clean(self) -> bool {
        matches!(self, Self::Completed(_) | Self::NotRunning)
    }
}

impl fmt::Display for StopReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed(LoopExit::Cancelled) => f.write_str("loop exited after cancellation"),
            Self::Completed(LoopExit::Faulted) => f.write_str("loop had already faulted"),
            Self::TimedOut => f.write_str("loop did not exit before the stop timeout"),
            Self::Abandoned => f.write_str("stop was abandoned before the loop exited"),
            Self::NotRunning => f.write_str("loop was not running"),
        }
    }
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<LoopExit>,
}

/// Runs the leveled-logging cycle on a background task.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use loghost::host::ApplicationLifetime;
/// use loghost::log::{Logger, MemorySink};
/// use loghost::worker::{FaultPolicy, Helper, Supervisor, Worker};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let sink = Arc::new(MemorySink::new());
/// let helper = Helper::new(Logger::for_type::<Helper>(sink.clone()));
/// let supervisor = Supervisor::new(FaultPolicy::default(), ApplicationLifetime::new());
/// let mut worker = Worker::new(Arc::new(helper), Logger::for_type::<Worker>(sink), supervisor);
///
/// worker.start();
/// let report = worker.stop().await;
/// assert!(report.is_clean());
/// # }
/// ```
pub struct Worker {
    work: Arc<dyn Work>,
    logger: Logger,
    supervisor: Supervisor,
    stop_timeout: Duration,
    running: Option<Running>,
}

impl Worker {
    /// Creates a stopped worker that runs `work` once per cycle.
    pub fn new(work: Arc<dyn Work>, logger: Logger, supervisor: Supervisor) -> Self {
        Self {
            work,
            logger,
            supervisor,
            stop_timeout: STOP_TIMEOUT,
            running: None,
        }
    }

    /// Overrides [`STOP_TIMEOUT`].
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Returns `true` while the background task has not finished.
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Launches the background task and returns immediately.
    ///
    /// Each start gets a fresh cancellation token. Calling `start` while the
    /// task is still running logs a warning and leaves it alone.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self) {
        if self.is_running() {
            self.logger
                .warn(format_args!("start ignored: worker loop is already running"));
            return;
        }

        self.logger.debug(format_args!("starting"));

        let cancel = CancellationToken::new();
        let supervisor = self.supervisor.clone();
        let logger = self.logger.clone();
        let work = Arc::clone(&self.work);
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            supervisor
                .supervise(&logger, &token, || {
                    run_cycles(logger.clone(), Arc::clone(&work), token.clone())
                })
                .await
        });

        self.running = Some(Running { cancel, handle });
    }

    /// Cancels the background task and waits up to the stop timeout for it
    /// to finish.
    pub async fn stop(&mut self) -> StopReport {
        self.stop_until(&CancellationToken::new()).await
    }

    /// Like [`Worker::stop`], but also gives up as soon as `give_up` is
    /// cancelled. A task that has not finished by then is aborted.
    pub async fn stop_until(&mut self, give_up: &CancellationToken) -> StopReport {
        let Some(Running { cancel, mut handle }) = self.running.take() else {
            return StopReport::NotRunning;
        };

        cancel.cancel();
        self.logger.info(format_args!("stopped"));

        let report = tokio::select! {
            joined = tokio::time::timeout(self.stop_timeout, &mut handle) => match joined {
                Ok(Ok(exit)) => StopReport::Completed(exit),
                Ok(Err(e)) => {
                    self.logger
                        .error(format_args!("worker task ended abnormally: {e}"));
                    StopReport::Completed(LoopExit::Faulted)
                }
                Err(_) => StopReport::TimedOut,
            },
            _ = give_up.cancelled() => StopReport::Abandoned,
        };

        if !report.is_clean() {
            handle.abort();
            self.logger.warn(format_args!("{report}"));
        } else {
            self.logger.debug(format_args!("{report}"));
        }

        report
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("logger", &self.logger)
            .field("supervisor", &self.supervisor)
            .field("stop_timeout", &self.stop_timeout)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl HostedService for Worker {
    fn name(&self) -> &str {
        "worker"
    }

    async fn start(&mut self, _cancel: CancellationToken) -> Result<(), HostError> {
        Worker::start(self);
        Ok(())
    }

    async fn stop(&mut self, cancel: CancellationToken) -> Result<(), HostError> {
        let report = self.stop_until(&cancel).await;
        if report.is_clean() {
            Ok(())
        } else {
            Err(HostError::Stop {
                service: self.name().to_owned(),
                reason: report.to_string(),
            })
        }
    }
}

/// The cycle itself. Returns once cancellation is observed.
async fn run_cycles(logger: Logger, work: Arc<dyn Work>, cancel: CancellationToken) {
    while !cancel.is_cancelled() {
        for (level, message) in LEVEL_MESSAGES {
            logger.log(level, format_args!("{message}"));
        }

        if !pause(&cancel).await {
            break;
        }

        if !run_work(&work).await {
            break;
        }

        if !pause(&cancel).await {
            break;
        }
    }
}

/// Runs one unit of work on the blocking pool so timers keep firing while it
/// runs. A panic is re-raised on the loop task for the supervisor to see.
/// Returns `false` if the runtime cancelled the blocking task.
async fn run_work(work: &Arc<dyn Work>) -> bool {
    let work = Arc::clone(work);
    match tokio::task::spawn_blocking(move || work.run()).await {
        Ok(()) => true,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => false,
    }
}

/// Waits one interval. Returns `false` if cancelled first.
async fn pause(cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(CYCLE_INTERVAL) => true,
    }
}
