//! Fault supervision for the worker loop.
//!
//! The loop runs in its own task. When that task panics, the [`Supervisor`]
//! logs the fault at critical level and applies its [`FaultPolicy`]: either
//! ask the host to exit with a non-zero status, or restart the loop after an
//! exponentially growing delay, up to a bounded number of attempts.

use std::any::Any;
use std::future::Future;
use std::time::Duration;

use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;

use super::LoopExit;
use crate::config::{ConfigError, Configuration};
use crate::host::ApplicationLifetime;
use crate::log::Logger;

/// Exit status requested when a fault is not recovered from (`EX_SOFTWARE`).
pub const FAULT_EXIT_CODE: i32 = 70;

/// Delay schedule for restarting a faulted loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay before the first restart.
    pub initial: Duration,
    /// Upper bound on any single delay.
    pub max: Duration,
    /// Restarts allowed before escalating to process exit.
    pub max_restarts: u32,
}

impl Backoff {
    /// Returns the delay before restart number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            max_restarts: 5,
        }
    }
}

/// What to do when the worker loop panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPolicy {
    /// Request process exit with `code`.
    Exit { code: i32 },
    /// Restart the loop according to `backoff`; exit with
    /// [`FAULT_EXIT_CODE`] once the restarts are used up.
    Restart { backoff: Backoff },
}

impl Default for FaultPolicy {
    fn default() -> Self {
        Self::Exit {
            code: FAULT_EXIT_CODE,
        }
    }
}

impl FaultPolicy {
    /// Reads the policy from the `Worker` configuration section.
    ///
    /// | key                      | meaning                          | default |
    /// |--------------------------|----------------------------------|---------|
    /// | `Worker:FaultPolicy`     | `exit` or `restart`              | `exit`  |
    /// | `Worker:ExitCode`        | status for `exit`                | 70      |
    /// | `Worker:MaxRestarts`     | restart budget                   | 5       |
    /// | `Worker:BackoffMillis`   | first restart delay              | 1000    |
    /// | `Worker:MaxBackoffMillis`| delay cap                        | 30000   |
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unknown policy name or a value
    /// that does not parse.
    pub fn from_configuration(config: &Configuration) -> Result<Self, ConfigError> {
        let worker = config.section("Worker");
        let name = worker.get("FaultPolicy").unwrap_or("exit");

        match name.to_ascii_lowercase().as_str() {
            "exit" => Ok(Self::Exit {
                code: worker.get_or("ExitCode", FAULT_EXIT_CODE)?,
            }),
            "restart" => {
                let defaults = Backoff::default();
                let initial = worker.get_or("BackoffMillis", millis(defaults.initial))?;
                let max = worker.get_or("MaxBackoffMillis", millis(defaults.max))?;
                Ok(Self::Restart {
                    backoff: Backoff {
                        initial: Duration::from_millis(initial),
                        max: Duration::from_millis(max),
                        max_restarts: worker.get_or("MaxRestarts", defaults.max_restarts)?,
                    },
                })
            }
            _ => Err(ConfigError::Invalid {
                key: "Worker:FaultPolicy".to_owned(),
                value: name.to_owned(),
                reason: "expected `exit` or `restart`".to_owned(),
            }),
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Applies a [`FaultPolicy`] to a loop task.
#[derive(Debug, Clone)]
pub struct Supervisor {
    policy: FaultPolicy,
    lifetime: ApplicationLifetime,
}

impl Supervisor {
    /// Creates a supervisor that reports unrecoverable faults to `lifetime`.
    pub fn new(policy: FaultPolicy, lifetime: ApplicationLifetime) -> Self {
        Self { policy, lifetime }
    }

    /// Runs loops produced by `spawn_loop` until one ends normally, the
    /// token is cancelled during a restart delay, or the policy gives up.
    ///
    /// Each loop runs in its own task; the task is aborted if this future is
    /// dropped.
    pub(crate) async fn supervise<F, Fut>(
        &self,
        logger: &Logger,
        cancel: &CancellationToken,
        mut spawn_loop: F,
    ) -> LoopExit
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut restarts = 0u32;

        loop {
            let task = AbortOnDropHandle::new(tokio::spawn(spawn_loop()));
            let fault = match task.await {
                Ok(()) => return LoopExit::Cancelled,
                Err(e) if e.is_cancelled() => return LoopExit::Cancelled,
                Err(e) => panic_message(e),
            };

            logger.critical(format_args!(
                "worker loop faulted after {restarts} restart(s): {fault}"
            ));

            match self.policy {
                FaultPolicy::Exit { code } => {
                    logger.critical(format_args!("requesting process exit with status {code}"));
                    self.lifetime.stop_application(code);
                    return LoopExit::Faulted;
                }
                FaultPolicy::Restart { backoff } => {
                    if restarts >= backoff.max_restarts {
                        logger.critical(format_args!(
                            "restart budget of {} exhausted, requesting process exit with status {FAULT_EXIT_CODE}",
                            backoff.max_restarts
                        ));
                        self.lifetime.stop_application(FAULT_EXIT_CODE);
                        return LoopExit::Faulted;
                    }

                    let delay = backoff.delay(restarts);
                    restarts += 1;
                    logger.warn(format_args!(
                        "restarting worker loop in {delay:?} (attempt {restarts}/{})",
                        backoff.max_restarts
                    ));

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return LoopExit::Cancelled,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => payload_str(payload.as_ref()).to_owned(),
        Err(err) => err.to_string(),
    }
}

fn payload_str(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::log::{LogLevel, MemorySink};

    async fn faulting_loop() {
        panic!("boom");
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let backoff = Backoff {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(500),
            max_restarts: 10,
        };
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(3), Duration::from_millis(500));
        assert_eq!(backoff.delay(64), Duration::from_millis(500));
    }

    #[test]
    fn policy_defaults_to_exit() {
        let config = Configuration::new();
        assert_eq!(
            FaultPolicy::from_configuration(&config).unwrap(),
            FaultPolicy::Exit {
                code: FAULT_EXIT_CODE
            }
        );
    }

    #[test]
    fn policy_reads_restart_settings() {
        let mut config = Configuration::new();
        config.set("Worker:FaultPolicy", "Restart");
        config.set("Worker:MaxRestarts", "2");
        config.set("Worker:BackoffMillis", "250");

        let policy = FaultPolicy::from_configuration(&config).unwrap();
        assert_eq!(
            policy,
            FaultPolicy::Restart {
                backoff: Backoff {
                    initial: Duration::from_millis(250),
                    max: Duration::from_secs(30),
                    max_restarts: 2,
                }
            }
        );
    }

    #[test]
    fn policy_rejects_unknown_names_and_bad_numbers() {
        let mut config = Configuration::new();
        config.set("Worker:FaultPolicy", "debugger");
        assert!(matches!(
            FaultPolicy::from_configuration(&config),
            Err(ConfigError::Invalid { .. })
        ));

        let mut config = Configuration::new();
        config.set("Worker:ExitCode", "seventy");
        assert!(FaultPolicy::from_configuration(&config).is_err());
    }

    #[tokio::test]
    async fn exit_policy_logs_and_requests_exit() {
        let sink = Arc::new(MemorySink::new());
        let logger = Logger::new(sink.clone(), "supervisor");
        let lifetime = ApplicationLifetime::new();
        let supervisor = Supervisor::new(FaultPolicy::Exit { code: 3 }, lifetime.clone());

        let exit = supervisor
            .supervise(&logger, &CancellationToken::new(), faulting_loop)
            .await;

        assert_eq!(exit, LoopExit::Faulted);
        assert!(lifetime.is_stopping());
        assert_eq!(lifetime.exit_code(), 3);

        let critical: Vec<_> = sink
            .records()
            .into_iter()
            .filter(|r| r.level == LogLevel::Critical)
            .collect();
        assert_eq!(critical.len(), 2);
        assert!(critical[0].message.contains("boom"));
    }

    #[tokio::test]
    async fn clean_loop_exit_is_not_a_fault() {
        let sink = Arc::new(MemorySink::new());
        let lifetime = ApplicationLifetime::new();
        let supervisor = Supervisor::new(FaultPolicy::default(), lifetime.clone());

        let exit = supervisor
            .supervise(
                &Logger::new(sink.clone(), "supervisor"),
                &CancellationToken::new(),
                || async {},
            )
            .await;

        assert_eq!(exit, LoopExit::Cancelled);
        assert!(!lifetime.is_stopping());
        assert!(sink.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_policy_gives_up_after_budget() {
        let sink = Arc::new(MemorySink::new());
        let lifetime = ApplicationLifetime::new();
        let backoff = Backoff {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(8),
            max_restarts: 2,
        };
        let supervisor = Supervisor::new(FaultPolicy::Restart { backoff }, lifetime.clone());

        let mut spawned = 0;
        let exit = supervisor
            .supervise(&Logger::new(sink.clone(), "supervisor"), &CancellationToken::new(), || {
                spawned += 1;
                faulting_loop()
            })
            .await;

        assert_eq!(exit, LoopExit::Faulted);
        assert_eq!(spawned, 3);
        assert_eq!(lifetime.exit_code(), FAULT_EXIT_CODE);
        let warnings = sink
            .records()
            .iter()
            .filter(|r| r.level == LogLevel::Warning)
            .count();
        assert_eq!(warnings, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_ends_supervision() {
        let lifetime = ApplicationLifetime::new();
        let backoff = Backoff {
            initial: Duration::from_secs(60),
            ..Backoff::default()
        };
        let supervisor = Supervisor::new(FaultPolicy::Restart { backoff }, lifetime.clone());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let exit = supervisor
            .supervise(
                &Logger::new(Arc::new(MemorySink::new()), "supervisor"),
                &cancel,
                faulting_loop,
            )
            .await;

        assert_eq!(exit, LoopExit::Cancelled);
        assert!(!lifetime.is_stopping());
    }

    #[test]
    fn payload_of_formatted_panic_is_readable() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("index 4 out of range"));
        assert_eq!(payload_str(payload.as_ref()), "index 4 out of range");
        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(payload_str(payload.as_ref()), "non-string panic payload");
    }
}
