//! Service host. Starts long-running services and stops them on shutdown.
//!
//! A [`Host`] owns a list of [`HostedService`]s. [`Host::run`] starts them in
//! registration order, waits for Ctrl+C, SIGTERM or an
//! [`ApplicationLifetime::stop_application`] request, then stops them in
//! reverse order under a shared shutdown deadline.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{error, info, warn};

use crate::config::{ConfigError, Configuration, HostEnvironment};

pub mod lifetime;

pub use lifetime::ApplicationLifetime;

/// Default time allowed for all services to stop.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

const SHUTDOWN_TIMEOUT_KEY: &str = "Host:ShutdownTimeoutSeconds";

/// Errors produced while running the host.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("service `{service}` failed to start: {reason}")]
    Start { service: String, reason: String },

    #[error("service `{service}` did not stop cleanly: {reason}")]
    Stop { service: String, reason: String },

    #[error("failed to install signal handler: {0}")]
    Signal(#[from] std::io::Error),
}

/// A long-running component whose lifecycle is managed by the [`Host`].
///
/// Both methods are expected to return promptly.
#[async_trait]
pub trait HostedService: Send {
    /// Short name used in log records and errors.
    fn name(&self) -> &str;

    /// Starts the service. `cancel` fires if the host begins shutting down
    /// before startup completes.
    async fn start(&mut self, cancel: CancellationToken) -> Result<(), HostError>;

    /// Stops the service. `cancel` fires when the shutdown deadline passes;
    /// the service should stop waiting for graceful completion then.
    async fn stop(&mut self, cancel: CancellationToken) -> Result<(), HostError>;
}

/// Builder for [`Host`].
pub struct HostBuilder {
    environment: HostEnvironment,
    configuration: Configuration,
    lifetime: ApplicationLifetime,
    services: Vec<Box<dyn HostedService>>,
    shutdown_timeout: Option<Duration>,
}

impl HostBuilder {
    pub fn new(environment: HostEnvironment, configuration: Configuration) -> Self {
        Self {
            environment,
            configuration,
            lifetime: ApplicationLifetime::new(),
            services: Vec::new(),
            shutdown_timeout: None,
        }
    }

    /// The lifetime the built host will observe. Hand clones to services
    /// that need to request shutdown.
    pub fn lifetime(&self) -> ApplicationLifetime {
        self.lifetime.clone()
    }

    /// Registers a service. Services start in registration order.
    pub fn add_service(mut self, service: impl HostedService + 'static) -> Self {
        self.services.push(Box::new(service));
        self
    }

    /// Overrides the `Host:ShutdownTimeoutSeconds` setting.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// # Errors
    ///
    /// Returns [`HostError::Config`] if `Host:ShutdownTimeoutSeconds` is not
    /// a number, or is negative, infinite or too large for a [`Duration`].
    pub fn build(self) -> Result<Host, HostError> {
        let shutdown_timeout = match self.shutdown_timeout {
            Some(timeout) => timeout,
            None => match self
                .configuration
                .get_parsed::<f64>(SHUTDOWN_TIMEOUT_KEY)?
            {
                Some(secs) => {
                    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::Invalid {
                        key: SHUTDOWN_TIMEOUT_KEY.to_owned(),
                        value: secs.to_string(),
                        reason: e.to_string(),
                    })?
                }
                None => DEFAULT_SHUTDOWN_TIMEOUT,
            },
        };

        Ok(Host {
            environment: self.environment,
            lifetime: self.lifetime,
            services: self.services,
            shutdown_timeout,
        })
    }
}

/// Runs hosted services until shutdown.
pub struct Host {
    environment: HostEnvironment,
    lifetime: ApplicationLifetime,
    services: Vec<Box<dyn HostedService>>,
    shutdown_timeout: Duration,
}

impl Host {
    pub fn builder(environment: HostEnvironment, configuration: Configuration) -> HostBuilder {
        HostBuilder::new(environment, configuration)
    }

    pub fn lifetime(&self) -> ApplicationLifetime {
        self.lifetime.clone()
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Runs until a shutdown signal or stop request, and returns the exit
    /// code recorded by the [`ApplicationLifetime`].
    ///
    /// # Errors
    ///
    /// Returns the first start failure after stopping the services that did
    /// start, or [`HostError::Signal`] if signal handlers cannot be
    /// installed. Services are stopped in either case. Stop failures are
    /// logged, not returned.
    pub async fn run(self) -> Result<i32, HostError> {
        self.run_until(shutdown_signal()).await
    }

    /// [`Host::run`] with an explicit shutdown signal.
    async fn run_until<S>(mut self, signal: S) -> Result<i32, HostError>
    where
        S: Future<Output = Result<(), std::io::Error>>,
    {
        let mut started = 0;
        for index in 0..self.services.len() {
            if self.lifetime.is_stopping() {
                break;
            }
            let service = &mut self.services[index];
            if let Err(e) = service.start(self.lifetime.token()).await {
                error!(service = service.name(), error = %e, "service failed to start");
                self.stop_services(started).await;
                return Err(e);
            }
            started += 1;
        }

        info!("Application started. Press Ctrl+C to shut down.");
        info!("Hosting environment: {}", self.environment.name);
        info!("Content root path: {}", self.environment.content_root.display());

        let outcome = tokio::select! {
            signal = signal => match signal {
                Ok(()) => {
                    info!("shutdown signal received");
                    Ok(())
                }
                Err(e) => {
                    error!(error = %e, "failed to listen for shutdown signals");
                    Err(HostError::Signal(e))
                }
            },
            _ = self.lifetime.stopping() => {
                info!(exit_code = self.lifetime.exit_code(), "stop requested");
                Ok(())
            }
        };

        info!("Application is shutting down...");
        self.stop_services(started).await;
        outcome.map(|()| self.lifetime.exit_code())
    }

    /// Stops the first `count` services in reverse order. The token handed
    /// to each service fires once the shutdown timeout elapses.
    async fn stop_services(&mut self, count: usize) {
        let deadline = CancellationToken::new();
        let timer = {
            let deadline = deadline.clone();
            let timeout = self.shutdown_timeout;
            AbortOnDropHandle::new(tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                deadline.cancel();
            }))
        };

        for service in self.services[..count].iter_mut().rev() {
            match service.stop(deadline.clone()).await {
                Ok(()) => info!(service = service.name(), "service stopped"),
                Err(e) => warn!(service = service.name(), error = %e, "service stop failed"),
            }
        }

        drop(timer);
    }
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() -> Result<(), std::io::Error> {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        signal(SignalKind::terminate())?.recv().await;
        Ok::<(), std::io::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<(), std::io::Error>>();

    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        res = terminate => res,
    }
}
