//! `loghost`: runs the leveled-logging worker until Ctrl+C or SIGTERM.
//!
//! Startup order: hosting environment, configuration, configuration dump,
//! console logging, then the services themselves.

use std::process::ExitCode;
use std::sync::Arc;

use loghost::config::{self, HostEnvironment};
use loghost::host::Host;
use loghost::log::{self as logging, LogLevel, LogSink, Logger, TracingSink};
use loghost::worker::{FaultPolicy, Helper, Supervisor, Worker};

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error + Send + Sync>> {
    let environment = HostEnvironment::from_process()?;
    let configuration = config::load(&environment, std::env::args().skip(1))?;

    let current_dir = std::env::current_dir()?;
    print!("{}", configuration.dump(&environment, &current_dir));

    let min_level = configuration
        .get_parsed::<LogLevel>("Logging:LogLevel:Default")?
        .unwrap_or(LogLevel::Trace);
    logging::init_console(min_level)?;

    let sink: Arc<dyn LogSink> = Arc::new(TracingSink::new());
    let policy = FaultPolicy::from_configuration(&configuration)?;
    let builder = Host::builder(environment, configuration);

    let helper = Helper::new(Logger::for_type::<Helper>(Arc::clone(&sink)));
    let supervisor = Supervisor::new(policy, builder.lifetime());
    let worker = Worker::new(Arc::new(helper), Logger::for_type::<Worker>(sink), supervisor);

    let code = builder.add_service(worker).build()?.run().await?;
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}
