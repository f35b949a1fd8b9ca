//! End-to-end: a host running the worker until a stop request or a fault.

use std::sync::Arc;
use std::time::Duration;

use loghost::config::{Configuration, HostEnvironment};
use loghost::host::Host;
use loghost::log::{LogLevel, Logger, MemorySink};
use loghost::worker::{FaultPolicy, Helper, LEVEL_MESSAGES, Supervisor, Work, Worker};

fn level_records(sink: &MemorySink) -> usize {
    LEVEL_MESSAGES
        .iter()
        .map(|(_, message)| sink.count_message(message))
        .sum()
}

struct Exploding;

impl Work for Exploding {
    fn run(&self) {
        panic!("helper exploded");
    }
}

#[tokio::test(start_paused = true)]
async fn worker_runs_until_stop_requested() {
    let sink = Arc::new(MemorySink::new());
    let builder = Host::builder(HostEnvironment::new("Testing", "."), Configuration::new());
    let lifetime = builder.lifetime();

    let helper = Helper::new(Logger::for_type::<Helper>(sink.clone()));
    let supervisor = Supervisor::new(FaultPolicy::default(), builder.lifetime());
    let worker = Worker::new(
        Arc::new(helper),
        Logger::for_type::<Worker>(sink.clone()),
        supervisor,
    );
    let host = builder.add_service(worker).build().unwrap();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(25)).await;
        lifetime.stop_application(0);
    });

    let code = host.run().await.unwrap();

    assert_eq!(code, 0);
    assert_eq!(level_records(&sink), 12);
    assert_eq!(sink.count_message(Helper::MESSAGE), 1);
    assert_eq!(sink.count_message("stopped"), 1);

    let helper_record = sink
        .records()
        .into_iter()
        .find(|r| r.message == Helper::MESSAGE)
        .unwrap();
    assert!(helper_record.category.ends_with("Helper"));
    assert_eq!(helper_record.level, LogLevel::Information);
}

#[tokio::test(start_paused = true)]
async fn faulting_worker_exits_with_configured_code() {
    let mut configuration = Configuration::new();
    configuration.set("Worker:FaultPolicy", "exit");
    configuration.set("Worker:ExitCode", "42");

    let sink = Arc::new(MemorySink::new());
    let policy = FaultPolicy::from_configuration(&configuration).unwrap();
    let builder = Host::builder(HostEnvironment::new("Testing", "."), configuration);
    let supervisor = Supervisor::new(policy, builder.lifetime());
    let worker = Worker::new(
        Arc::new(Exploding),
        Logger::for_type::<Worker>(sink.clone()),
        supervisor,
    );

    let code = builder.add_service(worker).build().unwrap().run().await.unwrap();

    assert_eq!(code, 42);
    let critical: Vec<_> = sink
        .records()
        .into_iter()
        .filter(|r| r.level == LogLevel::Critical && r.message.contains("helper exploded"))
        .collect();
    assert_eq!(critical.len(), 1);
}
