//! The unit of work the worker delegates to on every cycle.

use crate::log::Logger;

/// A synchronous unit of work invoked by the worker loop.
///
/// Implementations are shared with the background task and run on the
/// blocking pool, so they must be `Send + Sync`. A panic inside [`Work::run`] is treated as a loop fault and
/// handed to the worker's supervisor.
pub trait Work: Send + Sync {
    /// Performs one unit of work. Called once per cycle.
    fn run(&self);
}

/// Stateless collaborator that logs one informational record per call.
#[derive(Debug, Clone)]
pub struct Helper {
    logger: Logger,
}

impl Helper {
    /// Message emitted by [`Helper::do_work`].
    pub const MESSAGE: &'static str = "Did work!";

    /// Creates a helper that logs through `logger`.
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }

    pub fn do_work(&self) {
        self.logger.info(format_args!("{}", Self::MESSAGE));
    }
}

impl Work for Helper {
    fn run(&self) {
        self.do_work();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::log::{LogLevel, MemorySink};

    #[test]
    fn do_work_emits_exactly_one_info_record() {
        let sink = Arc::new(MemorySink::new());
        let helper = Helper::new(Logger::for_type::<Helper>(sink.clone()));

        helper.do_work();

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, LogLevel::Information);
        assert_eq!(records[0].message, Helper::MESSAGE);
        assert!(records[0].category.ends_with("Helper"));
    }

    #[test]
    fn repeated_calls_through_the_trait_object() {
        let sink = Arc::new(MemorySink::new());
        let work: Arc<dyn Work> = Arc::new(Helper::new(Logger::new(sink.clone(), "helper")));

        for _ in 0..3 {
            work.run();
        }

        assert_eq!(sink.count_message(Helper::MESSAGE), 3);
    }

    #[test]
    fn concurrent_calls_are_safe() {
        let sink = Arc::new(MemorySink::new());
        let helper = Arc::new(Helper::new(Logger::new(sink.clone(), "helper")));

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let helper = Arc::clone(&helper);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        helper.do_work();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(sink.count_message(Helper::MESSAGE), 100);
    }
}
