use std::time::Duration;

use crate::pool::logger::Logger;

/// The job-execution body that runs inside a forked child. Dequeue semantics
/// live entirely behind this seam; the manager only forks, runs `work`, and
/// reaps the exit status.
pub trait Worker {
    /// The worker's main loop. `interval` is the delay between empty polls.
    /// Returns once the worker decides to stop; an error is logged in the
    /// child and turned into a non-zero exit status.
    fn work(&mut self, interval: Duration) -> anyhow::Result<()>;
}

/// Builds one [`Worker`] per spawned child.
pub trait WorkerFactory {
    type Worker: Worker;

    /// `queues` preserves the order of the queue-combination key; it is the
    /// worker's poll order. `logger` shares the pool's sink and threshold,
    /// with the `worker` role.
    fn create(&self, queues: Vec<String>, logger: Logger) -> Self::Worker;
}
