//! A complete embedding with a trivial worker body: each worker polls
//! nothing, logs its queue list a few times, and exits, so the manager's
//! respawn path is visible without a job backend.
//!
//! Run with a config on disk, e.g.:
//!
//! ```sh
//! printf 'high,low: 2\ndefault: 1\n' > resque-pool.yml
//! cargo run --example idle_pool -- -v
//! ```
//!
//! Then drive it with signals: `kill -HUP <pid>` after editing the file,
//! `kill -QUIT <pid>` for graceful shutdown.

use std::time::Duration;

use resque_pool::{Logger, Worker, WorkerFactory};

struct IdleWorker {
    queues: Vec<String>,
    logger: Logger,
    polls_left: u32,
}

impl Worker for IdleWorker {
    fn work(&mut self, interval: Duration) -> anyhow::Result<()> {
        let queues = self.queues.join(",");
        while self.polls_left > 0 {
            self.logger
                .notice("polling {queues}", &[("queues", queues.clone())]);
            std::thread::sleep(interval);
            self.polls_left -= 1;
        }
        self.logger
            .notice("done polling {queues}", &[("queues", queues)]);
        Ok(())
    }
}

struct IdleFactory;

impl WorkerFactory for IdleFactory {
    type Worker = IdleWorker;

    fn create(&self, queues: Vec<String>, logger: Logger) -> IdleWorker {
        IdleWorker {
            queues,
            logger,
            polls_left: 12,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let code = resque_pool::pool::cli::run(IdleFactory)?;
    std::process::exit(code);
}
