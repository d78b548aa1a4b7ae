//! # resque-pool
//!
//! A worker pool manager for resque-style job queues: forks and maintains a
//! configured number of long-running worker processes, each polling an
//! ordered list of queues, and drives their lifecycle through POSIX signals.
//!
//! The manager reconciles the live census against a declarative YAML
//! configuration (`resque-pool.yml`), reaps exited children, and reacts to
//! administrative signals: HUP reloads the configuration and gracefully swaps
//! every worker, WINCH (opt-in) drains the pool without exiting, QUIT/INT/TERM
//! select the shutdown mode, and USR1/USR2/CONT are forwarded to the workers.
//!
//! Job execution itself stays behind the [`Worker`]/[`WorkerFactory`] seams:
//! the embedding program supplies the body that runs inside each forked
//! child.
//!
//! ```no_run
//! use std::time::Duration;
//! use resque_pool::{Logger, Worker, WorkerFactory};
//!
//! struct MyWorker(Vec<String>);
//! impl Worker for MyWorker {
//!     fn work(&mut self, interval: Duration) -> anyhow::Result<()> {
//!         // dequeue and run jobs from self.0, sleeping `interval` when idle
//!         Ok(())
//!     }
//! }
//!
//! struct MyFactory;
//! impl WorkerFactory for MyFactory {
//!     type Worker = MyWorker;
//!     fn create(&self, queues: Vec<String>, _logger: Logger) -> MyWorker {
//!         MyWorker(queues)
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     std::process::exit(resque_pool::pool::cli::run(MyFactory)?)
//! }
//! ```

pub mod pool;

pub use pool::config::Config;
pub use pool::logger::{Level, Logger};
pub use pool::platform::{ExitStatus, Platform, SystemPlatform};
pub use pool::supervisor::{Pool, TermBehavior};
pub use pool::worker::{Worker, WorkerFactory};
