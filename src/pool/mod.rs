pub mod cli;
pub mod config;
pub mod logger;
pub mod platform;
pub mod supervisor;
pub mod worker;

/// Run a manager for `factory` with the command-line surface. The returned
/// code is what the embedding `main` should exit with.
pub fn main<F: worker::WorkerFactory>(factory: F) -> anyhow::Result<i32> {
    cli::run(factory)
}
