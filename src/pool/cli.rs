use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;

use crate::pool::config::Config;
use crate::pool::logger::Level;
use crate::pool::platform::SystemPlatform;
use crate::pool::supervisor::{Pool, TermBehavior};
use crate::pool::worker::WorkerFactory;

#[derive(Debug, Parser)]
#[command(name = "resque-pool", version, about = "resque-style worker pool manager")]
pub struct Args {
    /// Pool configuration file (default: resque-pool.yml, config/resque-pool.yml)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Environment section to overlay from the configuration file
    #[arg(short = 'E', long = "environment")]
    pub environment: Option<String>,

    /// Application name used in proclines and log lines
    #[arg(short = 'a', long = "appname")]
    pub appname: Option<String>,

    /// Write the manager pid to this file while running
    #[arg(short = 'p', long = "pidfile")]
    pub pidfile: Option<PathBuf>,

    /// Seconds workers wait between empty queue polls
    #[arg(long = "interval")]
    pub interval: Option<f64>,

    /// On TERM, ask workers to finish their current job instead of killing them
    #[arg(long = "term-graceful", conflicts_with = "term_graceful_wait")]
    pub term_graceful: bool,

    /// On TERM, ask workers to finish their current job and wait for them
    #[arg(long = "term-graceful-wait")]
    pub term_graceful_wait: bool,

    /// Gracefully drain all workers on WINCH without exiting the manager
    #[arg(long = "handle-winch")]
    pub handle_winch: bool,

    /// Raise log verbosity (-v: notice, -vv: debug)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse the command line and run a pool built from `factory` until a
/// terminating signal is handled. Returns the process exit code for the
/// embedding `main`.
pub fn run<F: WorkerFactory>(factory: F) -> anyhow::Result<i32> {
    run_with_args(Args::parse(), factory)
}

pub fn run_with_args<F: WorkerFactory>(args: Args, factory: F) -> anyhow::Result<i32> {
    let mut config = Config::from_env();
    if let Some(path) = args.config {
        config.set_config_path(path);
    }
    if let Some(environment) = args.environment {
        config.set_environment(environment);
    }
    if let Some(appname) = args.appname {
        config.app_name = appname;
    }
    if let Some(secs) = args.interval {
        config.set_interval_secs(secs)?;
    }
    match args.verbose {
        0 => {}
        1 => config.log_level = config.log_level.min(Level::Notice),
        _ => config.log_level = Level::Debug,
    }

    let mut pool = Pool::new(SystemPlatform::new(), factory, config);
    if args.term_graceful_wait {
        pool.set_term_behavior(TermBehavior::GracefulShutdownAndWait);
    } else if args.term_graceful {
        pool.set_term_behavior(TermBehavior::GracefulShutdown);
    }
    pool.set_handle_winch(args.handle_winch);

    if let Some(path) = &args.pidfile {
        std::fs::write(path, format!("{}\n", std::process::id()))
            .with_context(|| format!("failed to write pidfile {}", path.display()))?;
    }
    let started = pool.start().map(|_| ());
    let code = match started {
        Ok(()) => Ok(pool.join()),
        Err(err) => Err(err),
    };
    if let Some(path) = &args.pidfile {
        let _ = std::fs::remove_file(path);
    }
    code
}
