use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;

use anyhow::Context as _;
use nix::sys::signal::Signal;
use nix::unistd::{ForkResult, Pid};

use crate::pool::config::Config;
use crate::pool::logger::Logger;
use crate::pool::platform::{Platform, SUPERVISED_SIGNALS};
use crate::pool::worker::{Worker, WorkerFactory};

/// Workers interpret QUIT as "finish the current job, then exit".
const GRACEFUL_QUIT: Signal = Signal::SIGQUIT;

/// What the manager does when it receives TERM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TermBehavior {
    /// Forward TERM to every child and return immediately.
    #[default]
    Immediate,
    /// Ask children to finish their current job; return without waiting.
    GracefulShutdown,
    /// Ask children to finish their current job and block-reap them all.
    GracefulShutdownAndWait,
}

impl TermBehavior {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "graceful_worker_shutdown_and_wait" => Ok(TermBehavior::GracefulShutdownAndWait),
            "graceful_worker_shutdown" => Ok(TermBehavior::GracefulShutdown),
            "" => Ok(TermBehavior::Immediate),
            other => anyhow::bail!("unknown term behavior {other:?}"),
        }
    }
}

type AfterPrefork<P, F> = Box<dyn Fn(&Pool<P, F>, &mut <F as WorkerFactory>::Worker)>;

/// The pool manager: keeps the census of live children converged on the
/// configured desired counts and translates signals into lifecycle actions.
///
/// Single-threaded by construction. The only asynchronous activity is the
/// kernel-delivered signal handler, which appends to the platform's signal
/// queue; everything else happens inside `join`'s loop:
/// reap, drain one signal, reconcile, sleep.
pub struct Pool<P: Platform, F: WorkerFactory> {
    platform: P,
    factory: F,
    config: Config,
    logger: Logger,
    /// Live children per queue-combination key, in spawn order. Pids enter on
    /// fork success and leave on reap; each pid lives under exactly one key.
    workers: BTreeMap<String, Vec<Pid>>,
    /// Children gracefully replaced by a config reload: still alive, still
    /// signalled and reaped, but no longer counted by reconciliation.
    draining: Vec<(Pid, String)>,
    term_behavior: TermBehavior,
    handle_winch: bool,
    after_prefork: Option<AfterPrefork<P, F>>,
    quit_on_exit: bool,
}

impl<P: Platform, F: WorkerFactory> Pool<P, F> {
    pub fn new(platform: P, factory: F, config: Config) -> Self {
        let logger = Logger::to_stdout(config.log_level, &config.app_name).for_role("manager");
        Pool {
            platform,
            factory,
            config,
            logger,
            workers: BTreeMap::new(),
            draining: Vec::new(),
            term_behavior: TermBehavior::default(),
            handle_winch: false,
            after_prefork: None,
            quit_on_exit: false,
        }
    }

    pub fn set_logger(&mut self, logger: Logger) {
        self.logger = logger.for_role("manager");
    }

    pub fn set_term_behavior(&mut self, behavior: TermBehavior) {
        self.term_behavior = behavior;
    }

    pub fn set_handle_winch(&mut self, on: bool) {
        self.handle_winch = on;
    }

    /// Callback run in the child after fork, before the worker's main loop.
    /// It runs in the child's address space: nothing it mutates propagates
    /// back to the manager.
    pub fn set_after_prefork(
        &mut self,
        hook: impl Fn(&Pool<P, F>, &mut <F as WorkerFactory>::Worker) + 'static,
    ) {
        self.after_prefork = Some(Box::new(hook));
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load configuration, trap the supervised signal set, and spawn the
    /// initial census.
    pub fn start(&mut self) -> anyhow::Result<&mut Self> {
        self.procline("(starting)");
        self.config
            .load(&self.logger)
            .context("failed to load pool configuration")?;
        self.platform.trap_signals(&SUPERVISED_SIGNALS)?;
        self.maintain_worker_count();
        self.procline("(started)");
        self.logger.info("started manager", &[]);
        self.report_worker_pool_pids();
        Ok(self)
    }

    /// Run the supervisor loop until a terminating signal is handled.
    /// Returns the process exit code: the conventional died-by-QUIT code
    /// when graceful shutdown was requested with QUIT, otherwise 0.
    pub fn join(&mut self) -> i32 {
        loop {
            self.reap_all_workers(false);
            if let Some(sig) = self.platform.next_signal() {
                if self.handle_signal(sig).is_break() {
                    break;
                }
            }
            if self.platform.pending_signals() == 0 {
                self.maintain_worker_count();
                self.platform.sleep(self.config.interval);
            }
            self.procline(&format!("managing {}", format_pids(&self.all_pids())));
        }
        self.procline("(shutting down)");
        self.logger.info("manager finished", &[]);
        if self.quit_on_exit {
            128 + GRACEFUL_QUIT as i32
        } else {
            0
        }
    }

    fn handle_signal(&mut self, sig: Signal) -> ControlFlow<()> {
        match sig {
            Signal::SIGQUIT => {
                self.graceful_shutdown_and_wait("QUIT");
                self.quit_on_exit = true;
                ControlFlow::Break(())
            }
            Signal::SIGINT => {
                self.graceful_shutdown("INT");
                ControlFlow::Break(())
            }
            Signal::SIGTERM => match self.term_behavior {
                TermBehavior::GracefulShutdownAndWait => {
                    self.graceful_shutdown_and_wait("TERM");
                    ControlFlow::Break(())
                }
                TermBehavior::GracefulShutdown => {
                    self.graceful_shutdown("TERM");
                    ControlFlow::Break(())
                }
                TermBehavior::Immediate => {
                    self.logger.info("TERM: immediate shutdown", &[]);
                    self.signal_all_workers(Signal::SIGTERM);
                    ControlFlow::Break(())
                }
            },
            Signal::SIGHUP => {
                self.reload_config();
                ControlFlow::Continue(())
            }
            Signal::SIGWINCH => {
                if self.handle_winch {
                    self.logger
                        .info("WINCH: gracefully stopping all workers", &[]);
                    self.config.reset_queues();
                    self.maintain_worker_count();
                }
                ControlFlow::Continue(())
            }
            Signal::SIGUSR1 | Signal::SIGUSR2 | Signal::SIGCONT => {
                self.logger.info(
                    "{sig}: sending to all workers",
                    &[("sig", sig.as_str().to_string())],
                );
                self.signal_all_workers(sig);
                ControlFlow::Continue(())
            }
            // SIGCHLD is trapped only to interrupt sleep; reaping happens at
            // the top of every iteration.
            _ => ControlFlow::Continue(()),
        }
    }

    fn graceful_shutdown_and_wait(&mut self, name: &str) {
        self.logger.info(
            "{sig}: graceful shutdown, waiting for children",
            &[("sig", name.to_string())],
        );
        self.signal_all_workers(GRACEFUL_QUIT);
        self.reap_all_workers(true);
    }

    fn graceful_shutdown(&mut self, name: &str) {
        self.logger.info(
            "{sig}: immediate shutdown (graceful worker shutdown)",
            &[("sig", name.to_string())],
        );
        self.signal_all_workers(GRACEFUL_QUIT);
    }

    /// Deliver `sig` to every live child, draining children included.
    fn signal_all_workers(&self, sig: Signal) {
        self.platform.signal_pids(&self.all_pids(), sig);
    }

    /// Re-read the configuration and gracefully swap the whole pool. On a
    /// parse failure the previous configuration stays in effect and the
    /// workers are left alone.
    fn reload_config(&mut self) {
        self.logger.info("HUP: reload config file", &[]);
        match self.config.reload(&self.logger) {
            Ok(()) => {
                self.logger
                    .info("HUP: gracefully restarting all workers", &[]);
                self.drain_all_workers();
                self.maintain_worker_count();
            }
            Err(err) => self.logger.error(
                "HUP: reload failed, keeping previous configuration: {error}",
                &[("error", format!("{err:#}"))],
            ),
        }
    }

    /// Move every live child to the draining list and ask it to finish up.
    /// Reconciliation then sees empty live sets and spawns a fresh census.
    fn drain_all_workers(&mut self) {
        let mut pids = Vec::new();
        for (key, key_pids) in std::mem::take(&mut self.workers) {
            for pid in key_pids {
                pids.push(pid);
                self.draining.push((pid, key.clone()));
            }
        }
        self.platform.signal_pids(&pids, GRACEFUL_QUIT);
    }

    /// Reconciliation: for every key either configured or occupied, fork up
    /// to the desired count or ask the oldest surplus children to quit.
    pub fn maintain_worker_count(&mut self) {
        for key in self.all_known_queues() {
            let desired = self.config.worker_count(&key) as i64;
            let live = self.workers.get(&key).map_or(0, Vec::len) as i64;
            let delta = desired - live;
            if delta > 0 {
                for _ in 0..delta {
                    self.spawn_worker(&key);
                }
            } else if delta < 0 {
                let doomed: Vec<Pid> = self
                    .workers
                    .get(&key)
                    .map_or_else(Vec::new, |pids| {
                        pids.iter().take(-delta as usize).copied().collect()
                    });
                self.platform.signal_pids(&doomed, GRACEFUL_QUIT);
            }
        }
    }

    fn spawn_worker(&mut self, key: &str) {
        match self.platform.fork() {
            Ok(ForkResult::Parent { child }) => {
                self.workers
                    .entry(key.to_string())
                    .or_default()
                    .push(child);
                self.logger.debug(
                    "spawned worker [{pid}] for queues {queues}",
                    &[("pid", child.to_string()), ("queues", key.to_string())],
                );
            }
            Ok(ForkResult::Child) => self.run_worker(key),
            Err(err) => {
                self.logger.error(
                    "fork failed: {error}",
                    &[("error", err.to_string())],
                );
                self.platform.exit(1);
            }
        }
    }

    /// Child side of the spawn protocol. Never returns into the loop.
    fn run_worker(&self, key: &str) -> ! {
        self.platform.release_signals();
        let queues: Vec<String> = key.split(',').map(str::to_string).collect();
        let worker_logger = self.logger.for_role("worker");
        let mut worker = self.factory.create(queues, worker_logger.clone());
        self.platform.procline(&format!(
            "resque-pool-worker[{}]: {}",
            self.config.app_name, key
        ));
        if let Some(hook) = &self.after_prefork {
            hook(self, &mut worker);
        }
        match worker.work(self.config.interval) {
            Ok(()) => self.platform.exit(0),
            Err(err) => {
                worker_logger.error(
                    "worker for queues {queues} failed: {error}",
                    &[("queues", key.to_string()), ("error", format!("{err:#}"))],
                );
                self.platform.exit(1)
            }
        }
    }

    /// Remove exited children from the census. The blocking form runs until
    /// every tracked child has been reaped.
    pub fn reap_all_workers(&mut self, wait: bool) {
        loop {
            if wait && self.all_pids().is_empty() {
                return;
            }
            let Some((pid, status)) = self.platform.next_dead_child(wait) else {
                return;
            };
            let queues = self.remove_pid(pid).unwrap_or_else(|| "?".to_string());
            self.logger.info(
                "Reaped resque-pool worker [{pid}] (status: {status}) queues: {queues}",
                &[
                    ("pid", pid.to_string()),
                    ("status", status.to_string()),
                    ("queues", queues),
                ],
            );
        }
    }

    fn remove_pid(&mut self, pid: Pid) -> Option<String> {
        let mut found = None;
        for (key, pids) in &mut self.workers {
            if let Some(i) = pids.iter().position(|p| *p == pid) {
                pids.remove(i);
                found = Some(key.clone());
                break;
            }
        }
        if let Some(key) = found {
            if self.workers.get(&key).is_some_and(Vec::is_empty) {
                self.workers.remove(&key);
            }
            return Some(key);
        }
        if let Some(i) = self.draining.iter().position(|(p, _)| *p == pid) {
            return Some(self.draining.remove(i).1);
        }
        None
    }

    /// Every live child, census first, then draining children.
    pub fn all_pids(&self) -> Vec<Pid> {
        let mut pids: Vec<Pid> = self.workers.values().flatten().copied().collect();
        pids.extend(self.draining.iter().map(|(pid, _)| *pid));
        pids
    }

    /// The key a live child belongs to.
    pub fn worker_queues(&self, pid: Pid) -> Option<&str> {
        for (key, pids) in &self.workers {
            if pids.contains(&pid) {
                return Some(key);
            }
        }
        self.draining
            .iter()
            .find(|(p, _)| *p == pid)
            .map(|(_, key)| key.as_str())
    }

    /// Union of configured keys and occupied census keys, so that keys
    /// removed from the configuration still reconcile down to zero.
    pub fn all_known_queues(&self) -> Vec<String> {
        let mut keys: BTreeSet<String> = self.config.known_queues().map(str::to_string).collect();
        keys.extend(self.workers.keys().cloned());
        keys.into_iter().collect()
    }

    pub fn report_worker_pool_pids(&self) {
        let pids = self.all_pids();
        if pids.is_empty() {
            self.logger.info("Pool is empty", &[]);
        } else {
            self.logger.info(
                "Pool contains worker PIDs: {pids}",
                &[("pids", format_pids(&pids))],
            );
        }
    }

    fn procline(&self, state: &str) {
        self.platform.procline(&format!(
            "resque-pool-manager[{}]: {}",
            self.config.app_name, state
        ));
    }
}

fn format_pids(pids: &[Pid]) -> String {
    let joined = pids
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{joined}]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::logger::Level;
    use crate::pool::platform::ExitStatus;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::time::Duration;

    struct FakePlatform {
        next_pid: Cell<i32>,
        forks: Cell<usize>,
        kills: RefCell<Vec<(Pid, Signal)>>,
        dead: RefCell<VecDeque<(Pid, ExitStatus)>>,
        signals: RefCell<VecDeque<Signal>>,
        sleeps: Cell<usize>,
    }

    impl FakePlatform {
        fn new() -> Self {
            FakePlatform {
                next_pid: Cell::new(100),
                forks: Cell::new(0),
                kills: RefCell::new(Vec::new()),
                dead: RefCell::new(VecDeque::new()),
                signals: RefCell::new(VecDeque::new()),
                sleeps: Cell::new(0),
            }
        }

        fn push_dead(&self, pid: i32, code: i32) {
            self.dead
                .borrow_mut()
                .push_back((Pid::from_raw(pid), ExitStatus::Code(code)));
        }

        fn push_signal(&self, sig: Signal) {
            self.signals.borrow_mut().push_back(sig);
        }

        fn kills_of(&self, sig: Signal) -> Vec<i32> {
            self.kills
                .borrow()
                .iter()
                .filter(|(_, s)| *s == sig)
                .map(|(p, _)| p.as_raw())
                .collect()
        }
    }

    impl Platform for FakePlatform {
        fn trap_signals(&self, _set: &[Signal]) -> anyhow::Result<()> {
            Ok(())
        }
        fn next_signal(&self) -> Option<Signal> {
            self.signals.borrow_mut().pop_front()
        }
        fn pending_signals(&self) -> usize {
            self.signals.borrow().len()
        }
        fn sleep(&self, _duration: Duration) {
            self.sleeps.set(self.sleeps.get() + 1);
        }
        fn fork(&self) -> nix::Result<ForkResult> {
            let pid = self.next_pid.get();
            self.next_pid.set(pid + 1);
            self.forks.set(self.forks.get() + 1);
            Ok(ForkResult::Parent {
                child: Pid::from_raw(pid),
            })
        }
        fn signal_pids(&self, pids: &[Pid], sig: Signal) {
            for pid in pids {
                self.kills.borrow_mut().push((*pid, sig));
            }
        }
        fn next_dead_child(&self, _wait: bool) -> Option<(Pid, ExitStatus)> {
            self.dead.borrow_mut().pop_front()
        }
        fn release_signals(&self) {}
        fn procline(&self, _title: &str) {}
        fn exit(&self, code: i32) -> ! {
            panic!("process exit({code})")
        }
    }

    struct NullWorker;
    impl Worker for NullWorker {
        fn work(&mut self, _interval: Duration) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct NullFactory;
    impl WorkerFactory for NullFactory {
        type Worker = NullWorker;
        fn create(&self, _queues: Vec<String>, _logger: Logger) -> NullWorker {
            NullWorker
        }
    }

    fn quiet_logger() -> Logger {
        Logger::new(Level::Emergency, "test", Box::new(std::io::sink()))
    }

    fn pool_of(queues: &[(&str, usize)]) -> Pool<FakePlatform, NullFactory> {
        let map = queues
            .iter()
            .map(|(k, n)| (k.to_string(), *n))
            .collect();
        let mut pool = Pool::new(FakePlatform::new(), NullFactory, Config::from_queues(map));
        pool.set_logger(quiet_logger());
        pool
    }

    fn census(pool: &Pool<FakePlatform, NullFactory>, key: &str) -> Vec<i32> {
        pool.workers
            .get(key)
            .map_or_else(Vec::new, |pids| pids.iter().map(|p| p.as_raw()).collect())
    }

    #[test]
    fn spawns_to_target() {
        let mut pool = pool_of(&[("foo", 3)]);
        pool.start().unwrap();
        assert_eq!(pool.platform.forks.get(), 3);
        assert_eq!(census(&pool, "foo"), vec![100, 101, 102]);
    }

    #[test]
    fn downsize_quits_oldest_first_and_census_shrinks_on_reap() {
        let mut pool = pool_of(&[("foo", 1)]);
        pool.workers.insert(
            "foo".to_string(),
            vec![Pid::from_raw(11), Pid::from_raw(12), Pid::from_raw(13)],
        );
        pool.config.load(&quiet_logger()).unwrap();
        pool.maintain_worker_count();

        assert_eq!(pool.platform.kills_of(GRACEFUL_QUIT), vec![11, 12]);
        // Doomed children stay in the census until they are actually reaped.
        assert_eq!(census(&pool, "foo"), vec![11, 12, 13]);

        pool.platform.push_dead(11, 0);
        pool.platform.push_dead(12, 0);
        pool.reap_all_workers(false);
        assert_eq!(census(&pool, "foo"), vec![13]);
    }

    #[test]
    fn exited_worker_is_respawned_on_next_reconciliation() {
        let mut pool = pool_of(&[("foo", 1)]);
        pool.start().unwrap();
        assert_eq!(census(&pool, "foo"), vec![100]);

        pool.platform.push_dead(100, 0);
        pool.reap_all_workers(false);
        assert_eq!(census(&pool, "foo"), Vec::<i32>::new());

        pool.maintain_worker_count();
        assert_eq!(census(&pool, "foo"), vec![101]);
    }

    #[test]
    fn hangup_swaps_the_pool_against_the_new_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resque-pool.yml");
        std::fs::write(&path, "foo: 2\n").unwrap();

        let mut config = Config::default();
        config.set_config_path(&path);
        let mut pool = Pool::new(FakePlatform::new(), NullFactory, config);
        pool.set_logger(quiet_logger());
        pool.start().unwrap();
        assert_eq!(census(&pool, "foo"), vec![100, 101]);

        std::fs::write(&path, "foo: 2\nbar: 1\n").unwrap();
        pool.handle_signal(Signal::SIGHUP);

        // Old children are asked to finish and move to the draining list;
        // the fresh census spawns immediately with the new configuration.
        assert_eq!(pool.platform.kills_of(GRACEFUL_QUIT), vec![100, 101]);
        assert_eq!(census(&pool, "bar"), vec![102]);
        assert_eq!(census(&pool, "foo"), vec![103, 104]);
        assert_eq!(pool.worker_queues(Pid::from_raw(100)), Some("foo"));
        assert_eq!(pool.all_pids().len(), 5);

        pool.platform.push_dead(100, 0);
        pool.platform.push_dead(101, 0);
        pool.reap_all_workers(false);
        assert_eq!(pool.all_pids().len(), 3);
        assert_eq!(pool.worker_queues(Pid::from_raw(100)), None);
    }

    #[test]
    fn hangup_keeps_previous_config_when_reload_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resque-pool.yml");
        std::fs::write(&path, "foo: 2\n").unwrap();

        let mut config = Config::default();
        config.set_config_path(&path);
        let mut pool = Pool::new(FakePlatform::new(), NullFactory, config);
        pool.set_logger(quiet_logger());
        pool.start().unwrap();

        std::fs::write(&path, "foo: [unclosed\n").unwrap();
        pool.handle_signal(Signal::SIGHUP);

        // No drain, no respawn; the running pool is untouched.
        assert!(pool.platform.kills_of(GRACEFUL_QUIT).is_empty());
        assert_eq!(census(&pool, "foo"), vec![100, 101]);
        assert_eq!(pool.config.worker_count("foo"), 2);
    }

    #[test]
    fn winch_drains_all_workers_when_enabled() {
        let mut pool = pool_of(&[("foo", 2)]);
        pool.set_handle_winch(true);
        pool.start().unwrap();

        assert!(pool.handle_signal(Signal::SIGWINCH).is_continue());
        assert_eq!(pool.platform.kills_of(GRACEFUL_QUIT), vec![100, 101]);
        assert_eq!(census(&pool, "foo"), vec![100, 101]);

        pool.platform.push_dead(100, 0);
        pool.platform.push_dead(101, 0);
        pool.reap_all_workers(false);
        assert!(pool.all_pids().is_empty());
    }

    #[test]
    fn winch_is_ignored_by_default() {
        let mut pool = pool_of(&[("foo", 2)]);
        pool.start().unwrap();
        assert!(pool.handle_signal(Signal::SIGWINCH).is_continue());
        assert!(pool.platform.kills_of(GRACEFUL_QUIT).is_empty());
        assert_eq!(census(&pool, "foo"), vec![100, 101]);
    }

    #[test]
    fn term_graceful_and_wait_blocks_until_children_are_reaped() {
        let mut pool = pool_of(&[("foo", 2)]);
        pool.set_term_behavior(TermBehavior::GracefulShutdownAndWait);
        pool.start().unwrap();
        pool.platform.push_dead(100, 0);
        pool.platform.push_dead(101, 0);

        assert!(pool.handle_signal(Signal::SIGTERM).is_break());
        assert_eq!(pool.platform.kills_of(GRACEFUL_QUIT), vec![100, 101]);
        assert!(pool.all_pids().is_empty());
    }

    #[test]
    fn term_default_forwards_term_immediately() {
        let mut pool = pool_of(&[("foo", 2)]);
        pool.start().unwrap();
        assert!(pool.handle_signal(Signal::SIGTERM).is_break());
        assert_eq!(pool.platform.kills_of(Signal::SIGTERM), vec![100, 101]);
        // No wait: the census is left for the caller's exit.
        assert_eq!(census(&pool, "foo"), vec![100, 101]);
    }

    #[test]
    fn user_signals_are_forwarded_to_all_children() {
        let mut pool = pool_of(&[("foo", 1), ("bar", 1)]);
        pool.start().unwrap();
        for sig in [Signal::SIGUSR1, Signal::SIGUSR2, Signal::SIGCONT] {
            assert!(pool.handle_signal(sig).is_continue());
            assert_eq!(pool.platform.kills_of(sig).len(), 2);
        }
    }

    #[test]
    fn join_exits_zero_on_interrupt() {
        let mut pool = pool_of(&[("foo", 1)]);
        pool.start().unwrap();
        pool.platform.push_signal(Signal::SIGINT);
        assert_eq!(pool.join(), 0);
        assert_eq!(pool.platform.kills_of(GRACEFUL_QUIT), vec![100]);
    }

    #[test]
    fn join_exits_with_quit_code_on_quit() {
        let mut pool = pool_of(&[("foo", 1)]);
        pool.start().unwrap();
        pool.platform.push_dead(100, 0);
        pool.platform.push_signal(Signal::SIGQUIT);
        assert_eq!(pool.join(), 128 + Signal::SIGQUIT as i32);
        assert!(pool.all_pids().is_empty());
    }

    #[test]
    fn pending_signals_defer_reconciliation_and_sleep() {
        let mut pool = pool_of(&[("foo", 1)]);
        pool.start().unwrap();
        // Two queued signals: the first iteration must not sleep because a
        // signal is still pending after handling one.
        pool.platform.push_signal(Signal::SIGUSR1);
        pool.platform.push_signal(Signal::SIGQUIT);
        pool.platform.push_dead(100, 0);
        pool.join();
        assert_eq!(pool.platform.sleeps.get(), 0);
    }

    #[test]
    fn removed_keys_still_reconcile_to_zero() {
        let mut pool = pool_of(&[]);
        pool.workers
            .insert("gone".to_string(), vec![Pid::from_raw(21)]);
        pool.config.load(&quiet_logger()).unwrap();

        assert_eq!(pool.all_known_queues(), vec!["gone".to_string()]);
        pool.maintain_worker_count();
        assert_eq!(pool.platform.kills_of(GRACEFUL_QUIT), vec![21]);
    }

    #[test]
    fn census_queries() {
        let mut pool = pool_of(&[("foo", 2), ("bar", 1)]);
        pool.start().unwrap();
        assert_eq!(pool.all_pids().len(), 3);
        let bar_pid = pool.workers["bar"][0];
        assert_eq!(pool.worker_queues(bar_pid), Some("bar"));
        assert_eq!(pool.worker_queues(Pid::from_raw(9999)), None);
        assert_eq!(
            pool.all_known_queues(),
            vec!["bar".to_string(), "foo".to_string()]
        );
    }

    #[test]
    fn term_behavior_parsing() {
        assert_eq!(
            TermBehavior::parse("graceful_worker_shutdown_and_wait").unwrap(),
            TermBehavior::GracefulShutdownAndWait
        );
        assert_eq!(
            TermBehavior::parse("graceful_worker_shutdown").unwrap(),
            TermBehavior::GracefulShutdown
        );
        assert_eq!(TermBehavior::parse("").unwrap(), TermBehavior::Immediate);
        assert!(TermBehavior::parse("nope").is_err());
    }
}
