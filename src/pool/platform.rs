use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Context as _;
use nix::errno::Errno;
use nix::sys::signal::{kill, sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{ForkResult, Pid};

/// The full set the manager traps. SIGCHLD is included only so that a child
/// exit interrupts `sleep`; its queue entries are discarded by the consumer.
pub const SUPERVISED_SIGNALS: [Signal; 9] = [
    Signal::SIGQUIT,
    Signal::SIGINT,
    Signal::SIGTERM,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
    Signal::SIGCONT,
    Signal::SIGHUP,
    Signal::SIGWINCH,
    Signal::SIGCHLD,
];

/// Terminal status of a reaped child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Code(i32),
    Signaled(Signal),
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Code(code) => write!(f, "exit {code}"),
            ExitStatus::Signaled(sig) => write!(f, "killed by {}", sig.as_str()),
        }
    }
}

/// Everything the supervisor asks of the kernel. One implementation talks to
/// the real host (`SystemPlatform`); tests substitute a recording double so
/// reconciliation scenarios run without forking.
pub trait Platform {
    /// Install the async signal trap for `set`. Handlers only append to the
    /// process-global signal queue.
    fn trap_signals(&self, set: &[Signal]) -> anyhow::Result<()>;

    /// Pop the oldest buffered signal, if any.
    fn next_signal(&self) -> Option<Signal>;

    /// Number of buffered signals not yet popped.
    fn pending_signals(&self) -> usize;

    /// Suspend for up to `duration`; returns early when a signal arrives.
    fn sleep(&self, duration: Duration);

    fn fork(&self) -> nix::Result<ForkResult>;

    /// Deliver `sig` to each pid. Missing pids are ignored; losing the race
    /// against reaping is expected.
    fn signal_pids(&self, pids: &[Pid], sig: Signal);

    /// Non-blocking (`wait == false`): the next exited child since the last
    /// call, or `None`. Blocking: wait for the next child to exit, `None`
    /// once there are no children left.
    fn next_dead_child(&self, wait: bool) -> Option<(Pid, ExitStatus)>;

    /// Restore default dispositions for the trapped set and drop anything
    /// still buffered. Called in the child immediately after fork.
    fn release_signals(&self);

    /// Best-effort process-title update; silently absent on hosts without
    /// support.
    fn procline(&self, title: &str);

    /// Terminate without unwinding. Used on child-side paths so a forked
    /// child never returns into the supervisor loop, and on fork failure.
    fn exit(&self, code: i32) -> !;
}

// Signal hand-off between the kernel-invoked handler and the supervisor loop:
// a fixed-size ring of atomics, handler as the only producer, main loop as
// the only consumer. Handlers are installed with the whole trapped set in
// sa_mask, so enqueues never interleave.
const SIG_RING_LEN: usize = 64;
static SIG_RING: [AtomicI32; SIG_RING_LEN] = [const { AtomicI32::new(0) }; SIG_RING_LEN];
static SIG_HEAD: AtomicUsize = AtomicUsize::new(0);
static SIG_TAIL: AtomicUsize = AtomicUsize::new(0);

extern "C" fn buffer_signal(signum: libc::c_int) {
    let head = SIG_HEAD.load(Ordering::Acquire);
    let tail = SIG_TAIL.load(Ordering::Relaxed);
    if tail.wrapping_sub(head) >= SIG_RING_LEN {
        // Ring full: drop. Every handler is idempotent on repeat delivery
        // within one loop tick, so a dropped duplicate changes nothing.
        return;
    }
    SIG_RING[tail % SIG_RING_LEN].store(signum, Ordering::Relaxed);
    SIG_TAIL.store(tail.wrapping_add(1), Ordering::Release);
}

/// The host-OS platform. The signal queue and installed handlers are
/// process-global (the kernel allows one handler per signal), so construct
/// exactly one per process.
pub struct SystemPlatform {
    trapped: RefCell<Vec<Signal>>,
}

impl SystemPlatform {
    pub fn new() -> Self {
        SystemPlatform {
            trapped: RefCell::new(Vec::new()),
        }
    }
}

impl Default for SystemPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for SystemPlatform {
    fn trap_signals(&self, set: &[Signal]) -> anyhow::Result<()> {
        let mut mask = SigSet::empty();
        for sig in set {
            mask.add(*sig);
        }
        let action = SigAction::new(SigHandler::Handler(buffer_signal), SaFlags::empty(), mask);
        for sig in set {
            // SAFETY: buffer_signal touches only process-global atomics.
            unsafe { sigaction(*sig, &action) }
                .with_context(|| format!("failed to trap {}", sig.as_str()))?;
        }
        *self.trapped.borrow_mut() = set.to_vec();
        Ok(())
    }

    fn next_signal(&self) -> Option<Signal> {
        loop {
            let head = SIG_HEAD.load(Ordering::Relaxed);
            let tail = SIG_TAIL.load(Ordering::Acquire);
            if head == tail {
                return None;
            }
            let signum = SIG_RING[head % SIG_RING_LEN].load(Ordering::Relaxed);
            SIG_HEAD.store(head.wrapping_add(1), Ordering::Release);
            if let Ok(sig) = Signal::try_from(signum) {
                return Some(sig);
            }
        }
    }

    fn pending_signals(&self) -> usize {
        SIG_TAIL
            .load(Ordering::Acquire)
            .wrapping_sub(SIG_HEAD.load(Ordering::Relaxed))
    }

    fn sleep(&self, duration: Duration) {
        let ts = libc::timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };
        // EINTR is the point: a trapped signal wakes the loop early.
        unsafe { libc::nanosleep(&ts, std::ptr::null_mut()) };
    }

    fn fork(&self) -> nix::Result<ForkResult> {
        // SAFETY: the supervisor is single-threaded, so the child may keep
        // running ordinary Rust after fork.
        unsafe { nix::unistd::fork() }
    }

    fn signal_pids(&self, pids: &[Pid], sig: Signal) {
        for pid in pids {
            // ESRCH here is a child that exited between census and kill.
            let _ = kill(*pid, sig);
        }
    }

    fn next_dead_child(&self, wait: bool) -> Option<(Pid, ExitStatus)> {
        let options = if wait {
            None
        } else {
            Some(WaitPidFlag::WNOHANG)
        };
        loop {
            match waitpid(None::<Pid>, options) {
                Ok(WaitStatus::Exited(pid, code)) => return Some((pid, ExitStatus::Code(code))),
                Ok(WaitStatus::Signaled(pid, sig, _)) => {
                    return Some((pid, ExitStatus::Signaled(sig)))
                }
                Ok(WaitStatus::StillAlive) => return None,
                // Stopped/continued children are not exits.
                Ok(_) => continue,
                Err(Errno::EINTR) => continue,
                // ECHILD: nothing left to reap.
                Err(_) => return None,
            }
        }
    }

    fn release_signals(&self) {
        let action = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
        for sig in self.trapped.borrow().iter() {
            // SAFETY: restores the default disposition.
            let _ = unsafe { sigaction(*sig, &action) };
        }
        self.trapped.borrow_mut().clear();
        SIG_HEAD.store(SIG_TAIL.load(Ordering::Acquire), Ordering::Release);
    }

    fn procline(&self, title: &str) {
        #[cfg(target_os = "linux")]
        {
            if let Ok(name) = std::ffi::CString::new(title) {
                // The kernel truncates to its own limit.
                unsafe { libc::prctl(libc::PR_SET_NAME, name.as_ptr()) };
            }
        }
        #[cfg(not(target_os = "linux"))]
        let _ = title;
    }

    fn exit(&self, code: i32) -> ! {
        // _exit, not exit: a forked child must not flush buffers or run
        // atexit handlers it inherited from the manager.
        unsafe { libc::_exit(code) }
    }
}
