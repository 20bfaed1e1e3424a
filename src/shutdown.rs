//! Termination signal handling.
//!
//! The only way to cancel a running kernel is to signal dockernel itself.
//! Handlers installed here record the signal in an atomic; the orchestrator
//! polls [`Shutdown::received`] while it waits on the container, stops the
//! container, and then [`reraise`]s the original signal.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};

/// Signal number recorded by the process handlers (0 = none).
static SIGNAL_RECEIVED: AtomicI32 = AtomicI32::new(0);

/// Flag indicating whether the handlers have been installed.
static HANDLERS_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Signals that cancel a running kernel.
#[cfg(unix)]
pub const TERMINATION_SIGNALS: [libc::c_int; 3] = [libc::SIGINT, libc::SIGTERM, libc::SIGHUP];

/// Default grace period between stop request and force kill.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval for waits that must notice a termination signal.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cancellation source observed by the orchestrator.
///
/// A `Shutdown` from [`Shutdown::install`] also observes process signals;
/// one from [`Shutdown::new`] is triggered only through [`Shutdown::trigger`].
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    local: Arc<AtomicI32>,
    watch_process: bool,
}

impl Shutdown {
    /// A cancellation source not tied to process signals.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install SIGINT/SIGTERM/SIGHUP handlers and observe them.
    ///
    /// The handlers are process-global and installed once.
    pub fn install() -> Result<Self> {
        install_handlers()?;
        Ok(Self {
            local: Arc::new(AtomicI32::new(0)),
            watch_process: true,
        })
    }

    /// Request cancellation as if `signal` had been received.
    pub fn trigger(&self, signal: i32) {
        self.local.store(signal, Ordering::SeqCst);
    }

    /// The signal that requested cancellation, if any.
    pub fn received(&self) -> Option<i32> {
        let local = self.local.load(Ordering::SeqCst);
        if local != 0 {
            return Some(local);
        }
        if self.watch_process {
            let process = SIGNAL_RECEIVED.load(Ordering::SeqCst);
            if process != 0 {
                return Some(process);
            }
        }
        None
    }
}

#[cfg(unix)]
fn install_handlers() -> Result<()> {
    // Only install once
    if HANDLERS_INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    for signal in TERMINATION_SIGNALS {
        // SAFETY: the handler only stores into an atomic, which is async-signal-safe.
        let rc = unsafe {
            let mut sa: libc::sigaction = std::mem::zeroed();
            sa.sa_sigaction = record_signal as *const () as usize;
            sa.sa_flags = libc::SA_RESTART;
            libc::sigemptyset(&mut sa.sa_mask);
            libc::sigaction(signal, &sa, std::ptr::null_mut())
        };
        if rc != 0 {
            HANDLERS_INSTALLED.store(false, Ordering::SeqCst);
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
    }

    tracing::debug!("installed termination signal handlers");
    Ok(())
}

#[cfg(not(unix))]
fn install_handlers() -> Result<()> {
    HANDLERS_INSTALLED.store(true, Ordering::SeqCst);
    Ok(())
}

#[cfg(unix)]
extern "C" fn record_signal(sig: libc::c_int) {
    SIGNAL_RECEIVED.store(sig, Ordering::SeqCst);
}

/// Terminate the process with `signal`, restoring its default disposition first.
///
/// Falls back to exiting with `128 + signal` if the signal does not end the process.
pub fn reraise(signal: i32) -> ! {
    #[cfg(unix)]
    {
        // SAFETY: restoring SIG_DFL and raising are plain libc calls with no memory access.
        unsafe {
            libc::signal(signal, libc::SIG_DFL);
            libc::raise(signal);
        }
    }
    std::process::exit(128 + signal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_shutdown_starts_clear() {
        let shutdown = Shutdown::new();
        assert_eq!(shutdown.received(), None);
    }

    #[test]
    fn test_trigger_is_visible_to_clones() {
        let shutdown = Shutdown::new();
        let observer = shutdown.clone();
        shutdown.trigger(15);
        assert_eq!(observer.received(), Some(15));
    }

    #[test]
    fn test_manual_shutdown_ignores_process_signals() {
        let shutdown = Shutdown::new();
        // A detached source never reads the process-global slot
        assert!(!shutdown.watch_process);
        assert_eq!(shutdown.received(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_installed_handler_records_signal() {
        let shutdown = Shutdown::install().unwrap();
        assert!(HANDLERS_INSTALLED.load(Ordering::SeqCst));

        // SAFETY: the installed handler only stores into an atomic.
        let rc = unsafe { libc::raise(libc::SIGHUP) };
        assert_eq!(rc, 0);

        assert_eq!(shutdown.received(), Some(libc::SIGHUP));
        // Installing again reuses the handlers and sees the same signal
        assert_eq!(Shutdown::install().unwrap().received(), Some(libc::SIGHUP));
        // Detached sources stay unaffected
        assert_eq!(Shutdown::new().received(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_reraise_terminates_with_signal() {
        use std::os::unix::process::ExitStatusExt;

        const CHILD_ENV: &str = "DOCKERNEL_TEST_RERAISE_CHILD";
        if std::env::var_os(CHILD_ENV).is_some() {
            reraise(libc::SIGTERM);
        }

        // Re-run only this test in a child process, which then re-raises
        let status = std::process::Command::new(std::env::current_exe().unwrap())
            .args([
                "--exact",
                "shutdown::tests::test_reraise_terminates_with_signal",
                "--nocapture",
            ])
            .env(CHILD_ENV, "1")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .unwrap();

        assert_eq!(
            status.signal(),
            Some(libc::SIGTERM),
            "child should die from the re-raised signal, got {:?}",
            status
        );
    }
}
