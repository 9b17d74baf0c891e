//! Interrupt-safe cleanup for running tactics.
//!
//! A listener runs on its own thread with a single-threaded tokio runtime,
//! independent of whatever the strike loop is doing. Tactics register their
//! change ledger with it through a `CleanupHandle` while they execute. When
//! SIGINT or SIGTERM arrives the listener reverts the ledger of the tactic
//! that is running (if any), logs whether that worked, and exits the process
//! with status 0.
//!
//! The OS signal registration cannot be undone, so the process-wide listener
//! is installed once and lives until the process exits. A signal that arrives
//! between tactics still terminates the process.

use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::JoinHandle;

use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::change::ChangeLedger;

/// What the listener does after cleaning up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPolicy {
    /// Terminate the process with status 0, whatever the cleanup outcome.
    ExitProcess,
    /// Return from the listener thread. Used when the host owns shutdown.
    Return,
}

#[derive(Debug)]
struct Watched {
    tactic: String,
    ledger: ChangeLedger,
}

/// Shared slot naming the tactic whose changes a listener must revert.
#[derive(Debug, Clone, Default)]
pub struct CleanupHandle {
    active: Arc<Mutex<Option<Watched>>>,
}

impl CleanupHandle {
    /// Make `ledger` the one reverted on a signal until the guard is dropped.
    pub fn watch(&self, tactic: &str, ledger: ChangeLedger) -> WatchGuard {
        *self.lock() = Some(Watched {
            tactic: tactic.to_string(),
            ledger,
        });
        WatchGuard {
            handle: self.clone(),
        }
    }

    /// Name of the tactic currently watched.
    pub fn watching(&self) -> Option<String> {
        self.lock().as_ref().map(|w| w.tactic.clone())
    }

    fn run_cleanup(&self, signal: &str) {
        // Clone out of the slot so a finishing tactic can clear it meanwhile.
        let watched = self
            .lock()
            .as_ref()
            .map(|w| (w.tactic.clone(), w.ledger.clone()));
        let Some((tactic, ledger)) = watched else {
            warn!(signal, "termination requested; no tactic running");
            return;
        };

        warn!(tactic = %tactic, signal, changes = ledger.len(), "termination requested; reverting changes");
        let failures = ledger.revert_all();
        if failures.is_empty() {
            info!(tactic = %tactic, "cleanup completed; all changes reverted");
        } else {
            error!(
                tactic = %tactic,
                failed = failures.len(),
                "cleanup failed; the target system may be in a bad state"
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Watched>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the watched ledger when dropped.
pub struct WatchGuard {
    handle: CleanupHandle,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        *self.handle.lock() = None;
    }
}

static PROCESS_LISTENER: OnceLock<Option<CleanupHandle>> = OnceLock::new();

pub struct CleanupListener {
    handle: CleanupHandle,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CleanupListener {
    /// The handle of the process-wide signal listener, installing it on first
    /// use. `None` when signals cannot be observed on this platform.
    pub fn process_handle() -> Option<CleanupHandle> {
        PROCESS_LISTENER
            .get_or_init(|| match Self::spawn(wait_for_termination, ExitPolicy::ExitProcess) {
                Ok(listener) => Some(listener.detach()),
                Err(e) => {
                    warn!(error = %e, "running without interrupt listener");
                    None
                }
            })
            .clone()
    }

    /// Listen for an arbitrary trigger. The trigger future resolves to a label
    /// for the event that fired.
    pub fn spawn<F, Fut>(trigger: F, policy: ExitPolicy) -> io::Result<Self>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = io::Result<&'static str>>,
    {
        let handle = CleanupHandle::default();
        let watched = handle.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("raid-cleanup".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!(error = %e, "failed to start interrupt listener");
                        return;
                    }
                };

                runtime.block_on(async move {
                    tokio::select! {
                        _ = &mut shutdown_rx => {
                            debug!("interrupt listener stopped");
                        }
                        fired = trigger() => match fired {
                            Ok(signal) => {
                                watched.run_cleanup(signal);
                                if policy == ExitPolicy::ExitProcess {
                                    std::process::exit(0);
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "could not listen for termination signals");
                            }
                        },
                    }
                });
            })?;

        Ok(Self {
            handle,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> CleanupHandle {
        self.handle.clone()
    }

    /// Wait for the listener thread to finish without asking it to stop.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    /// Keep the listener running for the rest of the process.
    fn detach(mut self) -> CleanupHandle {
        // A dropped sender would wake the listener; keep the channel open.
        if let Some(tx) = self.shutdown.take() {
            std::mem::forget(tx);
        }
        self.thread.take();
        self.handle.clone()
    }
}

impl Drop for CleanupListener {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(unix)]
async fn wait_for_termination() -> io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => Ok("SIGTERM"),
        _ = sigint.recv() => Ok("SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
