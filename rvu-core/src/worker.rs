//! The library worker thread.
//!
//! The remote-access library permits one initialization and one shutdown
//! per process and must only ever be touched from a single thread.
//! [`LibraryWorker`] owns that thread: it initializes the library there,
//! runs viewer sessions one at a time, and shuts the library down when
//! stopped. Everything else in the process talks to the library through
//! message passing — never through a shared reference.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::error::RvuError;
use crate::remote::RemoteLibrary;
use crate::session::{SessionHandle, SessionMessage, ViewerSession};

// ── WorkerPhase ──────────────────────────────────────────────────

/// Observable state of the library worker. (Before [`LibraryWorker::start`]
/// resolves there is no worker to observe.)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    /// Initialized and idle; ready to run a session.
    Ready,
    /// A viewer session is current.
    Running,
    /// Stop requested or completed; no further sessions may run.
    Stopped,
}

impl std::fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ready => "Ready",
            Self::Running => "Running",
            Self::Stopped => "Stopped",
        };
        write!(f, "{name}")
    }
}

// ── Shared state ─────────────────────────────────────────────────

struct WorkerState {
    /// Session queued for the worker, cleared before its `run` begins.
    pending: Option<ViewerSession>,
    /// Channel into the in-progress session, for the abrupt stop path.
    current_tx: Option<mpsc::Sender<SessionMessage>>,
    stop: bool,
    next_generation: u64,
}

struct Shared {
    state: Mutex<WorkerState>,
    cond: Condvar,
}

// ── LibraryWorker ────────────────────────────────────────────────

/// Handle to the dedicated thread that owns the remote-access library.
pub struct LibraryWorker {
    shared: Arc<Shared>,
    /// Generation of the current session; 0 when none is running.
    current_gen: Arc<AtomicU64>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl std::fmt::Debug for LibraryWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryWorker").finish_non_exhaustive()
    }
}

impl LibraryWorker {
    /// Spawn the worker thread and initialize the library on it.
    ///
    /// Resolves once initialization has succeeded; an initialization
    /// failure is reported here, exactly once, and the thread exits
    /// without a shutdown call.
    pub async fn start(lib: impl RemoteLibrary) -> Result<Self, RvuError> {
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), RvuError>>();
        let shared = Arc::new(Shared {
            state: Mutex::new(WorkerState {
                pending: None,
                current_tx: None,
                stop: false,
                next_generation: 0,
            }),
            cond: Condvar::new(),
        });
        let current_gen = Arc::new(AtomicU64::new(0));

        let thread = thread::Builder::new()
            .name("rvu-library".into())
            .spawn({
                let shared = Arc::clone(&shared);
                let current_gen = Arc::clone(&current_gen);
                move || worker_main(lib, shared, current_gen, ready_tx)
            })
            .map_err(|e| RvuError::Init {
                message: format!("failed to spawn library thread: {e}"),
            })?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(Self {
                shared,
                current_gen,
                thread: Mutex::new(Some(thread)),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(RvuError::Init {
                    message: "library thread exited before signalling readiness".into(),
                })
            }
        }
    }

    /// Record `session` as current and signal the worker to run it.
    ///
    /// Returns the [`SessionHandle`] for interactive calls. Callers must
    /// wait for the previous session's disconnect notification before
    /// starting another; a premature start is rejected with
    /// [`RvuError::SessionActive`].
    pub fn start_session(&self, mut session: ViewerSession) -> Result<SessionHandle, RvuError> {
        let mut state = self.shared.state.lock().expect("worker lock poisoned");
        if state.stop {
            return Err(RvuError::WorkerStopped);
        }
        if state.pending.is_some()
            || state.current_tx.is_some()
            || self.current_gen.load(Ordering::Acquire) != 0
        {
            return Err(RvuError::SessionActive);
        }

        state.next_generation += 1;
        let generation = state.next_generation;
        session.set_generation(generation);
        let handle =
            SessionHandle::new(session.sender(), generation, Arc::clone(&self.current_gen));
        state.pending = Some(session);
        self.shared.cond.notify_one();
        Ok(handle)
    }

    /// Current worker phase.
    pub fn phase(&self) -> WorkerPhase {
        let state = self.shared.state.lock().expect("worker lock poisoned");
        if state.stop {
            WorkerPhase::Stopped
        } else if state.pending.is_some()
            || state.current_tx.is_some()
            || self.current_gen.load(Ordering::Acquire) != 0
        {
            WorkerPhase::Running
        } else {
            WorkerPhase::Ready
        }
    }

    /// Stop the worker: abruptly break any in-progress session (no clean
    /// protocol disconnect — this is the process-shutdown path), then
    /// block until the thread has exited and the library has been shut
    /// down. Any later [`start_session`](Self::start_session) fails with
    /// [`RvuError::WorkerStopped`].
    pub fn stop(&self) {
        let Some(thread) = self
            .thread
            .lock()
            .expect("worker lock poisoned")
            .take()
        else {
            return;
        };

        let current_tx = {
            let mut state = self.shared.state.lock().expect("worker lock poisoned");
            state.stop = true;
            if let Some(mut queued) = state.pending.take() {
                // Queued but never ran; still owes its caller a
                // disconnect notification.
                warn!("dropping queued session during worker stop");
                queued.report_failure("Stopped".into());
            }
            self.shared.cond.notify_one();
            state.current_tx.clone()
        };

        if let Some(tx) = current_tx {
            let _ = tx.send(SessionMessage::HardStop);
        }

        if thread.join().is_err() {
            error!("library thread terminated by panic");
        }
    }
}

impl Drop for LibraryWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Worker thread body ───────────────────────────────────────────

fn worker_main(
    mut lib: impl RemoteLibrary,
    shared: Arc<Shared>,
    current_gen: Arc<AtomicU64>,
    ready_tx: oneshot::Sender<Result<(), RvuError>>,
) {
    if let Err(e) = lib.initialize() {
        error!("library initialization failed: {e}");
        let _ = ready_tx.send(Err(e));
        return;
    }
    info!("library initialized");
    let _ = ready_tx.send(Ok(()));

    run_loop(&mut lib, &shared, &current_gen);

    lib.shutdown();
    info!("library shut down");
}

fn run_loop(lib: &mut dyn RemoteLibrary, shared: &Shared, current_gen: &Arc<AtomicU64>) {
    loop {
        let mut session = {
            let mut state = shared.state.lock().expect("worker lock poisoned");
            loop {
                if state.stop {
                    return;
                }
                if let Some(session) = state.pending.take() {
                    // The pending slot is cleared before `run` begins, so
                    // the next session may be queued the instant this one
                    // reports completion.
                    state.current_tx = Some(session.sender());
                    break session;
                }
                state = shared.cond.wait(state).expect("worker lock poisoned");
            }
        };

        current_gen.store(session.generation(), Ordering::Release);
        let outcome =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| session.run(&mut *lib)));
        current_gen.store(0, Ordering::Release);

        shared
            .state
            .lock()
            .expect("worker lock poisoned")
            .current_tx = None;

        // A session failure must never take the worker down with it; the
        // loop continues to accept the next session.
        if let Err(panic) = outcome {
            let reason = panic_message(panic);
            error!("session panicked: {reason}");
            session.report_failure(format!("internal error: {reason}"));
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
