//! Background save worker
//!
//! One dedicated thread persists project snapshots so the control thread never
//! blocks on disk. Requests go through a single-slot mailbox: a new request
//! replaces any pending one, so a burst of edits collapses into one save of
//! the newest snapshot. A request raised while a save is running is picked up
//! by the next sweep.
//!
//! Shutdown sets the stop flag, wakes the worker and joins it. The worker
//! drains the pending slot before exiting, and a running save always finishes,
//! so the last request is flushed before `shutdown` returns.

use patlabel_common::{Error, ProjectState, Result};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Snapshot to persist
#[derive(Debug, Clone)]
pub struct SaveRequest {
    /// Target document
    pub path: PathBuf,
    pub state: ProjectState,
}

#[derive(Debug, Default)]
struct Mailbox {
    /// Latest request not yet picked up
    pending: Option<SaveRequest>,
    /// A save is running on the worker thread
    saving: bool,
}

/// State shared between the handle and the worker thread
struct SharedSaveState {
    mailbox: Mutex<Mailbox>,

    /// Signals a new request, a finished save, or shutdown
    condvar: Condvar,

    stop_flag: AtomicBool,

    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl SharedSaveState {
    fn lock(&self) -> MutexGuard<'_, Mailbox> {
        self.mailbox.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to the save thread
pub struct SaveWorker {
    state: Arc<SharedSaveState>,
    thread: Option<JoinHandle<()>>,
}

impl SaveWorker {
    /// Start the worker; `save` performs one save and reports its outcome
    pub fn spawn<F>(save: F) -> Result<Self>
    where
        F: Fn(&SaveRequest) -> Result<()> + Send + 'static,
    {
        let state = Arc::new(SharedSaveState {
            mailbox: Mutex::new(Mailbox::default()),
            condvar: Condvar::new(),
            stop_flag: AtomicBool::new(false),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        });

        let state_clone = Arc::clone(&state);
        let thread = thread::Builder::new()
            .name("save-worker".to_string())
            .spawn(move || Self::worker_loop(state_clone, save))?;

        info!("Save worker started");
        Ok(Self {
            state,
            thread: Some(thread),
        })
    }

    /// Queue a snapshot, replacing any request not yet picked up
    pub fn request_save(&self, request: SaveRequest) -> Result<()> {
        if self.state.stop_flag.load(Ordering::Acquire) {
            return Err(Error::InvalidInput("Save worker is shut down".to_string()));
        }
        let mut mailbox = self.state.lock();
        if mailbox.pending.replace(request).is_some() {
            debug!("Pending save superseded by a newer snapshot");
        }
        drop(mailbox);
        self.state.condvar.notify_all();
        Ok(())
    }

    /// Block until nothing is pending and no save is running
    pub fn wait_idle(&self) {
        let mut mailbox = self.state.lock();
        while mailbox.pending.is_some() || mailbox.saving {
            mailbox = self
                .state
                .condvar
                .wait(mailbox)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Number of saves that finished successfully
    pub fn saves_completed(&self) -> usize {
        self.state.completed.load(Ordering::Acquire)
    }

    /// Number of saves that returned an error
    pub fn saves_failed(&self) -> usize {
        self.state.failed.load(Ordering::Acquire)
    }

    /// Flush the pending request and stop the worker
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };
        info!("Shutting down save worker");
        self.state.stop_flag.store(true, Ordering::Release);
        self.state.condvar.notify_all();

        match handle.join() {
            Ok(()) => debug!("Save worker joined"),
            Err(e) => error!("Save worker join failed: {:?}", e),
        }
        info!(
            "Save worker stopped ({} saved, {} failed)",
            self.saves_completed(),
            self.saves_failed()
        );
    }

    fn worker_loop<F>(state: Arc<SharedSaveState>, save: F)
    where
        F: Fn(&SaveRequest) -> Result<()>,
    {
        debug!("Save worker running");
        loop {
            let request = {
                let mut mailbox = state.lock();

                // Wait for work or shutdown signal
                while mailbox.pending.is_none() && !state.stop_flag.load(Ordering::Acquire) {
                    mailbox = state
                        .condvar
                        .wait(mailbox)
                        .unwrap_or_else(PoisonError::into_inner);
                }

                // Pending work is drained before honouring stop
                match mailbox.pending.take() {
                    Some(request) => {
                        mailbox.saving = true;
                        request
                    }
                    None => break,
                }
            };

            debug!("Saving {}", request.path.display());
            // A panicking save counts as a failure; `saving` must still clear
            // or `wait_idle` never returns.
            match panic::catch_unwind(AssertUnwindSafe(|| save(&request))) {
                Ok(Ok(())) => {
                    state.completed.fetch_add(1, Ordering::AcqRel);
                    debug!("Saved {}", request.path.display());
                }
                Ok(Err(e)) => {
                    state.failed.fetch_add(1, Ordering::AcqRel);
                    warn!("Background save of {} failed: {}", request.path.display(), e);
                }
                Err(_) => {
                    state.failed.fetch_add(1, Ordering::AcqRel);
                    error!("Background save of {} panicked", request.path.display());
                }
            }

            state.lock().saving = false;
            state.condvar.notify_all();
        }
        debug!("Save worker received shutdown signal");
    }
}

impl Drop for SaveWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
