//! Single-worker asynchronous dispatcher.
//!
//! Producers hand encoded payloads to [`Dispatcher::submit`], which enqueues
//! onto an unbounded channel and returns immediately. One background thread
//! drains the channel in submission order, sending each payload through a
//! transport it owns exclusively and reporting the outcome through the job's
//! callbacks.
//!
//! Shutdown is best effort and bounded: a sentinel is queued behind the
//! outstanding work and the caller waits at most the configured timeout
//! before abandoning whatever is left.

mod job;
mod pending;
mod registry;
mod worker;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use log::{info, warn};
use parking_lot::Mutex;

use crate::{error::GelfError, transport::Transport};

pub use job::{FailureCallback, SendJob, SuccessCallback};
pub use registry::{registered_dispatchers, shutdown_all};
pub use worker::WORKER_THREAD_NAME;

use worker::{DispatchCommand, WorkerHandle, spawn_worker};

/// Default bound on the shutdown drain.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// First wait of the shutdown drain, before progress is logged.
pub const INITIAL_SHUTDOWN_WAIT: Duration = Duration::from_millis(100);

/// Factory the worker calls to build its transport.
pub type Connector = Arc<dyn Fn() -> Box<dyn Transport> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatcherOptions {
    pub shutdown_timeout: Duration,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// Delivery counters shared with the worker.
#[derive(Debug, Default)]
pub struct DispatchStats {
    submitted: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    worker_restarts: AtomicU64,
}

impl DispatchStats {
    fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_restart(&self) {
        self.worker_restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            worker_restarts: self.worker_restarts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchSnapshot {
    pub submitted: u64,
    pub delivered: u64,
    pub failed: u64,
    pub worker_restarts: u64,
}

/// Queue plus background worker delivering [`SendJob`]s in order.
///
/// No thread is spawned until the first [`start`](Self::start) or
/// [`submit`](Self::submit). Dropping the dispatcher runs
/// [`shutdown`](Self::shutdown).
pub struct Dispatcher {
    core: Arc<DispatcherCore>,
}

pub(crate) struct DispatcherCore {
    connector: Connector,
    options: DispatcherOptions,
    worker: Mutex<Option<WorkerHandle>>,
    stats: Arc<DispatchStats>,
    generation: AtomicU64,
    registered: AtomicBool,
}

impl Dispatcher {
    pub fn new<F>(connector: F, options: DispatcherOptions) -> Self
    where
        F: Fn() -> Box<dyn Transport> + Send + Sync + 'static,
    {
        Self {
            core: Arc::new(DispatcherCore {
                connector: Arc::new(connector),
                options,
                worker: Mutex::new(None),
                stats: Arc::new(DispatchStats::default()),
                generation: AtomicU64::new(0),
                registered: AtomicBool::new(false),
            }),
        }
    }

    /// Ensure a worker is running. A dead worker is replaced.
    pub fn start(&self) -> Result<(), GelfError> {
        let mut guard = self.core.worker.lock();
        self.core.ensure_worker(&mut guard).map(|_| ())
    }

    /// Queue `job` for delivery without blocking.
    ///
    /// If no worker can be started the job's failure callback receives the
    /// spawn error immediately.
    pub fn submit(&self, job: SendJob) {
        self.core.submit(job);
    }

    /// Approximate number of jobs waiting behind the one in flight.
    pub fn queue_depth(&self) -> usize {
        self.core
            .worker
            .lock()
            .as_ref()
            .map_or(0, |worker| worker.tx.len())
    }

    /// Number of submitted jobs whose callbacks have not yet run.
    pub fn pending(&self) -> usize {
        self.core
            .worker
            .lock()
            .as_ref()
            .map_or(0, |worker| worker.pending.get())
    }

    pub fn is_alive(&self) -> bool {
        self.core
            .worker
            .lock()
            .as_ref()
            .is_some_and(|worker| !worker.stopping && !worker.is_finished())
    }

    /// Wait up to `timeout` for every queued job to finish, leaving the
    /// worker running. Returns `false` on timeout.
    pub fn flush(&self, timeout: Duration) -> bool {
        let pending = self
            .core
            .worker
            .lock()
            .as_ref()
            .map(|worker| Arc::clone(&worker.pending));
        pending.is_none_or(|pending| pending.wait_idle(timeout))
    }

    /// Two-phase timed shutdown. Safe to call repeatedly.
    pub fn shutdown(&self) {
        self.core.shutdown();
    }

    /// Send the sentinel and wait at most `timeout` for the worker to
    /// finish. Returns `true` when everything queued was processed.
    pub fn stop(&self, timeout: Duration) -> bool {
        self.core.drain(timeout, false)
    }

    pub fn stats(&self) -> DispatchSnapshot {
        self.core.stats.snapshot()
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.core.options.shutdown_timeout
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.core.shutdown();
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("options", &self.core.options)
            .field("stats", &self.core.stats.snapshot())
            .finish()
    }
}

impl DispatcherCore {
    /// Return the running worker, replacing a dead one first.
    fn ensure_worker<'a>(
        self: &Arc<Self>,
        guard: &'a mut Option<WorkerHandle>,
    ) -> Result<&'a WorkerHandle, GelfError> {
        if guard.as_ref().is_some_and(WorkerHandle::is_finished) {
            if let Some(dead) = guard.take() {
                self.reap(dead);
            }
        }
        if guard.is_none() {
            let generation = self.generation.fetch_add(1, Ordering::Relaxed);
            let worker = spawn_worker(Arc::clone(&self.connector), Arc::clone(&self.stats), generation)?;
            if !self.registered.swap(true, Ordering::AcqRel) {
                registry::register(self);
            }
            *guard = Some(worker);
        }
        guard
            .as_ref()
            .ok_or_else(|| GelfError::Connection(std::io::Error::other("dispatcher worker unavailable")))
    }

    /// Join a finished worker, counting it as a restart unless it was told
    /// to stop.
    fn reap(&self, worker: WorkerHandle) {
        if !worker.stopping {
            self.stats.record_restart();
            warn!("GelfDispatcher worker died unexpectedly; starting a replacement");
        }
        if worker.handle.join().is_err() {
            warn!("GelfDispatcher worker thread panicked");
        }
    }

    fn submit(self: &Arc<Self>, job: SendJob) {
        self.stats.record_submitted();
        let mut command = DispatchCommand::Job(job);
        let mut guard = self.worker.lock();
        // A second attempt covers a worker that exits between the liveness
        // check and the send.
        for _ in 0..2 {
            let worker = match self.ensure_worker(&mut guard) {
                Ok(worker) => worker,
                Err(err) => {
                    warn!("GelfDispatcher could not start a worker: {err}");
                    if let DispatchCommand::Job(job) = command {
                        job.fail(err);
                    }
                    return;
                }
            };
            if worker.stopping {
                // The sentinel is already queued; nothing behind it would
                // be sent, and it must not hold the drain open.
                drop(guard);
                if let DispatchCommand::Job(job) = command {
                    job.fail(GelfError::Connection(std::io::Error::other(
                        "dispatcher is shutting down",
                    )));
                }
                return;
            }
            worker.pending.add();
            match worker.tx.send(command) {
                Ok(()) => return,
                Err(returned) => {
                    worker.pending.done();
                    command = returned.into_inner();
                    if let Some(dead) = guard.take() {
                        self.reap(dead);
                    }
                }
            }
        }
        if let DispatchCommand::Job(job) = command {
            job.fail(GelfError::Connection(std::io::Error::other(
                "dispatcher worker exited before accepting the job",
            )));
        }
    }

    pub(crate) fn shutdown(&self) {
        self.drain(self.options.shutdown_timeout, true);
    }

    fn drain(&self, timeout: Duration, report_progress: bool) -> bool {
        let (pending, generation, tx) = {
            let mut guard = self.worker.lock();
            let Some(worker) = guard.as_mut() else {
                return true;
            };
            if worker.stopping {
                return false;
            }
            worker.stopping = true;
            worker.pending.add();
            if worker.tx.send(DispatchCommand::Shutdown).is_err() {
                worker.pending.done();
            }
            (Arc::clone(&worker.pending), worker.generation, worker.tx.clone())
        };

        let initial = INITIAL_SHUTDOWN_WAIT.min(timeout);
        let mut drained = pending.wait_idle(initial);
        if !drained {
            if report_progress {
                info!(
                    "GelfDispatcher is attempting to send approximately {} pending messages",
                    tx.len()
                );
                info!("GelfDispatcher waiting up to {:?}", timeout.saturating_sub(initial));
            }
            drained = pending.wait_idle(timeout.saturating_sub(initial));
            if !drained {
                pending.abandon();
                warn!(
                    "GelfDispatcher abandoned approximately {} undelivered messages after {timeout:?}",
                    tx.len()
                );
            }
        }
        drop(tx);

        let mut guard = self.worker.lock();
        if guard.as_ref().is_some_and(|worker| worker.generation == generation) {
            if let Some(worker) = guard.take() {
                if worker.is_finished() {
                    self.reap(worker);
                }
                // Otherwise the worker is detached; it exits once it reaches
                // the sentinel.
            }
        }
        drained
    }
}
