//! Worker thread draining the dispatch queue.

use std::{
    io,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
};

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, error};

use crate::{error::GelfError, transport::Transport};

use super::{Connector, DispatchStats, job::SendJob, pending::Pending};

/// Name given to every dispatcher worker thread.
pub const WORKER_THREAD_NAME: &str = "gelf-dispatcher";

/// Commands processed by the worker thread.
#[derive(Debug)]
pub(crate) enum DispatchCommand {
    Job(SendJob),
    /// Sentinel; the worker exits after everything queued before it.
    Shutdown,
}

/// A live worker together with the channel feeding it.
pub(crate) struct WorkerHandle {
    pub(crate) tx: Sender<DispatchCommand>,
    pub(crate) handle: thread::JoinHandle<()>,
    pub(crate) pending: Arc<Pending>,
    pub(crate) generation: u64,
    /// Set once the shutdown sentinel has been enqueued.
    pub(crate) stopping: bool,
}

impl WorkerHandle {
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

pub(crate) fn spawn_worker(
    connector: Connector,
    stats: Arc<DispatchStats>,
    generation: u64,
) -> io::Result<WorkerHandle> {
    let (tx, rx) = unbounded();
    let pending = Arc::new(Pending::default());
    let worker_pending = Arc::clone(&pending);
    let handle = thread::Builder::new()
        .name(WORKER_THREAD_NAME.into())
        .spawn(move || worker_loop(rx, connector, worker_pending, stats))?;
    Ok(WorkerHandle {
        tx,
        handle,
        pending,
        generation,
        stopping: false,
    })
}

fn worker_loop(
    rx: Receiver<DispatchCommand>,
    connector: Connector,
    pending: Arc<Pending>,
    stats: Arc<DispatchStats>,
) {
    let mut transport: Option<Box<dyn Transport>> = None;
    while let Ok(cmd) = rx.recv() {
        match cmd {
            DispatchCommand::Job(job) if pending.is_abandoned() => {
                drop(job);
                pending.done();
            }
            DispatchCommand::Job(job) => {
                let active = transport.get_or_insert_with(|| connector());
                if !run_job(active.as_mut(), job, &stats) {
                    // A transport that panicked mid-send may hold broken state.
                    transport = None;
                }
                pending.done();
            }
            DispatchCommand::Shutdown => {
                if let Some(mut transport) = transport.take() {
                    transport.close();
                }
                pending.done();
                break;
            }
        }
    }
    debug!("GelfDispatcher worker exiting");
}

/// Send one job and fire its callback. Returns `false` if the transport
/// panicked.
fn run_job(transport: &mut dyn Transport, job: SendJob, stats: &DispatchStats) -> bool {
    let (payload, headers, on_success, on_failure) = job.into_parts();
    let (result, transport_ok) =
        match panic::catch_unwind(AssertUnwindSafe(|| transport.send(&payload))) {
            Ok(result) => (result, true),
            Err(_) => {
                error!("GelfDispatcher transport panicked while sending");
                (
                    Err(GelfError::Connection(io::Error::other(
                        "transport panicked while sending",
                    ))),
                    false,
                )
            }
        };

    let outcome = match result {
        Ok(()) => {
            stats.record_delivered();
            on_success.map(|callback| panic::catch_unwind(AssertUnwindSafe(callback)))
        }
        Err(err) => {
            stats.record_failed();
            debug!(
                "GelfDispatcher send of {} bytes failed: {err}; headers: {headers:?}",
                payload.len()
            );
            on_failure.map(|callback| panic::catch_unwind(AssertUnwindSafe(move || callback(err))))
        }
    };
    if let Some(Err(_)) = outcome {
        error!("GelfDispatcher failed processing job: callback panicked");
    }
    transport_ok
}
