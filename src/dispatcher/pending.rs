//! Count of submitted-but-unfinished work with a timed join.

use std::time::{Duration, Instant};

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};

/// Tracks unfinished commands for one worker.
///
/// Producers call [`add`](Self::add) before enqueueing; the worker calls
/// [`done`](Self::done) after finishing each command.
#[derive(Debug, Default)]
pub(crate) struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
    abandoned: AtomicBool,
}

impl Pending {
    pub(crate) fn add(&self) {
        *self.count.lock() += 1;
    }

    pub(crate) fn done(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    pub(crate) fn get(&self) -> usize {
        *self.count.lock()
    }

    /// Tell the worker to discard the remaining jobs without running them.
    pub(crate) fn abandon(&self) {
        self.abandoned.store(true, Ordering::Release);
    }

    pub(crate) fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }

    /// Wait until nothing is pending. Returns `false` on timeout.
    pub(crate) fn wait_idle(&self, timeout: Duration) -> bool {
        let mut count = self.count.lock();
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            while *count > 0 {
                self.idle.wait(&mut count);
            }
            return true;
        };
        while *count > 0 {
            if self.idle.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }
}
