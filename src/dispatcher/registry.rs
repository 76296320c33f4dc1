//! Process-wide list of dispatchers to drain at exit.
//!
//! Rust has no interpreter exit hook, so applications call
//! [`shutdown_all`] from `main` (or a signal handler) before returning.
//! Dropping a dispatcher also drains it.

use std::sync::{Arc, Weak};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::DispatcherCore;

static EXIT_HOOKS: Lazy<Mutex<Vec<Weak<DispatcherCore>>>> = Lazy::new(|| Mutex::new(Vec::new()));

pub(crate) fn register(core: &Arc<DispatcherCore>) {
    let mut hooks = EXIT_HOOKS.lock();
    hooks.retain(|hook| hook.strong_count() > 0);
    hooks.push(Arc::downgrade(core));
}

/// Run the timed shutdown of every live dispatcher that has started a
/// worker.
pub fn shutdown_all() {
    let live: Vec<Arc<DispatcherCore>> = {
        let mut hooks = EXIT_HOOKS.lock();
        hooks.retain(|hook| hook.strong_count() > 0);
        hooks.iter().filter_map(Weak::upgrade).collect()
    };
    for core in live {
        core.shutdown();
    }
}

/// Number of live dispatchers currently registered.
pub fn registered_dispatchers() -> usize {
    EXIT_HOOKS
        .lock()
        .iter()
        .filter(|hook| hook.strong_count() > 0)
        .count()
}
