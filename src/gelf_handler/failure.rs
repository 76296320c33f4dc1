//! Routing of delivery outcomes to user callbacks and the failure policy.

use std::sync::Arc;

use log::{debug, warn};
use parking_lot::{Mutex, RwLock};

use crate::{
    error::{GelfError, HandlerError},
    message::GelfMessage,
    rate_limited_warner::RateLimitedWarner,
};

use super::config::FailurePolicy;

/// Called on the worker thread after each delivered message.
pub type SuccessHook = Arc<dyn Fn() + Send + Sync>;
/// Called with every message that could not be built, encoded or delivered.
pub type FailureHook = Arc<dyn Fn(&DeliveryFailure) + Send + Sync>;

/// A message that could not be delivered.
#[derive(Debug)]
pub struct DeliveryFailure {
    pub error: GelfError,
    /// The message as far as it was built. `None` when the failure happened
    /// on the wire, after the message had been encoded.
    pub message: Option<GelfMessage>,
}

pub(crate) struct FailureSink {
    policy: FailurePolicy,
    on_success: RwLock<Option<SuccessHook>>,
    on_failure: RwLock<Option<FailureHook>>,
    pub(crate) warner: RateLimitedWarner,
    endpoint: String,
    deferred: Mutex<Option<GelfError>>,
}

impl FailureSink {
    pub(crate) fn new(
        policy: FailurePolicy,
        on_success: Option<SuccessHook>,
        on_failure: Option<FailureHook>,
        warner: RateLimitedWarner,
        endpoint: String,
    ) -> Self {
        Self {
            policy,
            on_success: RwLock::new(on_success),
            on_failure: RwLock::new(on_failure),
            warner,
            endpoint,
            deferred: Mutex::new(None),
        }
    }

    pub(crate) fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(crate) fn set_on_success(&self, hook: SuccessHook) {
        *self.on_success.write() = Some(hook);
    }

    pub(crate) fn set_on_failure(&self, hook: FailureHook) {
        *self.on_failure.write() = Some(hook);
    }

    pub(crate) fn delivered(&self) {
        let hook = self.on_success.read().clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Handle a failure raised on the caller's thread.
    pub(crate) fn fail_now(&self, failure: DeliveryFailure) -> Result<(), HandlerError> {
        match self.route(failure) {
            Some(err) => Err(HandlerError::Delivery(err)),
            None => Ok(()),
        }
    }

    /// Handle a failure raised on the worker thread. Under
    /// [`FailurePolicy::Propagate`] the error is kept for the next caller.
    pub(crate) fn fail_later(&self, failure: DeliveryFailure) {
        if let Some(err) = self.route(failure) {
            let mut deferred = self.deferred.lock();
            if deferred.is_none() {
                *deferred = Some(err);
            } else {
                debug!("GelfHandler already holds an undelivered error; dropping: {err}");
            }
        }
    }

    /// Return and clear the error kept by [`fail_later`](Self::fail_later).
    pub(crate) fn take_deferred(&self) -> Result<(), HandlerError> {
        match self.deferred.lock().take() {
            Some(err) => Err(HandlerError::Delivery(err)),
            None => Ok(()),
        }
    }

    /// Run the user hook, then apply the policy. Returns the error when it
    /// should reach the caller.
    fn route(&self, failure: DeliveryFailure) -> Option<GelfError> {
        let hook = self.on_failure.read().clone();
        if let Some(hook) = hook {
            hook(&failure);
        }
        match self.policy {
            FailurePolicy::Swallow => None,
            FailurePolicy::Report => {
                let err = &failure.error;
                self.warner.record_drop();
                self.warner.warn_if_due(|count| {
                    warn!(
                        "GelfHandler failed to deliver {count} messages to {}; last error: {err}",
                        self.endpoint
                    );
                });
                None
            }
            FailurePolicy::Propagate => Some(failure.error),
        }
    }

    pub(crate) fn flush_warnings(&self) {
        self.warner.flush(|count| {
            warn!(
                "GelfHandler failed to deliver {count} messages to {} in the last interval",
                self.endpoint
            );
        });
    }
}
