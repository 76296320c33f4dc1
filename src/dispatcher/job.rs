//! Unit of work executed by the dispatcher worker.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::GelfError;

/// Invoked on the worker thread after a successful send.
pub type SuccessCallback = Box<dyn FnOnce() + Send>;
/// Invoked on the worker thread with the error of a failed send.
pub type FailureCallback = Box<dyn FnOnce(GelfError) + Send>;

/// Encoded payload plus the callbacks that report its outcome.
///
/// Exactly one callback fires per job, unless the job is abandoned by a
/// timed-out shutdown, in which case neither does.
pub struct SendJob {
    payload: Vec<u8>,
    headers: Option<BTreeMap<String, String>>,
    on_success: Option<SuccessCallback>,
    on_failure: Option<FailureCallback>,
}

impl SendJob {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            headers: None,
            on_success: None,
            on_failure: None,
        }
    }

    /// Attach transport-agnostic metadata, reported alongside failures.
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn on_success(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn on_failure(mut self, callback: impl FnOnce(GelfError) + Send + 'static) -> Self {
        self.on_failure = Some(Box::new(callback));
        self
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn headers(&self) -> Option<&BTreeMap<String, String>> {
        self.headers.as_ref()
    }

    /// Split into the parts the worker needs.
    pub(crate) fn into_parts(
        self,
    ) -> (
        Vec<u8>,
        Option<BTreeMap<String, String>>,
        Option<SuccessCallback>,
        Option<FailureCallback>,
    ) {
        (self.payload, self.headers, self.on_success, self.on_failure)
    }

    /// Report `err` without sending, e.g. when no worker can be started.
    pub(crate) fn fail(self, err: GelfError) {
        if let Some(callback) = self.on_failure {
            callback(err);
        }
    }
}

impl fmt::Debug for SendJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendJob")
            .field("payload_len", &self.payload.len())
            .field("headers", &self.headers)
            .field("on_success", &self.on_success.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .finish()
    }
}
