use std::any::Any;

pub use crate::error::HandlerError;
use crate::log_record::GelfLogRecord;

/// Trait implemented by all log handlers.
///
/// Handlers are `Send + Sync` so one instance can be shared between the
/// threads producing records. `handle` must not block on network I/O.
pub trait GelfHandlerTrait: Send + Sync {
    /// Dispatch a log record for handling.
    fn handle(&self, record: GelfLogRecord) -> Result<(), HandlerError>;

    /// Wait for queued records to be delivered. Returns `false` on timeout.
    fn flush(&self) -> bool {
        true
    }

    /// Stop accepting records and release resources. Idempotent.
    fn close(&self) {}

    /// Return `self` as [`Any`] for downcasting.
    fn as_any(&self) -> &dyn Any;
}
