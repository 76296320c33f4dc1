//! A simple handler that accumulates records in memory for test assertions.

use crate::error::HandlerError;
use crate::handler::GelfHandlerTrait;
use crate::log_record::GelfLogRecord;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;

/// Handler that stores every record it receives for later inspection.
#[derive(Clone, Default)]
pub struct CollectingHandler {
    records: Arc<Mutex<Vec<GelfLogRecord>>>,
}

impl CollectingHandler {
    /// Create a new empty handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a snapshot of all records received so far.
    pub fn collected(&self) -> Vec<GelfLogRecord> {
        self.records.lock().clone()
    }
}

impl GelfHandlerTrait for CollectingHandler {
    fn handle(&self, record: GelfLogRecord) -> Result<(), HandlerError> {
        self.records.lock().push(record);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
