//! In-memory transport that records every payload it is asked to send.

use std::io::{self, Read};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use flate2::read::GzDecoder;
use parking_lot::{Condvar, Mutex};
use serde_json::Value;

use crate::error::GelfError;
use crate::serialise::TCP_DELIMITER;
use crate::transport::Transport;

#[derive(Default)]
struct Recorded {
    attempts: usize,
    payloads: Vec<Vec<u8>>,
    closes: usize,
    connections: usize,
}

/// Transport double sharing its log across clones.
///
/// Every clone handed out by [`connector`](Self::connector) writes into the
/// same log, so a test keeps one handle and inspects what the worker sent.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    state: Arc<(Mutex<Recorded>, Condvar)>,
    delay: Duration,
    fail_first: usize,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` before each send.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the first `count` send attempts with a connection error.
    pub fn failing_first(mut self, count: usize) -> Self {
        self.fail_first = count;
        self
    }

    /// Factory producing transports that record into this instance.
    pub fn connector(&self) -> impl Fn() -> Box<dyn Transport> + Send + Sync + 'static {
        let template = self.clone();
        move || {
            template.state.0.lock().connections += 1;
            Box::new(template.clone())
        }
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.state.0.lock().payloads.clone()
    }

    /// Delivered payloads decoded back into JSON, undoing TCP framing or
    /// gzip as needed.
    pub fn messages(&self) -> Vec<Value> {
        self.payloads()
            .iter()
            .map(|payload| decode_payload(payload))
            .collect()
    }

    pub fn attempts(&self) -> usize {
        self.state.0.lock().attempts
    }

    pub fn closes(&self) -> usize {
        self.state.0.lock().closes
    }

    /// Number of transports built through [`connector`](Self::connector).
    pub fn connections(&self) -> usize {
        self.state.0.lock().connections
    }

    /// Wait until at least `count` payloads were delivered.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let (lock, delivered) = &*self.state;
        let deadline = Instant::now() + timeout;
        let mut recorded = lock.lock();
        while recorded.payloads.len() < count {
            if delivered.wait_until(&mut recorded, deadline).timed_out() {
                return recorded.payloads.len() >= count;
            }
        }
        true
    }
}

impl Transport for RecordingTransport {
    fn send(&mut self, payload: &[u8]) -> Result<(), GelfError> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let (lock, delivered) = &*self.state;
        let mut recorded = lock.lock();
        recorded.attempts += 1;
        if recorded.attempts <= self.fail_first {
            return Err(GelfError::Connection(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "scripted failure",
            )));
        }
        recorded.payloads.push(payload.to_vec());
        delivered.notify_all();
        Ok(())
    }

    fn close(&mut self) {
        self.state.0.lock().closes += 1;
    }
}

/// Decode a TCP frame or UDP datagram into JSON.
pub fn decode_payload(payload: &[u8]) -> Value {
    let json = if payload.starts_with(&[0x1f, 0x8b]) {
        let mut out = Vec::new();
        GzDecoder::new(payload)
            .read_to_end(&mut out)
            .expect("gzip payload decodes");
        out
    } else {
        payload
            .strip_suffix(&[TCP_DELIMITER])
            .unwrap_or(payload)
            .to_vec()
    };
    serde_json::from_slice(&json).expect("payload is JSON")
}
