//! The public GELF handler.

use std::{
    any::Any,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use delegate::delegate;
use log::{debug, warn};

use crate::{
    dispatcher::{Connector, DispatchSnapshot, Dispatcher, DispatcherOptions, SendJob},
    error::{GelfError, HandlerError},
    handler::GelfHandlerTrait,
    handlers::{GelfHandlerBuilder, HandlerBuildError, HandlerBuilderTrait},
    level::SeverityRegistry,
    log_record::GelfLogRecord,
    message::{BuildFailure, GelfMessage, MessageBuilder},
    rate_limited_warner::RateLimitedWarner,
    serialise::{UdpCompression, encode_tcp, encode_udp},
};

use super::{
    config::{FailurePolicy, GelfConfig, Protocol},
    failure::{DeliveryFailure, FailureHook, FailureSink, SuccessHook},
};

/// Wire framing chosen from the configured protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Framing {
    Tcp,
    Udp(UdpCompression),
}

impl Framing {
    fn encode(self, msg: &GelfMessage) -> Result<Vec<u8>, GelfError> {
        match self {
            Self::Tcp => encode_tcp(msg),
            Self::Udp(compression) => encode_udp(msg, compression),
        }
    }
}

/// Parts assembled by the builder.
pub(crate) struct HandlerParts {
    pub(crate) config: GelfConfig,
    pub(crate) levels: Option<Arc<SeverityRegistry>>,
    pub(crate) on_success: Option<SuccessHook>,
    pub(crate) on_failure: Option<FailureHook>,
    pub(crate) connector: Option<Connector>,
    pub(crate) warn_interval: Duration,
}

/// Handler turning log records into GELF messages and forwarding them to a
/// Graylog endpoint from a background worker.
///
/// [`emit`](Self::emit) builds and encodes on the caller's thread, then
/// queues the payload and returns without waiting for the network.
pub struct GelfHandler {
    builder: MessageBuilder,
    framing: Framing,
    dispatcher: Dispatcher,
    sink: Arc<FailureSink>,
    closed: AtomicBool,
    flush_timeout: Duration,
}

impl GelfHandler {
    /// Build a handler from `config` with default callbacks.
    pub fn new(config: GelfConfig) -> Result<Self, HandlerBuildError> {
        GelfHandlerBuilder::from_config(config).build_inner()
    }

    pub(crate) fn from_parts(parts: HandlerParts) -> Self {
        let HandlerParts {
            config,
            levels,
            on_success,
            on_failure,
            connector,
            warn_interval,
        } = parts;

        let message_config = config.message_config();
        let builder = match levels {
            Some(levels) => MessageBuilder::with_levels(message_config, levels),
            None => MessageBuilder::new(message_config),
        };
        let framing = match config.protocol {
            Protocol::Tcp => Framing::Tcp,
            Protocol::Udp => Framing::Udp(config.udp_compression),
        };
        let endpoint = config.endpoint();
        let timeouts = config.timeouts();
        let options = DispatcherOptions {
            shutdown_timeout: config.shutdown_timeout(),
        };
        let dispatcher = match connector {
            Some(connector) => Dispatcher::new(move || connector(), options),
            None => {
                let endpoint = endpoint.clone();
                Dispatcher::new(move || endpoint.open(timeouts), options)
            }
        };
        let sink = Arc::new(FailureSink::new(
            config.failure_policy,
            on_success,
            on_failure,
            RateLimitedWarner::new(warn_interval),
            endpoint.to_string(),
        ));
        Self {
            builder,
            framing,
            dispatcher,
            sink,
            closed: AtomicBool::new(false),
            flush_timeout: timeouts.write,
        }
    }

    /// Register a callback run on the worker after each delivered message.
    pub fn with_success_callback(self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.sink.set_on_success(Arc::new(callback));
        self
    }

    /// Register a callback run for every message that fails to build,
    /// encode or send.
    pub fn with_failure_callback(
        self,
        callback: impl Fn(&DeliveryFailure) + Send + Sync + 'static,
    ) -> Self {
        self.sink.set_on_failure(Arc::new(callback));
        self
    }

    /// Build, encode and queue `record`.
    ///
    /// Failures are routed to the failure callback and then handled by the
    /// configured [`FailurePolicy`]. Only [`FailurePolicy::Propagate`] turns
    /// them into an `Err`; in that mode an earlier asynchronous send failure
    /// is also returned here once the record has been queued.
    pub fn emit(&self, record: &GelfLogRecord) -> Result<(), HandlerError> {
        if self.closed.load(Ordering::Acquire) {
            self.sink.warner.record_drop();
            self.sink.warner.warn_if_due(|count| {
                warn!("GelfHandler dropped {count} records after close");
            });
            return Err(HandlerError::Closed);
        }
        // Taken first so a failure of this record's own job is reported by
        // the next call rather than racing this one.
        let earlier = self.sink.take_deferred();

        let message = match self.builder.build(record) {
            Ok(message) => message,
            Err(BuildFailure { error, partial }) => {
                return self
                    .sink
                    .fail_now(DeliveryFailure {
                        error,
                        message: Some(partial),
                    })
                    .and(earlier);
            }
        };
        let payload = match self.framing.encode(&message) {
            Ok(payload) => payload,
            Err(error) => {
                return self
                    .sink
                    .fail_now(DeliveryFailure {
                        error,
                        message: Some(message),
                    })
                    .and(earlier);
            }
        };

        let on_success = Arc::clone(&self.sink);
        let on_failure = Arc::clone(&self.sink);
        let job = SendJob::new(payload)
            .on_success(move || on_success.delivered())
            .on_failure(move |error| {
                on_failure.fail_later(DeliveryFailure {
                    error,
                    message: None,
                });
            });
        self.dispatcher.submit(job);
        earlier
    }

    /// Wait until the queue drains or the flush timeout passes.
    pub fn flush(&self) -> bool {
        self.sink.flush_warnings();
        self.dispatcher.flush(self.flush_timeout)
    }

    /// [`flush`](Self::flush), then return any deferred delivery error.
    pub fn flush_checked(&self) -> Result<bool, HandlerError> {
        let drained = self.flush();
        self.take_deferred()?;
        Ok(drained)
    }

    /// Stop accepting records and run the dispatcher's timed shutdown,
    /// closing the connection. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("GelfHandler closing connection to {}", self.sink.endpoint());
        self.dispatcher.shutdown();
        self.sink.flush_warnings();
    }

    /// [`close`](Self::close), then return any deferred delivery error.
    pub fn close_checked(&self) -> Result<(), HandlerError> {
        self.close();
        self.take_deferred()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Host name placed in every message.
    pub fn host(&self) -> &str {
        self.builder.host()
    }

    /// Endpoint URL such as `tcp://graylog:12201`.
    pub fn endpoint(&self) -> &str {
        self.sink.endpoint()
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.sink.policy()
    }

    delegate! {
        to self.dispatcher {
            /// Approximate number of payloads waiting to be sent.
            pub fn queue_depth(&self) -> usize;
            /// Delivery counters of the underlying dispatcher.
            pub fn stats(&self) -> DispatchSnapshot;
        }
    }

    fn take_deferred(&self) -> Result<(), HandlerError> {
        self.sink.take_deferred()
    }
}

impl GelfHandlerTrait for GelfHandler {
    fn handle(&self, record: GelfLogRecord) -> Result<(), HandlerError> {
        self.emit(&record)
    }

    fn flush(&self) -> bool {
        GelfHandler::flush(self)
    }

    fn close(&self) {
        GelfHandler::close(self);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for GelfHandler {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for GelfHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GelfHandler")
            .field("endpoint", &self.sink.endpoint())
            .field("framing", &self.framing)
            .field("policy", &self.sink.policy())
            .field("closed", &self.is_closed())
            .field("flush_timeout", &self.flush_timeout)
            .finish()
    }
}
