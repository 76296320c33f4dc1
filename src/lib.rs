//! GELF log forwarding for Graylog.
//!
//! A [`GelfHandler`] turns [`GelfLogRecord`]s into GELF 1.1 messages,
//! encodes them for TCP (NUL-terminated) or UDP (optionally gzip
//! compressed) and hands the payload to a background dispatcher. The
//! dispatcher owns a single worker thread and a single connection, so
//! messages leave in the order they were emitted.
//!
//! The `log-compat` and `tracing-compat` features bridge the `log` facade
//! and the `tracing` ecosystem into a handler.

pub mod dispatcher;
pub mod error;
pub mod gelf_handler;
pub mod handler;
pub mod handlers;
pub mod level;
pub mod log_record;
pub mod message;
pub mod rate_limited_warner;
pub mod serialise;
pub mod transport;

#[cfg(feature = "log-compat")]
pub mod log_compat;
#[cfg(feature = "tracing-compat")]
pub mod tracing_compat;

#[cfg(any(test, feature = "test-util"))]
pub mod test_utils;

pub use dispatcher::{
    DispatchSnapshot, Dispatcher, DispatcherOptions, SendJob, registered_dispatchers,
    shutdown_all,
};
pub use error::{GelfError, HandlerError};
pub use gelf_handler::{DeliveryFailure, FailurePolicy, GelfConfig, GelfHandler, Protocol};
pub use handler::GelfHandlerTrait;
pub use handlers::{GelfHandlerBuilder, HandlerBuildError, HandlerBuilderTrait};
pub use level::{GelfLevel, SeverityRegistry, SeverityTable};
pub use log_record::{GelfLogRecord, RecordMetadata, now_epoch_secs};
pub use message::{BuildFailure, GelfMessage, MessageBuilder, MessageConfig, local_hostname};
pub use rate_limited_warner::RateLimitedWarner;
pub use serialise::{UdpCompression, decode_text, encode_json, encode_tcp, encode_udp};

#[cfg(feature = "log-compat")]
pub use log_compat::{GelfLogAdapter, install_global_logger};
#[cfg(feature = "tracing-compat")]
pub use tracing_compat::GelfLayer;
