//! GELF handler: message building, framing and asynchronous delivery.

mod config;
mod failure;
mod handler;

pub use config::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_HOST, DEFAULT_SHUTDOWN_TIMEOUT_MS, DEFAULT_TCP_PORT,
    DEFAULT_UDP_PORT, DEFAULT_WRITE_TIMEOUT_MS, FailurePolicy, GelfConfig, Protocol,
};
pub use failure::{DeliveryFailure, FailureHook, SuccessHook};
pub use handler::GelfHandler;

pub(crate) use handler::HandlerParts;
