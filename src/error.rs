//! Error types shared by the message pipeline, transports and handlers.

use std::io;

use thiserror::Error;

/// Failure raised while building, encoding or delivering a GELF message.
#[derive(Debug, Error)]
pub enum GelfError {
    /// The payload could not be encoded as JSON or compressed.
    #[error("failed to encode GELF payload: {0}")]
    Encoding(String),
    /// A field holds a value GELF cannot represent.
    #[error("malformed field `{field}`: {reason}")]
    MalformedField { field: String, reason: String },
    /// The endpoint could not connect or complete a write.
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),
    /// A severity name or number is not present in the severity table.
    #[error("unknown syslog level: {0}")]
    UnknownLevel(String),
}

impl GelfError {
    pub(crate) fn encoding(err: impl std::fmt::Display) -> Self {
        Self::Encoding(err.to_string())
    }

    pub(crate) fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Return `true` for transport failures.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// Errors surfaced to callers of [`GelfHandlerTrait`](crate::handler::GelfHandlerTrait).
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler has been closed and no longer accepts records.
    #[error("handler is closed")]
    Closed,
    /// Delivery failed and the failure policy asks for propagation.
    #[error(transparent)]
    Delivery(#[from] GelfError),
}
