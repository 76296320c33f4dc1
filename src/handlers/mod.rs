//! Handler builders and associated traits.
//!
//! Provides a minimal builder API for constructing handlers in a
//! type-safe manner. Each builder implements [`HandlerBuilderTrait`]
//! which validates the configuration before creating the handler.

use std::io;

use thiserror::Error;

use crate::handler::GelfHandlerTrait;

mod builder_macros;
pub mod gelf_builder;

pub use gelf_builder::GelfHandlerBuilder;

/// Errors that may occur while building a handler.
#[derive(Debug, Error)]
pub enum HandlerBuildError {
    /// Invalid user supplied configuration.
    #[error("invalid handler configuration: {0}")]
    InvalidConfig(String),
    /// Underlying I/O error whilst creating the handler.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Trait implemented by all handler builders.
pub trait HandlerBuilderTrait: Send + Sync {
    /// Concrete handler produced by the builder.
    type Handler: GelfHandlerTrait + 'static;

    /// Validate the configuration and build the concrete handler.
    fn build_inner(&self) -> Result<Self::Handler, HandlerBuildError>;

    /// Build the handler boxed behind [`GelfHandlerTrait`].
    fn build(&self) -> Result<Box<dyn GelfHandlerTrait>, HandlerBuildError> {
        Ok(Box::new(self.build_inner()?))
    }
}
