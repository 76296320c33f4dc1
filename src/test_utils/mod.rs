//! Test helpers shared across unit tests and, behind the `test-util`
//! feature, integration tests.

pub mod collecting_handler;
pub mod recording_transport;

pub use collecting_handler::CollectingHandler;
pub use recording_transport::RecordingTransport;
