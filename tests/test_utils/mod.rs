pub mod fixtures;

pub use fixtures::{TcpCapture, UdpCapture};
