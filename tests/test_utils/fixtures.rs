//! Local stand-ins for a Graylog input. Each capture binds an ephemeral
//! loopback port and records every GELF message it receives, decoded to
//! JSON.

#![allow(dead_code)]

use std::{
    io::{BufRead, BufReader},
    net::{TcpListener, UdpSocket},
    sync::{Arc, Condvar, Mutex},
    thread,
    time::{Duration, Instant},
};

use gelfhandler::test_utils::recording_transport::decode_payload;
use rstest::fixture;
use serde_json::Value;

#[derive(Clone, Default)]
struct Received(Arc<(Mutex<Vec<Value>>, Condvar)>);

impl Received {
    fn push(&self, message: Value) {
        let (messages, ready) = &*self.0;
        messages.lock().expect("capture lock").push(message);
        ready.notify_all();
    }

    fn wait_for(&self, count: usize, timeout: Duration) -> Vec<Value> {
        let deadline = Instant::now() + timeout;
        let (messages, ready) = &*self.0;
        let mut guard = messages.lock().expect("capture lock");
        while guard.len() < count {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            guard = ready.wait_timeout(guard, left).expect("capture lock").0;
        }
        guard.clone()
    }
}

/// TCP input splitting the stream on NUL delimiters.
pub struct TcpCapture {
    port: u16,
    received: Received,
}

impl TcpCapture {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind tcp capture");
        let port = listener.local_addr().expect("local addr").port();
        let received = Received::default();
        let sink = received.clone();
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let sink = sink.clone();
                thread::spawn(move || {
                    let mut reader = BufReader::new(stream);
                    let mut frame = Vec::new();
                    while matches!(reader.read_until(0, &mut frame), Ok(n) if n > 0) {
                        if frame.last() == Some(&0) {
                            sink.push(decode_payload(&frame));
                        }
                        frame.clear();
                    }
                });
            }
        });
        Self { port, received }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn wait_for(&self, count: usize, timeout: Duration) -> Vec<Value> {
        self.received.wait_for(count, timeout)
    }
}

/// UDP input decoding one message per datagram.
pub struct UdpCapture {
    port: u16,
    received: Received,
}

impl UdpCapture {
    pub fn start() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").expect("bind udp capture");
        let port = socket.local_addr().expect("local addr").port();
        let received = Received::default();
        let sink = received.clone();
        thread::spawn(move || {
            let mut buf = vec![0u8; 65_536];
            while let Ok((len, _)) = socket.recv_from(&mut buf) {
                sink.push(decode_payload(&buf[..len]));
            }
        });
        Self { port, received }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn wait_for(&self, count: usize, timeout: Duration) -> Vec<Value> {
        self.received.wait_for(count, timeout)
    }
}

#[fixture]
pub fn tcp_capture() -> TcpCapture {
    TcpCapture::start()
}

#[fixture]
pub fn udp_capture() -> UdpCapture {
    UdpCapture::start()
}
