//! Transport endpoints delivering encoded GELF payloads.
//!
//! Both endpoints expose the blocking [`Transport::send`] contract and are
//! owned by the dispatcher's worker thread, so they need no internal locking.
//! [`TcpEndpoint`] keeps one persistent stream and reconnects exactly once per
//! failed send; [`UdpEndpoint`] fires one datagram per payload and never
//! retries.

use std::{
    fmt,
    io::{self, Write},
    net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket},
    time::Duration,
};

use log::{debug, info};
use native_tls::{TlsConnector, TlsStream};

use crate::error::GelfError;

/// Largest payload a single IPv4 UDP datagram can carry.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Blocking send contract implemented by every endpoint.
pub trait Transport: Send {
    /// Deliver one encoded payload.
    fn send(&mut self, payload: &[u8]) -> Result<(), GelfError>;

    /// Release the underlying socket. Safe to call repeatedly.
    fn close(&mut self) {}
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, payload: &[u8]) -> Result<(), GelfError> {
        (**self).send(payload)
    }

    fn close(&mut self) {
        (**self).close();
    }
}

/// TLS connection options.
#[derive(Clone, Debug)]
pub struct TlsOptions {
    /// Domain name presented during the TLS handshake.
    pub domain: String,
    /// Skip certificate and hostname validation. Defaults to `true`, which is
    /// insecure; enable verification for anything beyond a trusted network.
    pub insecure_skip_verify: bool,
}

impl TlsOptions {
    /// Options for `domain` with the default (unverified) policy.
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            insecure_skip_verify: true,
        }
    }

    fn connector(&self) -> io::Result<TlsConnector> {
        let mut builder = TlsConnector::builder();
        if self.insecure_skip_verify {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        builder.build().map_err(io::Error::other)
    }
}

/// TCP destination.
#[derive(Clone, Debug)]
pub struct TcpTransport {
    /// Hostname or IP address to connect to.
    pub host: String,
    /// TCP port number.
    pub port: u16,
    /// Optional TLS configuration.
    pub tls: Option<TlsOptions>,
}

impl TcpTransport {
    fn socket_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map(|iter| iter.collect())
    }
}

/// UDP destination.
#[derive(Clone, Debug)]
pub struct UdpTransport {
    pub host: String,
    pub port: u16,
}

/// Timeouts applied to socket operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub write: Duration,
}

/// Destination selected by the handler configuration.
#[derive(Clone, Debug)]
pub enum EndpointConfig {
    Tcp(TcpTransport),
    Udp(UdpTransport),
}

impl EndpointConfig {
    /// Create the endpoint. No socket is opened until the first send.
    pub fn open(&self, timeouts: Timeouts) -> Box<dyn Transport> {
        match self {
            EndpointConfig::Tcp(tcp) => Box::new(TcpEndpoint::new(tcp.clone(), timeouts)),
            EndpointConfig::Udp(udp) => Box::new(UdpEndpoint::new(udp.clone(), timeouts.write)),
        }
    }
}

impl fmt::Display for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointConfig::Tcp(tcp) if tcp.tls.is_some() => {
                write!(f, "tcp+tls://{}:{}", tcp.host, tcp.port)
            }
            EndpointConfig::Tcp(tcp) => write!(f, "tcp://{}:{}", tcp.host, tcp.port),
            EndpointConfig::Udp(udp) => write!(f, "udp://{}:{}", udp.host, udp.port),
        }
    }
}

/// Active stream connection state.
pub enum ActiveConnection {
    PlainTcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Write for ActiveConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ActiveConnection::PlainTcp(stream) => stream.write(buf),
            ActiveConnection::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ActiveConnection::PlainTcp(stream) => stream.flush(),
            ActiveConnection::Tls(stream) => stream.flush(),
        }
    }
}

fn connect_tcp(config: &TcpTransport, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in config.socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_nonblocking(false)?;
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{}:{} did not resolve to any address", config.host, config.port),
        )
    }))
}

/// Establish a stream connection, upgrading to TLS when configured.
pub fn connect_transport(config: &TcpTransport, timeouts: Timeouts) -> io::Result<ActiveConnection> {
    let stream = connect_tcp(config, timeouts.connect)?;
    let Some(tls) = &config.tls else {
        stream.set_write_timeout(Some(timeouts.write))?;
        return Ok(ActiveConnection::PlainTcp(stream));
    };
    let connector = tls.connector()?;
    stream.set_read_timeout(Some(timeouts.connect))?;
    stream.set_write_timeout(Some(timeouts.connect))?;
    let stream = connector
        .connect(&tls.domain, stream)
        .map_err(io::Error::other)?;
    let tcp_ref = stream.get_ref();
    tcp_ref.set_read_timeout(None)?;
    tcp_ref.set_write_timeout(Some(timeouts.write))?;
    Ok(ActiveConnection::Tls(Box::new(stream)))
}

/// Write the whole payload, treating a zero-byte write as a broken connection.
pub fn write_frame<W: Write + ?Sized>(stream: &mut W, payload: &[u8]) -> io::Result<()> {
    let mut sent = 0;
    while sent < payload.len() {
        match stream.write(&payload[sent..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "socket connection broken",
                ));
            }
            Ok(n) => sent += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    stream.flush()
}

/// Stream produced by a [`Dialer`].
pub type BoxedStream = Box<dyn Write + Send>;

/// Opens a fresh stream for [`TcpEndpoint`].
pub type Dialer = Box<dyn FnMut() -> io::Result<BoxedStream> + Send>;

/// Persistent TCP (optionally TLS) endpoint.
pub struct TcpEndpoint {
    label: String,
    dial: Dialer,
    stream: Option<BoxedStream>,
    reconnections: u64,
}

impl TcpEndpoint {
    /// Create an endpoint for `config`. Connects lazily.
    pub fn new(config: TcpTransport, timeouts: Timeouts) -> Self {
        let label = EndpointConfig::Tcp(config.clone()).to_string();
        let dial: Dialer = Box::new(move || {
            connect_transport(&config, timeouts).map(|conn| Box::new(conn) as BoxedStream)
        });
        Self::with_dialer(label, dial)
    }

    /// Create an endpoint that opens streams through `dial`.
    pub fn with_dialer(label: impl Into<String>, dial: Dialer) -> Self {
        Self {
            label: label.into(),
            dial,
            stream: None,
            reconnections: 0,
        }
    }

    /// Open the connection now rather than on first send.
    pub fn connect(&mut self) -> Result<(), GelfError> {
        self.ensure_connected().map(|_| ()).map_err(GelfError::from)
    }

    /// Whether a stream is currently held.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Number of reconnect attempts made after failed sends.
    pub fn reconnections(&self) -> u64 {
        self.reconnections
    }

    fn ensure_connected(&mut self) -> io::Result<&mut BoxedStream> {
        if self.stream.is_none() {
            let stream = (self.dial)()?;
            info!("GelfTcpEndpoint connected to {}", self.label);
            self.stream = Some(stream);
        }
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no active connection"))
    }

    fn try_send(&mut self, payload: &[u8]) -> io::Result<()> {
        let stream = self.ensure_connected()?;
        write_frame(stream.as_mut(), payload)
    }
}

impl Transport for TcpEndpoint {
    fn send(&mut self, payload: &[u8]) -> Result<(), GelfError> {
        let Err(err) = self.try_send(payload) else {
            return Ok(());
        };
        debug!(
            "GelfTcpEndpoint send to {} failed: {err}; reconnecting once",
            self.label
        );
        self.close();
        self.reconnections += 1;
        self.try_send(payload).map_err(|retry_err| {
            self.close();
            GelfError::from(retry_err)
        })
    }

    fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.flush();
        }
    }
}

impl fmt::Debug for TcpEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpEndpoint")
            .field("label", &self.label)
            .field("connected", &self.stream.is_some())
            .field("reconnections", &self.reconnections)
            .finish()
    }
}

/// Best-effort UDP endpoint.
#[derive(Debug)]
pub struct UdpEndpoint {
    config: UdpTransport,
    write_timeout: Duration,
    socket: Option<(UdpSocket, SocketAddr)>,
}

impl UdpEndpoint {
    pub fn new(config: UdpTransport, write_timeout: Duration) -> Self {
        Self {
            config,
            write_timeout,
            socket: None,
        }
    }

    fn bind(&self) -> io::Result<(UdpSocket, SocketAddr)> {
        let target = (self.config.host.as_str(), self.config.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!(
                        "{}:{} did not resolve to any address",
                        self.config.host, self.config.port
                    ),
                )
            })?;
        let local: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        socket.set_write_timeout(Some(self.write_timeout))?;
        Ok((socket, target))
    }
}

impl Transport for UdpEndpoint {
    fn send(&mut self, payload: &[u8]) -> Result<(), GelfError> {
        if payload.len() > MAX_UDP_PAYLOAD {
            return Err(GelfError::Connection(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "datagram of {} bytes exceeds the {MAX_UDP_PAYLOAD} byte limit; chunking is not supported",
                    payload.len()
                ),
            )));
        }
        if self.socket.is_none() {
            self.socket = Some(self.bind()?);
        }
        let Some((socket, target)) = self.socket.as_ref() else {
            return Err(GelfError::Connection(io::Error::new(
                io::ErrorKind::NotConnected,
                "udp socket unavailable",
            )));
        };
        let sent = socket.send_to(payload, target)?;
        if sent != payload.len() {
            return Err(GelfError::Connection(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("datagram truncated: sent {sent} of {} bytes", payload.len()),
            )));
        }
        Ok(())
    }

    fn close(&mut self) {
        self.socket = None;
    }
}
