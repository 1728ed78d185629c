//! Secure-socket capability — the surface the binding layer decorates.
//!
//! An underlying TLS implementation plugs in by implementing
//! `SecureSocketFactory` and handing out `SecureSocket`s that accept
//! handshake listeners. The binding layer needs nothing else from it.

use std::any::Any;
use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::sync::Arc;

use crate::session::{SessionId, SessionRecord};

// ── Handshake events ──────────────────────────────────────────────────────────

/// Delivered by the secure-socket implementation when a handshake finishes.
///
/// Carries the session identifier and cipher suite as they were negotiated
/// by that handshake. This is the only trusted source of the identifier.
#[derive(Debug, Clone)]
pub struct HandshakeCompleted {
    session_id: SessionId,
    cipher_suite: String,
    peer: Option<SocketAddr>,
}

impl HandshakeCompleted {
    pub fn new(session_id: impl Into<SessionId>, cipher_suite: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            cipher_suite: cipher_suite.into(),
            peer: None,
        }
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn cipher_suite(&self) -> &str {
        &self.cipher_suite
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Snapshot of the negotiated session.
    pub fn record(&self) -> SessionRecord {
        SessionRecord::new(self.session_id.clone(), self.cipher_suite.clone())
    }
}

/// Receives handshake completion notifications.
///
/// Called on whatever thread drives the handshake, before the socket
/// carries any application data.
pub trait HandshakeListener: Send + Sync {
    fn handshake_completed(&self, event: &HandshakeCompleted);
}

// ── Sockets ───────────────────────────────────────────────────────────────────

/// A client-side secure socket.
///
/// Reads and writes drive the handshake on first use when
/// `start_handshake` was not called explicitly.
pub trait SecureSocket: Read + Write + Send {
    /// Register a listener for every handshake completed on this socket.
    fn add_handshake_listener(&mut self, listener: Arc<dyn HandshakeListener>);

    /// Connect an unconnected socket. Fails on a connected one.
    fn connect(&mut self, host: &str, port: u16) -> io::Result<()>;

    /// Run the handshake now instead of on first read/write.
    fn start_handshake(&mut self) -> io::Result<()>;

    fn is_connected(&self) -> bool;

    fn peer_addr(&self) -> io::Result<SocketAddr>;

    /// Send close_notify. The underlying TCP stream is shut down only when
    /// the socket owns it (always, except for layered sockets created with
    /// `auto_close = false`).
    fn close(&mut self) -> io::Result<()>;
}

pub type BoxedSocket = Box<dyn SecureSocket>;

// ── Factories ─────────────────────────────────────────────────────────────────

/// Socket construction surface of a secure-socket implementation.
pub trait SecureSocketFactory: Send + Sync + 'static {
    /// Implementation name, used in diagnostics.
    fn name(&self) -> &str;

    /// An unconnected socket; connect it with `SecureSocket::connect`.
    fn create_socket(&self) -> io::Result<BoxedSocket>;

    fn connect_host(&self, host: &str, port: u16) -> io::Result<BoxedSocket>;

    fn connect_addr(&self, addr: IpAddr, port: u16) -> io::Result<BoxedSocket>;

    fn connect_host_from(
        &self,
        host: &str,
        port: u16,
        local_addr: IpAddr,
        local_port: u16,
    ) -> io::Result<BoxedSocket>;

    fn connect_addr_from(
        &self,
        addr: IpAddr,
        port: u16,
        local_addr: IpAddr,
        local_port: u16,
    ) -> io::Result<BoxedSocket>;

    /// Layer TLS over an already connected plain socket.
    fn layer_over(
        &self,
        plain: TcpStream,
        host: &str,
        port: u16,
        auto_close: bool,
    ) -> io::Result<BoxedSocket>;

    fn default_cipher_suites(&self) -> Vec<String>;

    fn supported_cipher_suites(&self) -> Vec<String>;

    /// Concrete-type access for the process registry.
    fn as_any(&self) -> &dyn Any;
}

// ── Unconfigured ──────────────────────────────────────────────────────────────

/// Placeholder occupying the process slot before a real implementation is
/// configured. Every construction fails.
#[derive(Debug, Default)]
pub struct UnconfiguredFactory;

impl UnconfiguredFactory {
    fn unavailable<T>() -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "no secure socket implementation configured",
        ))
    }
}

impl SecureSocketFactory for UnconfiguredFactory {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn create_socket(&self) -> io::Result<BoxedSocket> {
        Self::unavailable()
    }

    fn connect_host(&self, _host: &str, _port: u16) -> io::Result<BoxedSocket> {
        Self::unavailable()
    }

    fn connect_addr(&self, _addr: IpAddr, _port: u16) -> io::Result<BoxedSocket> {
        Self::unavailable()
    }

    fn connect_host_from(
        &self,
        _host: &str,
        _port: u16,
        _local_addr: IpAddr,
        _local_port: u16,
    ) -> io::Result<BoxedSocket> {
        Self::unavailable()
    }

    fn connect_addr_from(
        &self,
        _addr: IpAddr,
        _port: u16,
        _local_addr: IpAddr,
        _local_port: u16,
    ) -> io::Result<BoxedSocket> {
        Self::unavailable()
    }

    fn layer_over(
        &self,
        _plain: TcpStream,
        _host: &str,
        _port: u16,
        _auto_close: bool,
    ) -> io::Result<BoxedSocket> {
        Self::unavailable()
    }

    fn default_cipher_suites(&self) -> Vec<String> {
        Vec::new()
    }

    fn supported_cipher_suites(&self) -> Vec<String> {
        Vec::new()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
