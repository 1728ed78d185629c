//! Scripted secure-socket factory for exercising the binding layer without
//! a network.
//!
//! Each socket takes the next handshake event from the script when it is
//! created and delivers it to its listeners when the handshake runs,
//! either explicitly or on first read/write.

use std::any::Any;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::socket::{
    BoxedSocket, HandshakeCompleted, HandshakeListener, SecureSocket, SecureSocketFactory,
};

pub const SCRIPTED_CIPHER_SUITES: &[&str] = &[
    "TLS13_AES_128_GCM_SHA256",
    "TLS13_AES_256_GCM_SHA384",
    "TLS13_CHACHA20_POLY1305_SHA256",
];

#[derive(Default)]
pub struct ScriptedFactory {
    script: Mutex<VecDeque<HandshakeCompleted>>,
    failure: Mutex<Option<String>>,
    created: AtomicUsize,
}

impl ScriptedFactory {
    pub fn new(script: impl IntoIterator<Item = HandshakeCompleted>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Append a handshake event for the next socket created.
    pub fn push(&self, event: HandshakeCompleted) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(event);
    }

    /// Make the next construction fail with `ConnectionRefused`.
    pub fn fail_next(&self, message: &str) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.to_string());
    }

    /// Sockets successfully created so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    fn make(&self, peer: Option<SocketAddr>) -> io::Result<BoxedSocket> {
        if let Some(message) = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, message));
        }
        let pending = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSocket {
            peer,
            pending,
            listeners: Vec::new(),
            handshaken: false,
            closed: false,
        }))
    }
}

fn scripted_peer(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)), port)
}

impl SecureSocketFactory for ScriptedFactory {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn create_socket(&self) -> io::Result<BoxedSocket> {
        self.make(None)
    }

    fn connect_host(&self, _host: &str, port: u16) -> io::Result<BoxedSocket> {
        self.make(Some(scripted_peer(port)))
    }

    fn connect_addr(&self, addr: IpAddr, port: u16) -> io::Result<BoxedSocket> {
        self.make(Some(SocketAddr::new(addr, port)))
    }

    fn connect_host_from(
        &self,
        _host: &str,
        port: u16,
        _local_addr: IpAddr,
        _local_port: u16,
    ) -> io::Result<BoxedSocket> {
        self.make(Some(scripted_peer(port)))
    }

    fn connect_addr_from(
        &self,
        addr: IpAddr,
        port: u16,
        _local_addr: IpAddr,
        _local_port: u16,
    ) -> io::Result<BoxedSocket> {
        self.make(Some(SocketAddr::new(addr, port)))
    }

    fn layer_over(
        &self,
        plain: TcpStream,
        _host: &str,
        port: u16,
        _auto_close: bool,
    ) -> io::Result<BoxedSocket> {
        let peer = plain.peer_addr().unwrap_or_else(|_| scripted_peer(port));
        self.make(Some(peer))
    }

    fn default_cipher_suites(&self) -> Vec<String> {
        SCRIPTED_CIPHER_SUITES[..2].iter().map(|s| s.to_string()).collect()
    }

    fn supported_cipher_suites(&self) -> Vec<String> {
        SCRIPTED_CIPHER_SUITES.iter().map(|s| s.to_string()).collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct ScriptedSocket {
    peer: Option<SocketAddr>,
    pending: Option<HandshakeCompleted>,
    listeners: Vec<Arc<dyn HandshakeListener>>,
    handshaken: bool,
    closed: bool,
}

impl ScriptedSocket {
    fn ensure_handshake(&mut self) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "socket closed"));
        }
        if self.handshaken {
            return Ok(());
        }
        let peer = self.peer.ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "scripted socket not connected")
        })?;
        let event = self.pending.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::ConnectionAborted, "no scripted handshake left")
        })?;
        let event = event.with_peer(peer);
        self.handshaken = true;
        for listener in &self.listeners {
            listener.handshake_completed(&event);
        }
        Ok(())
    }
}

impl Read for ScriptedSocket {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        self.ensure_handshake()?;
        Ok(0)
    }
}

impl Write for ScriptedSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ensure_handshake()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SecureSocket for ScriptedSocket {
    fn add_handshake_listener(&mut self, listener: Arc<dyn HandshakeListener>) {
        self.listeners.push(listener);
    }

    fn connect(&mut self, _host: &str, port: u16) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "socket closed"));
        }
        if self.peer.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "socket already connected",
            ));
        }
        self.peer = Some(scripted_peer(port));
        Ok(())
    }

    fn start_handshake(&mut self) -> io::Result<()> {
        self.ensure_handshake()
    }

    fn is_connected(&self) -> bool {
        self.peer.is_some()
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.peer
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "not connected"))
    }

    fn close(&mut self) -> io::Result<()> {
        self.peer = None;
        self.closed = true;
        Ok(())
    }
}
