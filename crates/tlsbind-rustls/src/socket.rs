//! Blocking TLS client socket with handshake-completion notification.
//!
//! The handshake runs on `start_handshake` or on the first read/write.
//! Listeners are notified after the handshake completes and before any
//! application data moves, on the thread that drove the handshake.
//!
//! The session identifier handed to listeners is the `tls-exporter`
//! channel binding (RFC 9266), exported once from the finished handshake.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection};

use tlsbind_core::config::NetworkConfig;
use tlsbind_core::socket::{HandshakeCompleted, HandshakeListener, SecureSocket};

use crate::config::suite_name;
use crate::error::tls_io;
use crate::net;

/// Exporter label for TLS channel bindings.
pub const CHANNEL_BINDING_LABEL: &[u8] = b"EXPORTER-Channel-Binding";

/// Length of the exported channel binding.
pub const CHANNEL_BINDING_LEN: usize = 32;

struct Link {
    conn: ClientConnection,
    tcp: TcpStream,
    peer: SocketAddr,
    /// Shut the TCP stream down on close.
    auto_close: bool,
}

pub struct TlsSocket {
    config: Arc<ClientConfig>,
    network: NetworkConfig,
    link: Option<Link>,
    listeners: Vec<Arc<dyn HandshakeListener>>,
    handshaken: bool,
    /// Set by `close`; a closed socket never connects again.
    closed: bool,
}

impl TlsSocket {
    pub(crate) fn unconnected(config: Arc<ClientConfig>, network: NetworkConfig) -> Self {
        Self {
            config,
            network,
            link: None,
            listeners: Vec::new(),
            handshaken: false,
            closed: false,
        }
    }

    pub(crate) fn over(
        config: Arc<ClientConfig>,
        network: NetworkConfig,
        tcp: TcpStream,
        server_name: ServerName<'static>,
        auto_close: bool,
    ) -> io::Result<Self> {
        let mut socket = Self::unconnected(config, network);
        socket.attach(tcp, server_name, auto_close)?;
        Ok(socket)
    }

    fn attach(
        &mut self,
        tcp: TcpStream,
        server_name: ServerName<'static>,
        auto_close: bool,
    ) -> io::Result<()> {
        let peer = tcp.peer_addr()?;
        tcp.set_read_timeout(self.network.read_timeout())?;
        let conn = ClientConnection::new(self.config.clone(), server_name).map_err(tls_io)?;
        tracing::trace!(%peer, "tls socket attached");
        self.handshaken = false;
        self.link = Some(Link {
            conn,
            tcp,
            peer,
            auto_close,
        });
        Ok(())
    }

    fn link_mut(&mut self) -> io::Result<&mut Link> {
        self.link.as_mut().ok_or_else(not_connected)
    }

    fn ensure_handshake(&mut self) -> io::Result<()> {
        if self.handshaken {
            return Ok(());
        }
        let link = self.link_mut()?;
        while link.conn.is_handshaking() {
            link.conn.complete_io(&mut link.tcp)?;
        }
        let event = completion_event(&link.conn, link.peer)?;
        self.handshaken = true;

        tracing::debug!(
            peer = ?event.peer(),
            cipher_suite = event.cipher_suite(),
            "tls handshake completed"
        );
        for listener in &self.listeners {
            listener.handshake_completed(&event);
        }
        Ok(())
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "tls socket is not connected")
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "tls socket is closed")
}

fn export_channel_binding(conn: &ClientConnection) -> io::Result<[u8; CHANNEL_BINDING_LEN]> {
    conn.export_keying_material([0u8; CHANNEL_BINDING_LEN], CHANNEL_BINDING_LABEL, None)
        .map_err(tls_io)
}

fn completion_event(conn: &ClientConnection, peer: SocketAddr) -> io::Result<HandshakeCompleted> {
    let cipher_suite = conn
        .negotiated_cipher_suite()
        .map(suite_name)
        .unwrap_or_else(|| "unknown".to_string());
    let binding = export_channel_binding(conn)?;
    Ok(HandshakeCompleted::new(binding, cipher_suite).with_peer(peer))
}

impl Read for TlsSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.ensure_handshake()?;
        let link = self.link_mut()?;
        rustls::Stream::new(&mut link.conn, &mut link.tcp).read(buf)
    }
}

impl Write for TlsSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ensure_handshake()?;
        let link = self.link_mut()?;
        rustls::Stream::new(&mut link.conn, &mut link.tcp).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.ensure_handshake()?;
        let link = self.link_mut()?;
        rustls::Stream::new(&mut link.conn, &mut link.tcp).flush()
    }
}

impl SecureSocket for TlsSocket {
    fn add_handshake_listener(&mut self, listener: Arc<dyn HandshakeListener>) {
        self.listeners.push(listener);
    }

    fn connect(&mut self, host: &str, port: u16) -> io::Result<()> {
        if self.closed {
            return Err(closed());
        }
        if self.link.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "tls socket already connected",
            ));
        }
        let server_name = net::server_name(host)?;
        let tcp = net::connect_host(host, port, None, &self.network)?;
        self.attach(tcp, server_name, true)
    }

    fn start_handshake(&mut self) -> io::Result<()> {
        self.ensure_handshake()
    }

    fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.link.as_ref().map(|l| l.peer).ok_or_else(not_connected)
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        let Some(mut link) = self.link.take() else {
            return Ok(());
        };
        link.conn.send_close_notify();
        while link.conn.wants_write() {
            link.conn.write_tls(&mut link.tcp)?;
        }
        if link.auto_close {
            link.tcp.shutdown(Shutdown::Both)?;
        }
        Ok(())
    }
}
