//! tlsbind integration test harness.
//!
//! Tests run against an in-process rustls server on 127.0.0.1 with a
//! freshly generated self-signed certificate. The server answers every
//! connection with its own view of the channel binding, one hex line,
//! so the client-side bound id can be checked against the peer.
//!
//!   cargo test --test integration

use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use rcgen::{generate_simple_self_signed, CertifiedKey};
use rustls::crypto::ring;
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ServerConfig, ServerConnection};

use tlsbind_core::config::TlsbindConfig;
use tlsbind_core::BoxedSocket;
use tlsbind_rustls::{RustlsSocketFactory, CHANNEL_BINDING_LABEL, CHANNEL_BINDING_LEN};

mod binding;
mod registry;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Hostname covered by the test certificate.
pub const HOST: &str = "localhost";

/// A TLS server accepting connections until the test process exits.
pub struct TestServer {
    pub addr: SocketAddr,
    ca_file: PathBuf,
}

impl TestServer {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Client configuration trusting only this server's certificate.
    pub fn client_config(&self) -> TlsbindConfig {
        let mut config = TlsbindConfig::default();
        config.tls.ca_file = Some(self.ca_file.clone());
        config.network.connect_timeout_ms = 5_000;
        config.network.read_timeout_ms = 5_000;
        config
    }

    pub fn factory(&self) -> Result<RustlsSocketFactory> {
        RustlsSocketFactory::from_config(&self.client_config())
            .context("failed to build client factory")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.ca_file);
    }
}

fn temp_path(name: &str) -> PathBuf {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    std::env::temp_dir().join(format!(
        "tlsbind-it-{}-{}-{name}",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::SeqCst)
    ))
}

/// Start a server with a new self-signed certificate for localhost and
/// 127.0.0.1, writing the certificate out as the client's CA file.
pub fn spawn_server() -> Result<TestServer> {
    let CertifiedKey { cert, key_pair } =
        generate_simple_self_signed(vec![HOST.to_string(), "127.0.0.1".to_string()])
            .context("failed to generate certificate")?;

    let ca_file = temp_path("ca.pem");
    std::fs::write(&ca_file, cert.pem())
        .with_context(|| format!("failed to write {}", ca_file.display()))?;

    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
    let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(vec![cert.der().clone()], key)?;
    let config = Arc::new(config);

    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    let addr = listener.local_addr()?;

    thread::spawn(move || {
        for tcp in listener.incoming() {
            let Ok(tcp) = tcp else { break };
            let config = config.clone();
            thread::spawn(move || {
                if let Err(e) = serve(config, tcp) {
                    eprintln!("test server: {e:#}");
                }
            });
        }
    });

    Ok(TestServer { addr, ca_file })
}

fn serve(config: Arc<ServerConfig>, mut tcp: TcpStream) -> Result<()> {
    tcp.set_read_timeout(Some(Duration::from_secs(10)))?;
    let mut conn = ServerConnection::new(config)?;
    while conn.is_handshaking() {
        conn.complete_io(&mut tcp)?;
    }

    let binding =
        conn.export_keying_material([0u8; CHANNEL_BINDING_LEN], CHANNEL_BINDING_LABEL, None)?;
    {
        let mut stream = rustls::Stream::new(&mut conn, &mut tcp);
        writeln!(stream, "{}", hex::encode(binding))?;
        stream.flush()?;
    }

    conn.send_close_notify();
    while conn.wants_write() {
        conn.write_tls(&mut tcp)?;
    }
    // Hold the connection until the client lets go.
    let mut rest = Vec::new();
    let _ = tcp.read_to_end(&mut rest);
    Ok(())
}

/// Read one newline-terminated line from a secure socket.
pub fn read_line(socket: &mut BoxedSocket) -> Result<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = socket.read(&mut byte).context("read failed")?;
        if n == 0 || byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
    }
    String::from_utf8(line).context("server sent invalid UTF-8")
}
