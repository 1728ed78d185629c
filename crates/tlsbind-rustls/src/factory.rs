//! `SecureSocketFactory` over rustls and blocking std sockets.

use std::any::Any;
use std::io;
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::sync::Arc;

use rustls::crypto::ring;
use rustls::ClientConfig;

use tlsbind_core::config::{NetworkConfig, TlsbindConfig};
use tlsbind_core::socket::{BoxedSocket, SecureSocketFactory};

use crate::config::{build_client_config, suite_name};
use crate::error::TlsError;
use crate::net;
use crate::socket::TlsSocket;

pub struct RustlsSocketFactory {
    config: Arc<ClientConfig>,
    network: NetworkConfig,
}

impl RustlsSocketFactory {
    pub fn from_config(config: &TlsbindConfig) -> Result<Self, TlsError> {
        let client = build_client_config(&config.tls)?;
        tracing::debug!(
            min_version = %config.tls.min_version,
            suites = client.crypto_provider().cipher_suites.len(),
            "rustls client config built"
        );
        Ok(Self::with_client_config(
            Arc::new(client),
            config.network.clone(),
        ))
    }

    pub fn with_client_config(config: Arc<ClientConfig>, network: NetworkConfig) -> Self {
        Self { config, network }
    }

    pub fn client_config(&self) -> &Arc<ClientConfig> {
        &self.config
    }

    fn socket(&self, tcp: TcpStream, host: &str, auto_close: bool) -> io::Result<BoxedSocket> {
        let server_name = net::server_name(host)?;
        Ok(Box::new(TlsSocket::over(
            self.config.clone(),
            self.network.clone(),
            tcp,
            server_name,
            auto_close,
        )?))
    }

    fn ip_socket(&self, tcp: TcpStream, addr: IpAddr) -> io::Result<BoxedSocket> {
        Ok(Box::new(TlsSocket::over(
            self.config.clone(),
            self.network.clone(),
            tcp,
            net::ip_server_name(addr),
            true,
        )?))
    }
}

impl SecureSocketFactory for RustlsSocketFactory {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn create_socket(&self) -> io::Result<BoxedSocket> {
        Ok(Box::new(TlsSocket::unconnected(
            self.config.clone(),
            self.network.clone(),
        )))
    }

    fn connect_host(&self, host: &str, port: u16) -> io::Result<BoxedSocket> {
        // Validate the name before opening a connection.
        net::server_name(host)?;
        let tcp = net::connect_host(host, port, None, &self.network)?;
        self.socket(tcp, host, true)
    }

    fn connect_addr(&self, addr: IpAddr, port: u16) -> io::Result<BoxedSocket> {
        let tcp = net::connect_addr(SocketAddr::new(addr, port), None, &self.network)?;
        self.ip_socket(tcp, addr)
    }

    fn connect_host_from(
        &self,
        host: &str,
        port: u16,
        local_addr: IpAddr,
        local_port: u16,
    ) -> io::Result<BoxedSocket> {
        net::server_name(host)?;
        let local = SocketAddr::new(local_addr, local_port);
        let tcp = net::connect_host(host, port, Some(local), &self.network)?;
        self.socket(tcp, host, true)
    }

    fn connect_addr_from(
        &self,
        addr: IpAddr,
        port: u16,
        local_addr: IpAddr,
        local_port: u16,
    ) -> io::Result<BoxedSocket> {
        let local = SocketAddr::new(local_addr, local_port);
        let tcp = net::connect_addr(SocketAddr::new(addr, port), Some(local), &self.network)?;
        self.ip_socket(tcp, addr)
    }

    fn layer_over(
        &self,
        plain: TcpStream,
        host: &str,
        _port: u16,
        auto_close: bool,
    ) -> io::Result<BoxedSocket> {
        self.socket(plain, host, auto_close)
    }

    fn default_cipher_suites(&self) -> Vec<String> {
        self.config
            .crypto_provider()
            .cipher_suites
            .iter()
            .map(|s| suite_name(*s))
            .collect()
    }

    fn supported_cipher_suites(&self) -> Vec<String> {
        ring::ALL_CIPHER_SUITES
            .iter()
            .map(|s| suite_name(*s))
            .collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
