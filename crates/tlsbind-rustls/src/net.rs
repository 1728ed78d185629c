//! TCP connection setup, with optional local bind and connect timeout.

use std::io;
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};

use rustls::pki_types::ServerName;
use socket2::{Domain, Protocol, Socket, Type};

use tlsbind_core::config::NetworkConfig;

pub(crate) fn server_name(host: &str) -> io::Result<ServerName<'static>> {
    ServerName::try_from(host.to_string())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("{host}: {e}")))
}

pub(crate) fn ip_server_name(addr: IpAddr) -> ServerName<'static> {
    ServerName::IpAddress(addr.into())
}

/// Resolve `host` and connect to the first address that accepts.
pub(crate) fn connect_host(
    host: &str,
    port: u16,
    local: Option<SocketAddr>,
    network: &NetworkConfig,
) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in (host, port).to_socket_addrs()? {
        match connect_addr(addr, local, network) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::trace!(%addr, error = %e, "connect attempt failed");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses found for {host}:{port}"),
        )
    }))
}

pub(crate) fn connect_addr(
    addr: SocketAddr,
    local: Option<SocketAddr>,
    network: &NetworkConfig,
) -> io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    if let Some(local) = local {
        if local.is_ipv4() != addr.is_ipv4() {
            return Err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("local address {local} cannot reach {addr}"),
            ));
        }
        socket.bind(&local.into())?;
    }
    match network.connect_timeout() {
        Some(timeout) => socket.connect_timeout(&addr.into(), timeout)?,
        None => socket.connect(&addr.into())?,
    }
    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, TcpListener};

    #[test]
    fn server_name_accepts_dns_and_ip() {
        assert!(server_name("bank.example").is_ok());
        assert!(server_name("127.0.0.1").is_ok());
        let err = server_name("bad host").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn connect_with_local_bind() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let target = listener.local_addr().unwrap();
        let local = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);

        let stream = connect_addr(target, Some(local), &NetworkConfig::default()).unwrap();
        assert_eq!(stream.peer_addr().unwrap(), target);
        assert!(stream.local_addr().unwrap().ip().is_loopback());
    }

    #[test]
    fn mismatched_local_family_is_rejected() {
        let target: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let local: SocketAddr = "[::1]:0".parse().unwrap();
        let err = connect_addr(target, Some(local), &NetworkConfig::default()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AddrNotAvailable);
    }

    #[test]
    fn connect_host_resolves_localhost() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let stream = connect_host("127.0.0.1", port, None, &NetworkConfig::default()).unwrap();
        assert_eq!(stream.peer_addr().unwrap().port(), port);
    }
}
