use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, TcpStream};
use std::sync::Arc;

use tlsbind_core::registry::FactorySlot;
use tlsbind_core::{BindError, MemoryReporter};

use crate::*;

fn installed(server: &TestServer) -> Result<(FactorySlot, Arc<MemoryReporter>)> {
    let slot = FactorySlot::new(Arc::new(server.factory()?));
    let reporter = Arc::new(MemoryReporter::new());
    slot.install(reporter.clone());
    Ok((slot, reporter))
}

/// The bound id is the channel binding the server computed for the same
/// connection.
#[test]
fn test_bound_id_matches_server() -> Result<()> {
    let server = spawn_server()?;
    let (slot, reporter) = installed(&server)?;

    let mut socket = slot.default_factory().connect_host(HOST, server.port())?;
    let server_view = read_line(&mut socket)?;
    socket.close()?;

    let record = slot.actual_session()?;
    assert_eq!(record.id().to_string(), server_view);
    assert_eq!(record.id().len(), CHANNEL_BINDING_LEN);
    assert!(record.cipher_suite().starts_with("TLS"));

    let details = reporter.details();
    assert!(
        details
            .iter()
            .any(|d| d == &format!("handshake finished, cipher suite: {}", record.cipher_suite())),
        "details: {details:?}"
    );
    assert!(reporter.warnings().is_empty());
    Ok(())
}

/// A second connection negotiates fresh keys; it is flagged and the first
/// binding is kept.
#[test]
fn test_second_connection_is_flagged() -> Result<()> {
    let server = spawn_server()?;
    let (slot, reporter) = installed(&server)?;
    let factory = slot.default_factory();

    let mut first = factory.connect_host(HOST, server.port())?;
    let first_view = read_line(&mut first)?;
    first.close()?;

    let mut second = factory.connect_host(HOST, server.port())?;
    let second_view = read_line(&mut second)?;
    second.close()?;

    assert_ne!(first_view, second_view);
    assert_eq!(slot.actual_session_id()?.to_string(), first_view);

    let warnings = reporter.warnings();
    assert_eq!(warnings.len(), 1, "warnings: {warnings:?}");
    assert!(warnings[0].contains("session id mismatch"));
    assert!(warnings[0].contains(&first_view));
    assert!(warnings[0].contains(&second_view));

    let (handshakes, mismatches) = slot.with_binding(|b| (b.handshake_count(), b.mismatch_count()))?;
    assert_eq!(handshakes, 2);
    assert_eq!(mismatches, 1);
    Ok(())
}

#[test]
fn test_layer_over_keeps_plain_stream_open() -> Result<()> {
    let server = spawn_server()?;
    let (slot, _reporter) = installed(&server)?;

    let plain = TcpStream::connect(server.addr)?;
    let handle = plain.try_clone()?;

    let mut socket = slot
        .default_factory()
        .layer_over(plain, HOST, server.port(), false)?;
    let server_view = read_line(&mut socket)?;
    socket.close()?;

    assert_eq!(slot.actual_session_id()?.to_string(), server_view);
    // The TCP connection outlives the TLS layer.
    assert_eq!(handle.peer_addr()?, server.addr);
    Ok(())
}

#[test]
fn test_local_bind_and_address_variants() -> Result<()> {
    let server = spawn_server()?;
    let (slot, reporter) = installed(&server)?;
    let factory = slot.default_factory();
    let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);

    let mut socket = factory.connect_host_from(HOST, server.port(), loopback, 0)?;
    let server_view = read_line(&mut socket)?;
    socket.close()?;

    let mut socket = factory.connect_addr(loopback, server.port())?;
    read_line(&mut socket)?;
    socket.close()?;

    let mut socket = factory.connect_addr_from(loopback, server.port(), loopback, 0)?;
    read_line(&mut socket)?;
    socket.close()?;

    assert_eq!(slot.actual_session_id()?.to_string(), server_view);
    assert_eq!(reporter.warnings().len(), 2);
    Ok(())
}

#[test]
fn test_unconnected_socket_connects_later() -> Result<()> {
    let server = spawn_server()?;
    let (slot, _reporter) = installed(&server)?;

    let mut socket = slot.default_factory().create_socket()?;
    assert!(!socket.is_connected());
    socket.connect(HOST, server.port())?;
    socket.start_handshake()?;

    // Bound as soon as the handshake finishes, before any data is read.
    let bound = slot.actual_session_id()?;
    let server_view = read_line(&mut socket)?;
    socket.close()?;

    assert_eq!(bound.to_string(), server_view);
    Ok(())
}

/// A closed socket stays closed; any further session must come from a new
/// socket, where the observer sees it.
#[test]
fn test_closed_socket_cannot_reconnect() -> Result<()> {
    let server = spawn_server()?;
    let (slot, reporter) = installed(&server)?;
    let factory = slot.default_factory();

    let mut socket = factory.create_socket()?;
    socket.connect(HOST, server.port())?;
    let first_view = read_line(&mut socket)?;
    socket.close()?;

    let err = socket.connect(HOST, server.port()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConnected);
    let err = read_line(&mut socket).unwrap_err();
    assert!(format!("{err:#}").contains("not connected"), "{err:#}");

    let mut fresh = factory.create_socket()?;
    fresh.connect(HOST, server.port())?;
    let second_view = read_line(&mut fresh)?;
    fresh.close()?;

    let (handshakes, mismatches) = slot.with_binding(|b| (b.handshake_count(), b.mismatch_count()))?;
    assert_eq!(handshakes, 2);
    assert_eq!(mismatches, 1);
    assert_eq!(slot.actual_session_id()?.to_string(), first_view);
    assert!(reporter.warnings()[0].contains(&second_view));
    Ok(())
}

/// A handshake that fails certificate validation binds nothing.
#[test]
fn test_untrusted_server_binds_nothing() -> Result<()> {
    let server = spawn_server()?;
    let mut config = server.client_config();
    config.tls.ca_file = None;

    let slot = FactorySlot::new(Arc::new(RustlsSocketFactory::from_config(&config)?));
    let reporter = Arc::new(MemoryReporter::new());
    slot.install(reporter.clone());

    let mut socket = slot.default_factory().connect_host(HOST, server.port())?;
    let err = socket.start_handshake().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);

    assert!(matches!(slot.actual_session_id(), Err(BindError::State)));
    assert!(reporter.warnings().is_empty());
    Ok(())
}
