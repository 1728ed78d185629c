use std::sync::Arc;

use tlsbind_core::registry::{self, FactorySlot};
use tlsbind_core::testing::ScriptedFactory;
use tlsbind_core::{BindError, HandshakeCompleted, MemoryReporter};

use crate::*;

fn same<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Full process-wide lifecycle. The only test touching the global slot.
#[test]
fn test_global_install_lifecycle() -> Result<()> {
    let server = spawn_server()?;

    // Nothing configured yet.
    let err = registry::actual_session_id().unwrap_err();
    assert!(err.is_security(), "{err}");

    registry::global().set_default(Arc::new(server.factory()?));
    let err = registry::actual_session_id().unwrap_err();
    match err {
        BindError::Security(name) => assert!(name.contains("RustlsSocketFactory"), "{name}"),
        other => panic!("expected security error, got {other}"),
    }

    let reporter = Arc::new(MemoryReporter::new());
    let installed = registry::install(reporter.clone());
    assert!(same(&installed, &registry::install(reporter.clone())));
    assert!(same(&installed, &registry::default_factory()));
    assert!(registry::global().is_installed());

    assert!(matches!(registry::actual_session_id(), Err(BindError::State)));

    let mut socket = registry::default_factory().connect_host(HOST, server.port())?;
    let server_view = read_line(&mut socket)?;
    socket.close()?;

    assert_eq!(registry::actual_session_id()?.to_string(), server_view);
    assert_eq!(
        reporter.details()[0],
        "original secure socket factory: tlsbind_rustls::factory::RustlsSocketFactory"
    );
    Ok(())
}

/// Replacing an installed binding factory unbinds; installing again wraps
/// the replacement with fresh state.
#[test]
fn test_reinstall_after_replacement() -> Result<()> {
    let server = spawn_server()?;
    let slot = FactorySlot::new(Arc::new(server.factory()?));
    let reporter = Arc::new(MemoryReporter::new());
    slot.install(reporter.clone());

    let mut socket = slot.default_factory().connect_host(HOST, server.port())?;
    read_line(&mut socket)?;
    socket.close()?;
    assert!(slot.actual_session_id().is_ok());

    let scripted = Arc::new(ScriptedFactory::default());
    scripted.push(HandshakeCompleted::new([0xBB, 0x22], "TLS13_AES_256_GCM_SHA384"));
    slot.set_default(scripted.clone());
    assert!(!slot.is_installed());
    assert!(slot.actual_session_id().unwrap_err().is_security());

    slot.install(reporter.clone());
    assert!(matches!(slot.actual_session_id(), Err(BindError::State)));

    let mut socket = slot.default_factory().connect_host(HOST, 443)?;
    socket.start_handshake()?;
    assert_eq!(slot.actual_session_id()?.as_bytes(), &[0xBB, 0x22]);
    assert_eq!(scripted.created(), 1);
    assert!(reporter.warnings().is_empty());
    Ok(())
}
