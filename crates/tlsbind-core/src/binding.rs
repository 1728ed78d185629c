//! Session-binding socket factory.
//!
//! `BindingSocketFactory` wraps any `SecureSocketFactory`. Every socket it
//! hands out carries a `HandshakeObserver`, and the observer remembers the
//! session identifier of the first completed handshake. That identifier is
//! what the authentication protocol embeds in its signed payload.
//!
//! A later handshake with a different identifier means the channel under
//! this factory was re-established. That is reported as a warning and
//! counted; the bound identifier keeps its first-seen value.

use std::any::Any;
use std::io;
use std::net::{IpAddr, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::BindError;
use crate::report::Reporter;
use crate::session::{SessionId, SessionRecord};
use crate::socket::{
    BoxedSocket, HandshakeCompleted, HandshakeListener, SecureSocketFactory,
};

// ── Observer ──────────────────────────────────────────────────────────────────

/// Outcome of feeding one handshake observation to the observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Observation {
    /// First handshake seen; the record is now bound.
    Bound,
    /// Same session identifier as the bound record.
    Unchanged,
    /// Different identifier; the bound record was left untouched.
    Mismatch { bound: SessionId, observed: SessionId },
}

/// Reacts to handshake completions on sockets of one factory.
pub struct HandshakeObserver {
    reporter: Arc<dyn Reporter>,
    bound: Mutex<Option<SessionRecord>>,
    handshakes: AtomicU64,
    mismatches: AtomicU64,
}

impl HandshakeObserver {
    fn new(reporter: Arc<dyn Reporter>) -> Self {
        Self {
            reporter,
            bound: Mutex::new(None),
            handshakes: AtomicU64::new(0),
            mismatches: AtomicU64::new(0),
        }
    }

    /// Compare-and-possibly-bind. The whole step runs under one lock so two
    /// handshakes finishing at once cannot both bind.
    pub(crate) fn observe(&self, observed: SessionRecord) -> Observation {
        self.handshakes.fetch_add(1, Ordering::Relaxed);
        let mut bound = self.bound.lock().unwrap_or_else(PoisonError::into_inner);
        match bound.as_ref() {
            None => {
                *bound = Some(observed);
                Observation::Bound
            }
            Some(current) if current.same_session(&observed) => Observation::Unchanged,
            Some(current) => {
                self.mismatches.fetch_add(1, Ordering::Relaxed);
                Observation::Mismatch {
                    bound: current.id().clone(),
                    observed: observed.id().clone(),
                }
            }
        }
    }

    pub fn bound(&self) -> Option<SessionRecord> {
        self.bound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl HandshakeListener for HandshakeObserver {
    fn handshake_completed(&self, event: &HandshakeCompleted) {
        self.reporter.detail(&format!(
            "handshake finished, cipher suite: {}",
            event.cipher_suite()
        ));

        // Reports go out after the lock is released.
        match self.observe(event.record()) {
            Observation::Bound => {
                tracing::debug!(
                    session_id = %event.session_id(),
                    cipher_suite = event.cipher_suite(),
                    "secure session bound"
                );
            }
            Observation::Unchanged => {
                tracing::trace!(session_id = %event.session_id(), "secure session unchanged");
            }
            Observation::Mismatch { bound, observed } => {
                tracing::warn!(
                    bound = %bound,
                    observed = %observed,
                    peer = ?event.peer(),
                    "secure session id mismatch"
                );
                self.reporter.warning(&format!(
                    "handshake finished; session id mismatch! bound {bound}, observed {observed}"
                ));
            }
        }
    }
}

// ── Factory ───────────────────────────────────────────────────────────────────

/// Decorator that attaches a `HandshakeObserver` to every socket it creates.
pub struct BindingSocketFactory {
    inner: Arc<dyn SecureSocketFactory>,
    observer: Arc<HandshakeObserver>,
}

impl BindingSocketFactory {
    pub fn new(reporter: Arc<dyn Reporter>, inner: Arc<dyn SecureSocketFactory>) -> Self {
        reporter.detail(&format!("original secure socket factory: {}", inner.name()));
        Self {
            inner,
            observer: Arc::new(HandshakeObserver::new(reporter)),
        }
    }

    /// The wrapped factory.
    pub fn inner(&self) -> &Arc<dyn SecureSocketFactory> {
        &self.inner
    }

    pub fn observer(&self) -> &Arc<HandshakeObserver> {
        &self.observer
    }

    /// Identifier of the bound session.
    ///
    /// Fails with `BindError::State` until a handshake has completed on a
    /// socket created by this factory.
    pub fn session_id(&self) -> Result<SessionId, BindError> {
        self.session().map(|r| r.id().clone())
    }

    /// The bound session record.
    pub fn session(&self) -> Result<SessionRecord, BindError> {
        self.observer.bound().ok_or(BindError::State)
    }

    /// Completed handshakes seen across all sockets of this factory.
    pub fn handshake_count(&self) -> u64 {
        self.observer.handshakes.load(Ordering::Relaxed)
    }

    /// Handshakes whose session id differed from the bound one.
    pub fn mismatch_count(&self) -> u64 {
        self.observer.mismatches.load(Ordering::Relaxed)
    }

    fn observed(&self, socket: io::Result<BoxedSocket>) -> io::Result<BoxedSocket> {
        // Never ask the socket for its session here: the identifier must
        // come from the handshake completion event.
        let mut socket = socket?;
        socket.add_handshake_listener(self.observer.clone());
        Ok(socket)
    }
}

impl SecureSocketFactory for BindingSocketFactory {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn create_socket(&self) -> io::Result<BoxedSocket> {
        self.observed(self.inner.create_socket())
    }

    fn connect_host(&self, host: &str, port: u16) -> io::Result<BoxedSocket> {
        self.observed(self.inner.connect_host(host, port))
    }

    fn connect_addr(&self, addr: IpAddr, port: u16) -> io::Result<BoxedSocket> {
        self.observed(self.inner.connect_addr(addr, port))
    }

    fn connect_host_from(
        &self,
        host: &str,
        port: u16,
        local_addr: IpAddr,
        local_port: u16,
    ) -> io::Result<BoxedSocket> {
        self.observed(
            self.inner
                .connect_host_from(host, port, local_addr, local_port),
        )
    }

    fn connect_addr_from(
        &self,
        addr: IpAddr,
        port: u16,
        local_addr: IpAddr,
        local_port: u16,
    ) -> io::Result<BoxedSocket> {
        self.observed(
            self.inner
                .connect_addr_from(addr, port, local_addr, local_port),
        )
    }

    fn layer_over(
        &self,
        plain: TcpStream,
        host: &str,
        port: u16,
        auto_close: bool,
    ) -> io::Result<BoxedSocket> {
        self.observed(self.inner.layer_over(plain, host, port, auto_close))
    }

    fn default_cipher_suites(&self) -> Vec<String> {
        self.inner.default_cipher_suites()
    }

    fn supported_cipher_suites(&self) -> Vec<String> {
        self.inner.supported_cipher_suites()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Debug for BindingSocketFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingSocketFactory")
            .field("inner", &self.inner.name())
            .field("bound", &self.observer.bound())
            .finish()
    }
}
