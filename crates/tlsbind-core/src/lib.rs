//! tlsbind-core — binds an authentication protocol to the TLS session it
//! actually runs over.
//!
//! The pieces, leaf first:
//!   - `session`  — immutable session records
//!   - `socket`   — the secure-socket capability being decorated
//!   - `binding`  — the binding factory and its handshake observer
//!   - `registry` — the process default factory slot and install-once logic
//!
//! The underlying TLS implementation lives elsewhere (see `tlsbind-rustls`).

pub mod binding;
pub mod config;
pub mod error;
pub mod registry;
pub mod report;
pub mod session;
pub mod socket;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use binding::{BindingSocketFactory, HandshakeObserver};
pub use error::BindError;
pub use registry::FactorySlot;
pub use report::{MemoryReporter, Reporter, TracingReporter};
pub use session::{SessionId, SessionRecord};
pub use socket::{
    BoxedSocket, HandshakeCompleted, HandshakeListener, SecureSocket, SecureSocketFactory,
};
