//! tlsbind-rustls — a rustls-backed secure-socket factory for tlsbind.
//!
//! Sockets are blocking `std::net::TcpStream`s with a rustls client
//! connection on top. Each completed handshake is reported to the socket's
//! listeners with the `tls-exporter` channel binding as session identifier.

pub mod config;
pub mod error;
pub mod factory;
mod net;
pub mod socket;

pub use error::TlsError;
pub use factory::RustlsSocketFactory;
pub use socket::{TlsSocket, CHANNEL_BINDING_LABEL, CHANNEL_BINDING_LEN};
