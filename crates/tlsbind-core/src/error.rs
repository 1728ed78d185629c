//! Errors raised by the binding layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BindError {
    /// No handshake has completed on any socket of the factory yet.
    #[error("secure session identifier unknown: no handshake has completed")]
    State,

    /// The process default factory is not a binding factory, so the
    /// session binding cannot be verified.
    #[error("wrong secure socket factory installed: {0}")]
    Security(String),
}

impl BindError {
    pub fn is_state(&self) -> bool {
        matches!(self, BindError::State)
    }

    pub fn is_security(&self) -> bool {
        matches!(self, BindError::Security(_))
    }
}
