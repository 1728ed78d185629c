//! Session records — what a completed handshake tells us about the channel.
//!
//! A `SessionRecord` is an immutable snapshot taken from a handshake
//! completion event. It is never built from a live session query: on some
//! transport stacks asking for "the current session" can itself start a
//! renegotiation, which is exactly the change we are trying to detect.

use std::fmt;

use subtle::ConstantTimeEq;

/// Opaque transport-layer session identifier.
///
/// Length and encoding belong to the underlying secure-socket
/// implementation. Equality always scans the full value.
#[derive(Clone, Hash)]
pub struct SessionId(Box<[u8]>);

impl SessionId {
    pub fn new(bytes: impl Into<Box<[u8]>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for SessionId {
    fn eq(&self, other: &Self) -> bool {
        // ct_eq is false on length mismatch and otherwise compares every byte.
        bool::from(self.0[..].ct_eq(&other.0[..]))
    }
}

impl Eq for SessionId {}

impl From<Vec<u8>> for SessionId {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into_boxed_slice())
    }
}

impl From<&[u8]> for SessionId {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }
}

impl<const N: usize> From<[u8; N]> for SessionId {
    fn from(bytes: [u8; N]) -> Self {
        Self(Box::new(bytes))
    }
}

impl AsRef<[u8]> for SessionId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::LowerHex for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(self, f)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({self})")
    }
}

/// Immutable snapshot of a negotiated secure session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    id: SessionId,
    cipher_suite: String,
}

impl SessionRecord {
    pub fn new(id: impl Into<SessionId>, cipher_suite: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cipher_suite: cipher_suite.into(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Negotiated cipher suite name. Informational only.
    pub fn cipher_suite(&self) -> &str {
        &self.cipher_suite
    }

    /// True when `other` carries the same session identifier.
    /// The cipher suite does not take part in the comparison.
    pub fn same_session(&self, other: &SessionRecord) -> bool {
        self.id == other.id
    }
}
