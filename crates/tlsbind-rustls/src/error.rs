use std::io;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("no certificates found in {0}")]
    EmptyCaFile(String),
    #[error("invalid minimum TLS version {0:?} (expected \"1.2\" or \"1.3\")")]
    InvalidMinVersion(String),
    #[error("no supported cipher suite matches {0:?}")]
    NoCipherSuites(Vec<String>),
    #[error("tls configuration rejected: {0}")]
    Rustls(#[from] rustls::Error),
}

impl TlsError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// rustls failures surface through the socket API as `io::Error`.
pub(crate) fn tls_io(err: rustls::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}
