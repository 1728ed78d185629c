//! rustls client configuration from `TlsConfig`.

use std::path::Path;
use std::sync::Arc;

use rustls::crypto::ring;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::CertificateDer;
use rustls::{ClientConfig, RootCertStore, SupportedCipherSuite, SupportedProtocolVersion};
use rustls_pemfile::certs;

use tlsbind_core::config::TlsConfig;

use crate::error::TlsError;

/// Canonical name of a cipher suite, e.g. `TLS13_AES_128_GCM_SHA256`.
pub fn suite_name(suite: SupportedCipherSuite) -> String {
    format!("{:?}", suite.suite())
}

pub(crate) fn resolve_versions(
    min_version: &str,
) -> Result<Vec<&'static SupportedProtocolVersion>, TlsError> {
    match min_version.trim() {
        "1.2" | "1.2+" => Ok(vec![&rustls::version::TLS13, &rustls::version::TLS12]),
        "1.3" | "1.3+" => Ok(vec![&rustls::version::TLS13]),
        other => Err(TlsError::InvalidMinVersion(other.to_string())),
    }
}

/// The ring provider, with its cipher suites narrowed to `allow` when the
/// list is not empty. Names match case-insensitively.
pub(crate) fn build_provider(allow: &[String]) -> Result<CryptoProvider, TlsError> {
    let mut provider = ring::default_provider();
    if allow.is_empty() {
        return Ok(provider);
    }
    provider.cipher_suites = ring::ALL_CIPHER_SUITES
        .iter()
        .copied()
        .filter(|suite| {
            let name = suite_name(*suite);
            allow.iter().any(|wanted| wanted.eq_ignore_ascii_case(&name))
        })
        .collect();
    if provider.cipher_suites.is_empty() {
        return Err(TlsError::NoCipherSuites(allow.to_vec()));
    }
    Ok(provider)
}

pub(crate) fn load_cert_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = std::io::BufReader::new(
        std::fs::File::open(path).map_err(|e| TlsError::io(path, e))?,
    );
    let chain = certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::io(path, e))?;
    if chain.is_empty() {
        return Err(TlsError::EmptyCaFile(path.display().to_string()));
    }
    Ok(chain)
}

/// Trusted roots: the PEM bundle when given, otherwise the web PKI set.
pub(crate) fn load_roots(ca_file: Option<&Path>) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    match ca_file {
        Some(path) => {
            let (added, ignored) = roots.add_parsable_certificates(load_cert_chain(path)?);
            if added == 0 {
                return Err(TlsError::EmptyCaFile(path.display().to_string()));
            }
            if ignored > 0 {
                tracing::warn!(path = %path.display(), ignored, "skipped unparsable CA certificates");
            }
        }
        None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }
    Ok(roots)
}

pub fn build_client_config(tls: &TlsConfig) -> Result<ClientConfig, TlsError> {
    let versions = resolve_versions(&tls.min_version)?;
    let provider = build_provider(&tls.cipher_suites)?;
    let roots = load_roots(tls.ca_file.as_deref())?;

    let mut config = ClientConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(&versions)?
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = tls.alpn.iter().map(|p| p.as_bytes().to_vec()).collect();
    // tls-exporter is only defined for TLS 1.2 with extended master secret
    // (RFC 9266); TLS 1.3 is unaffected.
    config.require_ems = true;
    Ok(config)
}
