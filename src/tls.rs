//! Convenience TLS config builders for `wss://` listeners/dialers.
//!
//! The connection engine and handshake modules only need an
//! `Arc<rustls::ServerConfig>`/`Arc<rustls::ClientConfig>` — how a caller
//! obtains one is their business. These two helpers cover the common cases
//! (load a cert/key pair from disk; trust the public Web PKI roots) so a
//! caller doesn't have to hand-roll `rustls_pemfile` plumbing to get
//! `wss://` working.

use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls;

use crate::error::{Error, Result};

/// Build a server TLS config from a PEM certificate chain and private key
/// on disk.
pub fn load_server_config(cert_path: &Path, key_path: &Path) -> Result<Arc<rustls::ServerConfig>> {
    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut BufReader::new(std::fs::File::open(cert_path)?))
            .collect::<std::io::Result<_>>()?;
    let key: PrivateKeyDer<'static> =
        rustls_pemfile::private_key(&mut BufReader::new(std::fs::File::open(key_path)?))?
            .ok_or_else(|| Error::Invalid("no private key found in key file".into()))?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(Error::Tls)?;

    Ok(Arc::new(config))
}

/// A client TLS config that trusts the public Web PKI roots, for dialing
/// `wss://` endpoints with a certificate chain issued by a public CA.
pub fn default_client_config() -> Arc<rustls::ClientConfig> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    Arc::new(config)
}
