//! QUIC/TLS configuration for the tile streaming client and server
//!
//! The session runs exactly two bidirectional streams per connection, one
//! per priority class. Clients either trust a CA certificate loaded from a
//! PEM file or, for development, take any server certificate while still
//! checking the handshake signatures against it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, Error, SignatureScheme};

/// ALPN identifier negotiated by client and server
pub const ALPN: &[u8] = b"tile-stream";

/// Idle connections are closed after this long without traffic
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Keepalive interval, well under [`IDLE_TIMEOUT`]
pub const KEEP_ALIVE: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid PEM data: {0}")]
    Pem(std::io::Error),

    #[error("no certificates found in PEM data")]
    NoCertificates,

    #[error("no private key found in PEM data")]
    NoPrivateKey,

    #[error("TLS error: {0}")]
    Rustls(#[from] rustls::Error),

    #[error("certificate generation failed: {0}")]
    Rcgen(#[from] rcgen::Error),

    #[error("TLS config has no QUIC-compatible cipher suite")]
    NoInitialCipherSuite(#[from] quinn::crypto::rustls::NoInitialCipherSuite),
}

/// Install the ring crypto provider as the process default
///
/// Safe to call more than once; later calls are ignored.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Server certificate check for clients without a configured CA
///
/// Any certificate is taken as the server's, but the handshake signatures
/// are still checked against it with the ring provider's algorithms, so the
/// peer must hold the matching private key.
#[derive(Debug)]
pub struct UnverifiedServerCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl UnverifiedServerCert {
    pub fn new() -> Self {
        Self {
            algorithms: rustls::crypto::ring::default_provider().signature_verification_algorithms,
        }
    }
}

impl Default for UnverifiedServerCert {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerCertVerifier for UnverifiedServerCert {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer,
        _intermediates: &[CertificateDer],
        server_name: &ServerName,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, Error> {
        tracing::debug!(
            server = ?server_name,
            cert_len = end_entity.len(),
            "accepting server certificate without a CA"
        );
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// Transport settings for a two-stream tile session
pub fn session_transport_config() -> quinn::TransportConfig {
    let mut config = quinn::TransportConfig::default();
    config.max_concurrent_bidi_streams(4u32.into());
    config.max_concurrent_uni_streams(0u32.into());
    config.max_idle_timeout(Some(quinn::IdleTimeout::from(quinn::VarInt::from_u32(
        IDLE_TIMEOUT.as_millis() as u32,
    ))));
    config.keep_alive_interval(Some(KEEP_ALIVE));
    config
}

/// Parse every certificate in a PEM buffer
pub fn parse_pem_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(TlsError::Pem)?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates);
    }
    Ok(certs)
}

/// Parse the first private key in a PEM buffer
pub fn parse_pem_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>, TlsError> {
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(TlsError::Pem)?
        .ok_or(TlsError::NoPrivateKey)
}

fn read_file(path: &Path) -> Result<Vec<u8>, TlsError> {
    std::fs::read(path).map_err(|source| TlsError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Create a rustls ClientConfig that takes any server certificate
pub fn insecure_client_config() -> rustls::ClientConfig {
    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(UnverifiedServerCert::new()))
        .with_no_client_auth()
}

/// Create a rustls ClientConfig trusting only `roots`
pub fn trusted_client_config(
    roots: impl IntoIterator<Item = CertificateDer<'static>>,
) -> Result<rustls::ClientConfig, TlsError> {
    let mut store = rustls::RootCertStore::empty();
    for cert in roots {
        store.add(cert)?;
    }
    Ok(rustls::ClientConfig::builder()
        .with_root_certificates(store)
        .with_no_client_auth())
}

/// Wrap a rustls ClientConfig for quinn with the session transport
pub fn quic_client_config(
    mut crypto: rustls::ClientConfig,
) -> Result<quinn::ClientConfig, TlsError> {
    crypto.alpn_protocols = vec![ALPN.to_vec()];
    let quic_config = quinn::crypto::rustls::QuicClientConfig::try_from(crypto)?;
    let mut client_config = quinn::ClientConfig::new(Arc::new(quic_config));
    client_config.transport_config(Arc::new(session_transport_config()));
    Ok(client_config)
}

/// Create the client config, trusting `ca_cert` when given
///
/// Without a CA certificate the server certificate is not verified.
pub fn create_client_config(ca_cert: Option<&Path>) -> Result<quinn::ClientConfig, TlsError> {
    let crypto = match ca_cert {
        Some(path) => {
            let roots = parse_pem_certs(&read_file(path)?)?;
            tracing::debug!(path = %path.display(), count = roots.len(), "loaded CA certificates");
            trusted_client_config(roots)?
        }
        None => {
            tracing::warn!("no CA certificate configured; server certificate will not be verified");
            insecure_client_config()
        }
    };
    quic_client_config(crypto)
}

/// Build a quinn ServerConfig from a certificate chain and key
pub fn server_config(
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<quinn::ServerConfig, TlsError> {
    let mut crypto = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(chain, key)?;
    crypto.alpn_protocols = vec![ALPN.to_vec()];

    let quic_config = quinn::crypto::rustls::QuicServerConfig::try_from(crypto)?;
    let mut server_config = quinn::ServerConfig::with_crypto(Arc::new(quic_config));
    server_config.transport_config(Arc::new(session_transport_config()));
    Ok(server_config)
}

/// Load the server certificate chain and key from PEM files
pub fn server_config_from_pem_files(
    cert_path: &Path,
    key_path: &Path,
) -> Result<quinn::ServerConfig, TlsError> {
    let chain = parse_pem_certs(&read_file(cert_path)?)?;
    let key = parse_pem_key(&read_file(key_path)?)?;
    server_config(chain, key)
}

/// A freshly generated self-signed certificate
pub struct SelfSigned {
    pub cert: CertificateDer<'static>,
    pub key: PrivateKeyDer<'static>,
    /// PEM encoding of `cert`, for handing to clients as a CA file
    pub cert_pem: String,
}

/// Generate an ED25519 self-signed certificate for `names`
pub fn generate_self_signed(names: Vec<String>) -> Result<SelfSigned, TlsError> {
    let key_pair = rcgen::KeyPair::generate_for(&rcgen::PKCS_ED25519)?;
    let cert = rcgen::CertificateParams::new(names)?.self_signed(&key_pair)?;
    Ok(SelfSigned {
        cert: CertificateDer::from(cert.der().to_vec()),
        key: PrivatePkcs8KeyDer::from(key_pair.serialize_der()).into(),
        cert_pem: cert.pem(),
    })
}

/// Server config with a fresh self-signed certificate
///
/// Returns the certificate so callers can publish or trust it.
pub fn self_signed_server_config(
    names: Vec<String>,
) -> Result<(quinn::ServerConfig, CertificateDer<'static>), TlsError> {
    let SelfSigned { cert, key, .. } = generate_self_signed(names)?;
    let config = server_config(vec![cert.clone()], key)?;
    Ok((config, cert))
}
