//! TLS setup for PostgreSQL sessions.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WantsClientCert;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, ConfigBuilder, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::warn;

use super::ConnectError;
use crate::config::{SslMode, SslOptions};

/// Builds a rustls connector from a profile's SSL options.
pub struct TlsBuilder<'a> {
    ssl: &'a SslOptions,
}

impl<'a> TlsBuilder<'a> {
    pub fn new(ssl: &'a SslOptions) -> Self {
        Self { ssl }
    }

    /// Returns `None` when the profile disables TLS.
    pub fn build(&self) -> Result<Option<MakeRustlsConnect>, ConnectError> {
        if !self.ssl.mode.requires_tls() {
            return Ok(None);
        }
        Ok(Some(MakeRustlsConnect::new(self.build_client_config()?)))
    }

    pub fn build_client_config(&self) -> Result<ClientConfig, ConnectError> {
        let builder = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(tls_error)?;

        let builder = match self.ssl.mode {
            SslMode::Disable => {
                return Err(ConnectError::Tls(
                    "cannot build TLS config for ssl_mode=disable".into(),
                ))
            }
            SslMode::Require => {
                warn!("ssl_mode=require encrypts traffic but does not verify the server certificate");
                builder
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(NoVerifier))
            }
            // rustls always checks the hostname, so verify-ca behaves like verify-full.
            SslMode::VerifyCa | SslMode::VerifyFull => {
                builder.with_root_certificates(self.root_store()?)
            }
        };

        self.with_client_auth(builder)
    }

    /// The profile's CA if one is set, otherwise the webpki roots.
    fn root_store(&self) -> Result<RootCertStore, ConnectError> {
        let mut roots = RootCertStore::empty();
        match &self.ssl.ca {
            Some(pem) => {
                let certs = parse_certs(pem, "CA")?;
                let (added, _) = roots.add_parsable_certificates(certs);
                if added == 0 {
                    return Err(ConnectError::Tls("CA certificate could not be parsed".into()));
                }
            }
            None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
        }
        Ok(roots)
    }

    fn with_client_auth(
        &self,
        builder: ConfigBuilder<ClientConfig, WantsClientCert>,
    ) -> Result<ClientConfig, ConnectError> {
        match (&self.ssl.cert, &self.ssl.key) {
            (Some(cert), Some(key)) => {
                let certs = parse_certs(cert, "client")?;
                let key = PrivateKeyDer::from_pem_slice(key.as_bytes())
                    .map_err(|e| ConnectError::Tls(format!("invalid client key: {e}")))?;
                builder.with_client_auth_cert(certs, key).map_err(tls_error)
            }
            (None, None) => Ok(builder.with_no_client_auth()),
            _ => Err(ConnectError::Tls(
                "client certificate and key must be given together".into(),
            )),
        }
    }
}

fn parse_certs(pem: &str, what: &str) -> Result<Vec<CertificateDer<'static>>, ConnectError> {
    let certs = CertificateDer::pem_slice_iter(pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConnectError::Tls(format!("invalid {what} certificate: {e}")))?;
    if certs.is_empty() {
        return Err(ConnectError::Tls(format!("no {what} certificate found in PEM")));
    }
    Ok(certs)
}

fn tls_error(e: rustls::Error) -> ConnectError {
    ConnectError::Tls(e.to_string())
}

/// Accepts any server certificate. Only used for `ssl_mode=require`.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
