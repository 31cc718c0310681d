//! Quinn-based QUIC transport.
//!
//! Every client call travels on its own bidirectional stream: the client
//! writes one request frame and finishes its half, the server writes one
//! response frame and finishes. ALPN is pinned to [`ALPN_PROTOCOL`].
//!
//! Self-signed certificates are generated when no PEM files are configured.
//! They are for local use only; real deployments must present a certificate
//! the clients trust.

use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use cinder_proto::ALPN_PROTOCOL;
use quinn::{Endpoint, RecvStream, SendStream, ServerConfig};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

use crate::error::ServerError;

/// Connections idle this long are closed by QUIC itself.
const MAX_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the TLS identity comes from.
#[derive(Debug, Clone, Copy)]
pub enum TlsIdentity<'a> {
    /// PEM certificate chain and private key on disk.
    Pem {
        /// Certificate chain path
        cert: &'a Path,
        /// Private key path
        key: &'a Path,
    },
    /// Generate a throwaway certificate for `localhost`.
    SelfSigned,
}

/// QUIC listener.
pub struct QuinnTransport {
    endpoint: Endpoint,
}

impl QuinnTransport {
    /// Create and bind a QUIC endpoint.
    pub fn bind(address: &str, identity: TlsIdentity<'_>) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let (certs, key) = match identity {
            TlsIdentity::Pem { cert, key } => load_pem_identity(cert, key)?,
            TlsIdentity::SelfSigned => generate_self_signed_identity()?,
        };

        let endpoint = Endpoint::server(server_config(certs, key)?, addr)
            .map_err(|e| ServerError::Transport(format!("failed to create endpoint: {e}")))?;

        tracing::info!("QUIC transport bound to {}", addr);

        Ok(Self { endpoint })
    }

    /// Accept the next connection.
    ///
    /// Returns `Ok(None)` once the endpoint is closed. A failed handshake is
    /// an error for that connection only.
    pub async fn accept(&self) -> Result<Option<QuinnConnection>, ServerError> {
        let Some(incoming) = self.endpoint.accept().await else {
            return Ok(None);
        };

        let connection = incoming
            .await
            .map_err(|e| ServerError::Transport(format!("handshake failed: {e}")))?;

        Ok(Some(QuinnConnection { connection }))
    }

    /// Local address the transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.endpoint
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }

    /// Stop accepting and close every open connection.
    pub fn close(&self) {
        self.endpoint.close(quinn::VarInt::from_u32(0), b"server shutting down");
    }
}

/// An accepted QUIC connection. Clones share the connection.
#[derive(Clone)]
pub struct QuinnConnection {
    connection: quinn::Connection,
}

impl QuinnConnection {
    /// Wait for the client to open the next request stream.
    ///
    /// Returns `Ok(None)` when the client closed the connection cleanly.
    pub async fn accept_request(&self) -> Result<Option<(SendStream, RecvStream)>, ServerError> {
        match self.connection.accept_bi().await {
            Ok(streams) => Ok(Some(streams)),
            Err(
                quinn::ConnectionError::ApplicationClosed(_)
                | quinn::ConnectionError::LocallyClosed
                | quinn::ConnectionError::TimedOut,
            ) => Ok(None),
            Err(e) => Err(ServerError::Transport(format!("accept_bi failed: {e}"))),
        }
    }

    /// Remote peer address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.connection.remote_address()
    }

    /// Close the connection with a reason.
    pub fn close(&self, reason: &str) {
        self.connection.close(quinn::VarInt::from_u32(1), reason.as_bytes());
    }
}

fn server_config(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<ServerConfig, ServerError> {
    let mut tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Config(format!("invalid TLS config: {e}")))?;

    tls_config.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    let mut server_config = ServerConfig::with_crypto(Arc::new(
        quinn::crypto::rustls::QuicServerConfig::try_from(tls_config)
            .map_err(|e| ServerError::Config(format!("QUIC config error: {e}")))?,
    ));

    let mut transport = quinn::TransportConfig::default();
    transport.max_idle_timeout(Some(
        MAX_IDLE_TIMEOUT
            .try_into()
            .map_err(|e| ServerError::Config(format!("invalid idle timeout: {e}")))?,
    ));
    server_config.transport_config(Arc::new(transport));

    Ok(server_config)
}

fn load_pem_identity(
    cert_path: &Path,
    key_path: &Path,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), ServerError> {
    let cert_pem = std::fs::read(cert_path).map_err(|e| {
        ServerError::Config(format!("failed to read cert '{}': {e}", cert_path.display()))
    })?;
    let key_pem = std::fs::read(key_path).map_err(|e| {
        ServerError::Config(format!("failed to read key '{}': {e}", key_path.display()))
    })?;

    let certs = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Config(format!("failed to parse certificates: {e}")))?;

    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| ServerError::Config(format!("failed to parse private key: {e}")))?
        .ok_or_else(|| ServerError::Config("no private key found".to_string()))?;

    Ok((certs, key))
}

fn generate_self_signed_identity()
-> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), ServerError> {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .map_err(|e| ServerError::Config(format!("failed to generate self-signed cert: {e}")))?;

    let key = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());

    tracing::warn!("Using self-signed certificate - not for production use!");

    Ok((vec![cert.cert.der().clone()], key.into()))
}
