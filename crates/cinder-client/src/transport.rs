//! QUIC gateway.
//!
//! [`QuicGateway`] implements [`NoteGateway`] over quinn. Each call opens a
//! bidirectional stream, writes one request frame, finishes its half and
//! reads one response frame. The connection is established lazily and
//! re-established after it drops. Protocol logic stays in the Sans-IO state
//! machines.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use bytes::BytesMut;
use cinder_core::NoteId;
use cinder_crypto::Passphrase;
use cinder_proto::{ALPN_PROTOCOL, Frame, FrameHeader, Payload};
use quinn::{ClientConfig, Connection, Endpoint, RecvStream};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::gateway::{
    CreateNoteRequest, DecryptOutcome, FetchOutcome, GatewayError, NoteGateway, wire,
};

/// Idle connections are closed by QUIC after this long.
const MAX_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors building the gateway.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Bad address or TLS configuration.
    #[error("invalid transport configuration: {0}")]
    Config(String),

    /// Local endpoint could not be created.
    #[error("endpoint creation failed: {0}")]
    Endpoint(String),
}

/// Connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Limit for establishing a connection.
    pub connect_timeout: Duration,
    /// Limit for one request/response exchange.
    pub request_timeout: Duration,
    /// TLS server name presented during the handshake.
    pub server_name: String,
}

impl TransportConfig {
    /// Settings for a local server with a self-signed certificate.
    pub fn development() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            server_name: "localhost".to_string(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::development()
    }
}

/// [`NoteGateway`] over QUIC.
pub struct QuicGateway {
    endpoint: Endpoint,
    server_addr: SocketAddr,
    config: TransportConfig,
    connection: Mutex<Option<Connection>>,
    next_request_id: AtomicU32,
}

impl QuicGateway {
    /// Create a gateway for `server_addr`. No connection is made until the
    /// first call. Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - `TransportError::Config` if the address or TLS setup is invalid
    /// - `TransportError::Endpoint` if the local socket cannot be bound
    pub fn new(server_addr: &str, config: TransportConfig) -> Result<Self, TransportError> {
        let server_addr: SocketAddr = server_addr
            .parse()
            .map_err(|e| TransportError::Config(format!("invalid address '{server_addr}': {e}")))?;

        let bind_addr: SocketAddr = if server_addr.is_ipv6() {
            SocketAddr::from(([0u16; 8], 0))
        } else {
            SocketAddr::from(([0u8; 4], 0))
        };

        let mut endpoint =
            Endpoint::client(bind_addr).map_err(|e| TransportError::Endpoint(e.to_string()))?;
        endpoint.set_default_client_config(insecure_client_config()?);

        Ok(Self {
            endpoint,
            server_addr,
            config,
            connection: Mutex::new(None),
            next_request_id: AtomicU32::new(1),
        })
    }

    /// Server this gateway talks to.
    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// Close the connection and the local endpoint.
    pub async fn close(&self) {
        if let Some(connection) = self.connection.lock().await.take() {
            connection.close(0u32.into(), b"client closing");
        }
        self.endpoint.close(0u32.into(), b"client closing");
        self.endpoint.wait_idle().await;
    }

    async fn connection(&self) -> Result<Connection, GatewayError> {
        let mut slot = self.connection.lock().await;
        if let Some(connection) = slot.as_ref() {
            if connection.close_reason().is_none() {
                return Ok(connection.clone());
            }
            tracing::debug!(addr = %self.server_addr, "connection lost, reconnecting");
        }

        let connecting = self
            .endpoint
            .connect(self.server_addr, &self.config.server_name)
            .map_err(|e| GatewayError::Unreachable(format!("connect failed: {e}")))?;
        let connection = tokio::time::timeout(self.config.connect_timeout, connecting)
            .await
            .map_err(|_| GatewayError::Timeout)?
            .map_err(|e| GatewayError::Unreachable(format!("connection failed: {e}")))?;

        tracing::debug!(addr = %self.server_addr, "connected");
        *slot = Some(connection.clone());
        Ok(connection)
    }

    async fn call(&self, request: Payload) -> Result<Payload, GatewayError> {
        let connection = self.connection().await?;

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let mut header = FrameHeader::new(request.opcode());
        header.set_request_id(request_id);
        let frame = request
            .into_frame(header)
            .map_err(|e| GatewayError::Protocol(format!("encode failed: {e}")))?;

        let response =
            tokio::time::timeout(self.config.request_timeout, exchange(&connection, &frame))
                .await
                .map_err(|_| GatewayError::Timeout)??;

        if response.header.request_id() != request_id {
            return Err(GatewayError::Protocol(format!(
                "response for request {} on stream of request {request_id}",
                response.header.request_id()
            )));
        }

        Payload::from_frame(&response)
            .map_err(|e| GatewayError::Protocol(format!("decode failed: {e}")))
    }
}

impl std::fmt::Debug for QuicGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuicGateway")
            .field("server_addr", &self.server_addr)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl NoteGateway for QuicGateway {
    async fn create_note(&self, request: &CreateNoteRequest) -> Result<NoteId, GatewayError> {
        wire::note_created(self.call(wire::create_note_request(request)).await?)
    }

    async fn fetch_note(&self, id: NoteId) -> Result<FetchOutcome, GatewayError> {
        wire::fetch_outcome(self.call(wire::fetch_note_request(id)).await?)
    }

    async fn decrypt(
        &self,
        body: &[u8],
        passphrase: &Passphrase,
    ) -> Result<DecryptOutcome, GatewayError> {
        wire::decrypt_outcome(self.call(wire::decrypt_request(body, passphrase)).await?)
    }

    async fn issue_key(&self) -> Result<Passphrase, GatewayError> {
        wire::issued_key(self.call(wire::issue_key_request()).await?)
    }
}

/// One request/response exchange on a fresh stream.
async fn exchange(connection: &Connection, frame: &Frame) -> Result<Frame, GatewayError> {
    let (mut send, mut recv) = connection
        .open_bi()
        .await
        .map_err(|e| GatewayError::Unreachable(format!("open stream failed: {e}")))?;

    let mut buf = Vec::with_capacity(frame.encoded_len());
    frame.encode(&mut buf).map_err(|e| GatewayError::Protocol(format!("encode failed: {e}")))?;

    send.write_all(&buf)
        .await
        .map_err(|e| GatewayError::Unreachable(format!("write failed: {e}")))?;
    send.finish().map_err(|e| GatewayError::Unreachable(format!("finish failed: {e}")))?;

    read_frame(&mut recv).await
}

async fn read_frame(recv: &mut RecvStream) -> Result<Frame, GatewayError> {
    let mut buf = BytesMut::zeroed(FrameHeader::SIZE);
    recv.read_exact(&mut buf[..])
        .await
        .map_err(|e| GatewayError::Unreachable(format!("header read failed: {e}")))?;

    let header = FrameHeader::from_bytes(&buf)
        .map_err(|e| GatewayError::Protocol(format!("invalid header: {e}")))?;
    let payload_size = header.payload_size() as usize;

    if payload_size > 0 {
        buf.resize(FrameHeader::SIZE + payload_size, 0);
        recv.read_exact(&mut buf[FrameHeader::SIZE..])
            .await
            .map_err(|e| GatewayError::Unreachable(format!("payload read failed: {e}")))?;
    }

    Frame::decode(&buf).map_err(|e| GatewayError::Protocol(format!("frame decode failed: {e}")))
}

/// Client config that accepts any server certificate.
///
/// For servers running with a self-signed certificate only.
fn insecure_client_config() -> Result<ClientConfig, TransportError> {
    let mut crypto = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureCertVerifier))
        .with_no_client_auth();
    crypto.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    let quic_crypto = quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
        .map_err(|e| TransportError::Config(format!("unusable TLS config: {e}")))?;
    let mut config = ClientConfig::new(Arc::new(quic_crypto));

    let idle_timeout = MAX_IDLE_TIMEOUT
        .try_into()
        .map_err(|e| TransportError::Config(format!("idle timeout out of range: {e}")))?;
    let mut transport = quinn::TransportConfig::default();
    transport.max_idle_timeout(Some(idle_timeout));
    config.transport_config(Arc::new(transport));

    Ok(config)
}

/// Certificate verifier that accepts any certificate.
#[derive(Debug)]
struct InsecureCertVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_config_targets_localhost() {
        let config = TransportConfig::default();
        assert_eq!(config.server_name, "localhost");
        assert!(config.request_timeout > config.connect_timeout);
    }

    #[tokio::test]
    async fn rejects_bad_address() {
        let result = QuicGateway::new("not an address", TransportConfig::development());
        assert!(matches!(result, Err(TransportError::Config(_))));
    }

    #[tokio::test]
    async fn unreachable_server_is_transient() {
        let config = TransportConfig {
            connect_timeout: Duration::from_millis(200),
            ..TransportConfig::development()
        };
        // Nothing listens on the discard port over UDP.
        let gateway = QuicGateway::new("127.0.0.1:9", config).unwrap();

        let err = gateway.issue_key().await.unwrap_err();
        assert!(err.is_transient(), "expected transient error, got {err:?}");
    }
}
