//! Cinder note server.
//!
//! Production server using Quinn for QUIC transport, Tokio for the async
//! runtime, and system time with cryptographic RNG.
//!
//! # Architecture
//!
//! [`ServerDriver`] holds all note semantics and performs no I/O: it consumes
//! [`ServerEvent`]s and returns [`ServerAction`]s. [`Server`] is the runtime
//! glue that accepts QUIC connections, reads one request frame per stream,
//! runs the driver, and writes the response back on the same stream.
//!
//! # Components
//!
//! - [`ServerDriver`]: action-based request handling (pure logic, no I/O)
//! - [`Server`]: production runtime executing driver actions
//! - [`QuinnTransport`]: QUIC transport via Quinn
//! - [`storage`]: read-once note stores (memory, redb, fault injection)
//! - [`SystemEnv`]: production environment (real time, crypto RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod driver_error;
mod error;
pub mod storage;
mod system_env;
mod transport;

use std::{future::Future, path::PathBuf, sync::Arc, time::Duration};

use cinder_core::env::Environment;
use cinder_proto::{Frame, FrameHeader};
pub use driver::{DriverConfig, DriverStats, LogLevel, ServerAction, ServerDriver, ServerEvent};
pub use driver_error::DriverError;
pub use error::ServerError;
use quinn::{RecvStream, SendStream};
pub use storage::{
    AnyStorage, ChaoticStorage, MemoryStorage, NoteStore, RedbStorage, StorageBackend,
    StorageError, StoredNote,
};
pub use system_env::SystemEnv;
use tokio::sync::Mutex;
use tracing::Instrument;
pub use transport::{QuinnConnection, QuinnTransport, TlsIdentity};

type SharedDriver = Arc<Mutex<ServerDriver<SystemEnv, AnyStorage>>>;

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:4433")
    pub bind_address: String,
    /// Path to TLS certificate (PEM format)
    pub cert_path: Option<PathBuf>,
    /// Path to TLS private key (PEM format)
    pub key_path: Option<PathBuf>,
    /// Where notes are kept
    pub storage: StorageBackend,
    /// How often the driver is ticked
    pub tick_interval: Duration,
    /// Driver configuration (limits, sweep interval)
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4433".to_string(),
            cert_path: None,
            key_path: None,
            storage: StorageBackend::Memory,
            tick_interval: Duration::from_secs(5),
            driver: DriverConfig::default(),
        }
    }
}

/// Production cinder server.
///
/// Wraps `ServerDriver` with Quinn QUIC transport and system environment.
pub struct Server {
    driver: ServerDriver<SystemEnv, AnyStorage>,
    transport: QuinnTransport,
    env: SystemEnv,
    tick_interval: Duration,
}

impl Server {
    /// Open storage and bind the QUIC endpoint.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let env = SystemEnv::new();
        let storage = config.storage.open()?;
        let driver = ServerDriver::new(env.clone(), storage, config.driver);

        let identity = match (&config.cert_path, &config.key_path) {
            (Some(cert), Some(key)) => TlsIdentity::Pem { cert, key },
            (None, None) => TlsIdentity::SelfSigned,
            _ => {
                return Err(ServerError::Config(
                    "--cert and --key must be given together".to_string(),
                ));
            },
        };
        let transport = QuinnTransport::bind(&config.bind_address, identity)?;

        Ok(Self { driver, transport, env, tick_interval: config.tick_interval })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Run until the endpoint closes.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Run until `shutdown` resolves, then close every connection.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<(), ServerError> {
        tracing::info!("Server starting on {}", self.transport.local_addr()?);

        let Self { driver, transport, env, tick_interval } = self;
        let driver: SharedDriver = Arc::new(Mutex::new(driver));

        let ticker = tokio::spawn(run_ticker(Arc::clone(&driver), env.clone(), tick_interval));

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break;
                },
                accepted = transport.accept() => match accepted {
                    Ok(Some(conn)) => {
                        let driver = Arc::clone(&driver);
                        let session_id = env.random_u64();
                        tokio::spawn(handle_connection(session_id, conn, driver));
                    },
                    Ok(None) => break,
                    Err(e) => tracing::debug!("Accept error: {}", e),
                },
            }
        }

        ticker.abort();
        transport.close();

        Ok(())
    }
}

async fn run_ticker(driver: SharedDriver, env: SystemEnv, interval: Duration) {
    loop {
        env.sleep(interval).await;

        let actions = driver.lock().await.process_event(ServerEvent::Tick);
        match actions {
            Ok(actions) => {
                for action in actions {
                    if let ServerAction::Log { level, message } = action {
                        log(level, &message);
                    }
                }
            },
            Err(e) => tracing::warn!("Tick failed: {}", e),
        }
    }
}

/// Drive one QUIC connection: one spawned task per request stream.
async fn handle_connection(session_id: u64, conn: QuinnConnection, driver: SharedDriver) {
    tracing::debug!("New connection {} from {}", session_id, conn.remote_addr());

    let accepted = driver.lock().await.process_event(ServerEvent::ConnectionAccepted { session_id });
    match accepted {
        Ok(actions) => {
            if !execute_actions(actions, &conn, None).await {
                return;
            }
        },
        Err(e) => {
            tracing::warn!("Rejecting connection {}: {}", session_id, e);
            conn.close("rejected");
            return;
        },
    }

    loop {
        match conn.accept_request().await {
            Ok(Some((send, recv))) => {
                let driver = Arc::clone(&driver);
                let conn = conn.clone();
                let span = tracing::debug_span!(
                    "request",
                    session_id,
                    opcode = tracing::field::Empty,
                    request_id = tracing::field::Empty,
                );
                tokio::spawn(
                    async move {
                        if let Err(e) = handle_stream(session_id, send, recv, &conn, &driver).await
                        {
                            tracing::debug!("Stream error on session {}: {}", session_id, e);
                        }
                    }
                    .instrument(span),
                );
            },
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("Connection {} lost: {}", session_id, e);
                break;
            },
        }
    }

    let closed = driver.lock().await.process_event(ServerEvent::ConnectionClosed {
        session_id,
        reason: "connection closed".to_string(),
    });
    if let Ok(actions) = closed {
        execute_actions(actions, &conn, None).await;
    }
}

/// Serve one request: read a frame, run the driver, answer, finish.
async fn handle_stream(
    session_id: u64,
    mut send: SendStream,
    mut recv: RecvStream,
    conn: &QuinnConnection,
    driver: &SharedDriver,
) -> Result<(), ServerError> {
    let frame = read_frame(&mut recv).await?;

    let span = tracing::Span::current();
    span.record("opcode", frame.header.opcode());
    span.record("request_id", frame.header.request_id());
    tracing::debug!("Request received");

    let actions =
        driver.lock().await.process_event(ServerEvent::RequestReceived { session_id, frame })?;

    execute_actions(actions, conn, Some(&mut send)).await;

    send.finish().map_err(|e| ServerError::Transport(format!("finish failed: {e}")))?;

    Ok(())
}

/// Execute driver actions. Returns false once the connection was closed.
async fn execute_actions(
    actions: Vec<ServerAction>,
    conn: &QuinnConnection,
    mut stream: Option<&mut SendStream>,
) -> bool {
    let mut open = true;

    for action in actions {
        match action {
            ServerAction::Respond { session_id, frame } => {
                let Some(send) = stream.as_deref_mut() else {
                    tracing::warn!("Response for session {} outside a request", session_id);
                    continue;
                };
                if let Err(e) = write_frame(send, &frame).await {
                    tracing::debug!("Response write failed for {}: {}", session_id, e);
                }
            },
            ServerAction::CloseConnection { session_id, reason } => {
                tracing::info!("Closing session {}: {}", session_id, reason);
                conn.close(&reason);
                open = false;
            },
            ServerAction::Log { level, message } => log(level, &message),
        }
    }

    open
}

fn log(level: LogLevel, message: &str) {
    match level {
        LogLevel::Debug => tracing::debug!("{}", message),
        LogLevel::Info => tracing::info!("{}", message),
        LogLevel::Warn => tracing::warn!("{}", message),
        LogLevel::Error => tracing::error!("{}", message),
    }
}

/// Read exactly one frame. The header is validated before the payload is
/// allocated.
async fn read_frame(recv: &mut RecvStream) -> Result<Frame, ServerError> {
    let mut header_bytes = [0u8; FrameHeader::SIZE];
    recv.read_exact(&mut header_bytes)
        .await
        .map_err(|e| ServerError::Transport(format!("header read failed: {e}")))?;

    let header = FrameHeader::from_bytes(&header_bytes)?;
    let payload_size = header.payload_size() as usize;

    let mut buf = vec![0u8; FrameHeader::SIZE + payload_size];
    buf[..FrameHeader::SIZE].copy_from_slice(&header_bytes);
    recv.read_exact(&mut buf[FrameHeader::SIZE..])
        .await
        .map_err(|e| ServerError::Transport(format!("payload read failed: {e}")))?;

    Ok(Frame::decode(&buf)?)
}

async fn write_frame(send: &mut SendStream, frame: &Frame) -> Result<(), ServerError> {
    let mut buf = Vec::with_capacity(frame.encoded_len());
    frame.encode(&mut buf)?;
    send.write_all(&buf)
        .await
        .map_err(|e| ServerError::Transport(format!("write failed: {e}")))
}
