//! In-process server for simulation.
//!
//! `SimServer` wraps `ServerDriver` with `SimEnv`, executing driver actions
//! the way the production runtime does. Each [`LoopbackGateway`] is one
//! simulated connection; requests and responses are encoded to bytes and
//! decoded again so the wire format is exercised on every call.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex as StdMutex, PoisonError,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
};

use cinder_client::{
    CreateNoteRequest, DecryptOutcome, FetchOutcome, GatewayError, NoteGateway, NoteId,
    Passphrase, gateway::wire,
};
use cinder_proto::{Frame, FrameHeader, Payload};
use cinder_server::{
    DriverConfig, DriverStats, LogLevel, MemoryStorage, NoteStore, ServerAction, ServerDriver,
    ServerEvent, StorageError,
};
use tokio::sync::Mutex;

use crate::SimEnv;

struct Inner<S: NoteStore> {
    driver: Mutex<ServerDriver<SimEnv, S>>,
    env: SimEnv,
    deliveries: StdMutex<HashMap<NoteId, usize>>,
    next_session_id: AtomicU64,
}

/// Simulation server. Clones share the same driver.
pub struct SimServer<S: NoteStore = MemoryStorage> {
    inner: Arc<Inner<S>>,
}

impl<S: NoteStore> Clone for SimServer<S> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl SimServer<MemoryStorage> {
    /// Server with in-memory storage and default configuration.
    pub fn new(env: SimEnv) -> Self {
        Self::with_storage(env, MemoryStorage::new(), DriverConfig::default())
    }
}

impl<S: NoteStore> SimServer<S> {
    /// Server over an explicit store.
    pub fn with_storage(env: SimEnv, storage: S, config: DriverConfig) -> Self {
        let driver = ServerDriver::new(env.clone(), storage, config);
        Self {
            inner: Arc::new(Inner {
                driver: Mutex::new(driver),
                env,
                deliveries: StdMutex::new(HashMap::new()),
                next_session_id: AtomicU64::new(1),
            }),
        }
    }

    /// Open a simulated connection.
    pub async fn connect(&self) -> Result<LoopbackGateway<S>, GatewayError> {
        let session_id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        let actions = self
            .inner
            .driver
            .lock()
            .await
            .process_event(ServerEvent::ConnectionAccepted { session_id })
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        if execute(actions, session_id).is_err() {
            return Err(GatewayError::Unreachable("connection refused".to_string()));
        }

        Ok(LoopbackGateway {
            server: self.clone(),
            session_id,
            next_request_id: AtomicU32::new(1),
        })
    }

    /// Deliver a periodic tick.
    pub async fn tick(&self) {
        let result = self.inner.driver.lock().await.process_event(ServerEvent::Tick);
        match result {
            Ok(actions) => {
                let _ = execute(actions, 0);
            },
            Err(e) => tracing::warn!("tick failed: {e}"),
        }
    }

    /// Driver counters.
    pub async fn stats(&self) -> DriverStats {
        self.inner.driver.lock().await.stats()
    }

    /// Notes currently stored, including expired ones not yet swept.
    pub async fn stored_notes(&self) -> Result<usize, StorageError> {
        self.inner.driver.lock().await.storage().count()
    }

    /// Connections the driver currently tracks.
    pub async fn session_count(&self) -> usize {
        self.inner.driver.lock().await.session_count()
    }

    /// Bodies handed out per note, as seen on the server side of the wire.
    pub fn deliveries(&self) -> HashMap<NoteId, usize> {
        self.inner.deliveries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Shared simulated environment.
    pub fn env(&self) -> &SimEnv {
        &self.inner.env
    }

    async fn exchange(&self, session_id: u64, request: &Frame) -> Result<Frame, GatewayError> {
        let frame = through_wire(request)?;
        let actions = self
            .inner
            .driver
            .lock()
            .await
            .process_event(ServerEvent::RequestReceived { session_id, frame })
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        let response = execute(actions, session_id)?
            .ok_or_else(|| GatewayError::Protocol("request produced no response".to_string()))?;
        through_wire(&response)
    }

    async fn close_session(&self, session_id: u64) {
        let result = self.inner.driver.lock().await.process_event(ServerEvent::ConnectionClosed {
            session_id,
            reason: "client disconnected".to_string(),
        });
        if let Ok(actions) = result {
            let _ = execute(actions, session_id);
        }
    }

    fn record_delivery(&self, id: NoteId) {
        *self
            .inner
            .deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_default() += 1;
    }
}

impl<S: NoteStore> std::fmt::Debug for SimServer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimServer").field("env", &self.inner.env).finish_non_exhaustive()
    }
}

/// Execute driver actions for `session_id`. Returns its response, if any.
///
/// A close of `session_id` is reported as a transport failure.
fn execute(actions: Vec<ServerAction>, session_id: u64) -> Result<Option<Frame>, GatewayError> {
    let mut response = None;

    for action in actions {
        match action {
            ServerAction::Respond { session_id: target, frame } if target == session_id => {
                response = Some(frame);
            },
            ServerAction::Respond { .. } => {},
            ServerAction::CloseConnection { session_id: target, reason } => {
                tracing::debug!("closing session {target}: {reason}");
                if target == session_id {
                    return Err(GatewayError::Unreachable(reason));
                }
            },
            ServerAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{message}"),
                LogLevel::Info => tracing::info!("{message}"),
                LogLevel::Warn => tracing::warn!("{message}"),
                LogLevel::Error => tracing::error!("{message}"),
            },
        }
    }

    Ok(response)
}

/// Encode to bytes and decode again.
fn through_wire(frame: &Frame) -> Result<Frame, GatewayError> {
    let mut buf = Vec::with_capacity(frame.encoded_len());
    frame.encode(&mut buf).map_err(|e| GatewayError::Protocol(format!("encode failed: {e}")))?;
    Frame::decode(&buf).map_err(|e| GatewayError::Protocol(format!("decode failed: {e}")))
}

/// One simulated connection to a [`SimServer`].
pub struct LoopbackGateway<S: NoteStore = MemoryStorage> {
    server: SimServer<S>,
    session_id: u64,
    next_request_id: AtomicU32,
}

impl<S: NoteStore> LoopbackGateway<S> {
    /// Session id the driver knows this connection by.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Close the connection.
    pub async fn disconnect(self) {
        self.server.close_session(self.session_id).await;
    }

    async fn call(&self, request: Payload) -> Result<Payload, GatewayError> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let mut header = FrameHeader::new(request.opcode());
        header.set_request_id(request_id);
        let frame = request
            .into_frame(header)
            .map_err(|e| GatewayError::Protocol(format!("encode failed: {e}")))?;

        let response = self.server.exchange(self.session_id, &frame).await?;
        if response.header.request_id() != request_id {
            return Err(GatewayError::Protocol("response for another request".to_string()));
        }
        Payload::from_frame(&response)
            .map_err(|e| GatewayError::Protocol(format!("decode failed: {e}")))
    }
}

impl<S: NoteStore> std::fmt::Debug for LoopbackGateway<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackGateway").field("session_id", &self.session_id).finish()
    }
}

impl<S: NoteStore> NoteGateway for LoopbackGateway<S> {
    async fn create_note(&self, request: &CreateNoteRequest) -> Result<NoteId, GatewayError> {
        wire::note_created(self.call(wire::create_note_request(request)).await?)
    }

    async fn fetch_note(&self, id: NoteId) -> Result<FetchOutcome, GatewayError> {
        let outcome = wire::fetch_outcome(self.call(wire::fetch_note_request(id)).await?)?;
        if let FetchOutcome::Found(_) = outcome {
            self.server.record_delivery(id);
        }
        Ok(outcome)
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
