//! Server driver.
//!
//! Sans-IO core of the server: the runtime feeds [`ServerEvent`]s in and
//! executes the [`ServerAction`]s that come out. All note semantics live here
//! (validation, sealing, read-once retrieval, stateless decryption, key
//! issuance, expiry sweeps), so the same driver runs under QUIC in production
//! and in-process in simulation.

use std::{collections::HashSet, time::Duration};

use cinder_core::{NoteId, Ttl, env::Environment};
use cinder_crypto::{NONCE_SIZE, Passphrase};
use cinder_proto::{
    Frame, FrameHeader, Payload,
    payloads::note::{CreateNote, Decrypt, FetchNote, IssuedKey, NoteBody, NoteCreated, Plaintext},
};

use crate::{
    driver_error::DriverError,
    storage::{NoteStore, StorageError, StoredNote},
};

/// Fresh ids tried before giving up on a put that keeps conflicting.
const MAX_ID_ATTEMPTS: usize = 3;

/// Driver configuration
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Maximum concurrent connections
    pub max_connections: usize,
    /// Largest accepted plaintext note, in bytes
    pub max_note_bytes: usize,
    /// Minimum time between expiry sweeps
    pub sweep_interval: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            max_note_bytes: 64 * 1024,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Events that the server driver processes.
///
/// These are produced by the external runtime (simulation or production).
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new connection was accepted
    ConnectionAccepted {
        /// Unique connection ID assigned by the runtime
        session_id: u64,
    },

    /// A request frame arrived on one of the session's streams
    RequestReceived {
        /// Connection that sent the request
        session_id: u64,
        /// The request frame
        frame: Frame,
    },

    /// A connection was closed (by peer or error)
    ConnectionClosed {
        /// Connection that was closed
        session_id: u64,
        /// Reason for closure
        reason: String,
    },

    /// Periodic tick; drives expiry sweeps
    Tick,
}

/// Actions that the server driver produces.
///
/// These are executed by runtime-specific code (production or simulation).
#[derive(Debug, Clone)]
pub enum ServerAction {
    /// Answer the request that produced this action, on the stream it
    /// arrived on
    Respond {
        /// Session that sent the request
        session_id: u64,
        /// Response frame; its request id echoes the request's
        frame: Frame,
    },

    /// Close a connection
    CloseConnection {
        /// Session to close
        session_id: u64,
        /// Reason for closure
        reason: String,
    },

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
    },
}

/// Log levels for server actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Counters over the driver's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Notes stored
    pub notes_created: u64,
    /// Notes handed out by a read
    pub notes_read: u64,
    /// Reads that found nothing
    pub notes_missing: u64,
    /// Successful decryptions
    pub decryptions: u64,
    /// Rejected decryptions
    pub decrypt_failures: u64,
    /// Keys issued
    pub keys_issued: u64,
    /// Expired notes removed by sweeps
    pub notes_purged: u64,
}

/// Action-based server driver.
pub struct ServerDriver<E, S>
where
    E: Environment,
    S: NoteStore,
{
    sessions: HashSet<u64>,
    storage: S,
    env: E,
    config: DriverConfig,
    last_sweep: Option<E::Instant>,
    stats: DriverStats,
}

impl<E, S> ServerDriver<E, S>
where
    E: Environment,
    S: NoteStore,
{
    /// Create a new server driver.
    pub fn new(env: E, storage: S, config: DriverConfig) -> Self {
        Self {
            sessions: HashSet::new(),
            storage,
            env,
            config,
            last_sweep: None,
            stats: DriverStats::default(),
        }
    }

    /// Process a server event and return actions to execute.
    ///
    /// Request-level failures (bad input, missing note, wrong key, storage
    /// trouble) become error responses, not `Err`. `Err` is reserved for
    /// events the driver cannot attribute to a live session.
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, DriverError> {
        match event {
            ServerEvent::ConnectionAccepted { session_id } => {
                Ok(self.handle_connection_accepted(session_id))
            },
            ServerEvent::RequestReceived { session_id, frame } => {
                self.handle_request(session_id, &frame)
            },
            ServerEvent::ConnectionClosed { session_id, reason } => {
                Ok(self.handle_connection_closed(session_id, &reason))
            },
            ServerEvent::Tick => Ok(self.handle_tick()),
        }
    }

    fn handle_connection_accepted(&mut self, session_id: u64) -> Vec<ServerAction> {
        if self.sessions.len() >= self.config.max_connections {
            return vec![ServerAction::CloseConnection {
                session_id,
                reason: "max connections exceeded".to_string(),
            }];
        }

        self.sessions.insert(session_id);

        vec![ServerAction::Log {
            level: LogLevel::Debug,
            message: format!("session {session_id} accepted"),
        }]
    }

    fn handle_connection_closed(&mut self, session_id: u64, reason: &str) -> Vec<ServerAction> {
        if self.sessions.remove(&session_id) {
            vec![ServerAction::Log {
                level: LogLevel::Debug,
                message: format!("session {session_id} closed: {reason}"),
            }]
        } else {
            Vec::new()
        }
    }

    fn handle_request(
        &mut self,
        session_id: u64,
        frame: &Frame,
    ) -> Result<Vec<ServerAction>, DriverError> {
        if !self.sessions.contains(&session_id) {
            return Err(DriverError::SessionNotFound(session_id));
        }

        let result = match Payload::from_frame(frame) {
            Ok(Payload::CreateNote(req)) => self.create_note(&req),
            Ok(Payload::FetchNote(req)) => self.fetch_note(&req),
            Ok(Payload::Decrypt(req)) => self.decrypt(&req),
            Ok(Payload::IssueKey) => Ok(self.issue_key()),
            Ok(other) => Err(DriverError::InvalidRequest(format!(
                "{:?} is not a request",
                other.opcode()
            ))),
            Err(e) => Err(DriverError::InvalidRequest(e.to_string())),
        };

        let mut actions = Vec::with_capacity(2);
        let response = match result {
            Ok(payload) => payload,
            Err(err) => {
                let level = match err {
                    DriverError::Storage(_) | DriverError::Protocol(_) => LogLevel::Warn,
                    _ => LogLevel::Debug,
                };
                actions.push(ServerAction::Log {
                    level,
                    message: format!("session {session_id} request failed: {err}"),
                });
                Payload::Error(err.to_payload())
            },
        };

        let header = FrameHeader::response_to(&frame.header, response.opcode());
        let response = response.into_frame(header)?;
        actions.push(ServerAction::Respond { session_id, frame: response });

        Ok(actions)
    }

    /// Validate, seal and store a note under a fresh id.
    fn create_note(&mut self, req: &CreateNote) -> Result<Payload, DriverError> {
        if req.note.is_empty() {
            return Err(DriverError::InvalidRequest("note must not be empty".to_string()));
        }
        if req.note.len() > self.config.max_note_bytes {
            return Err(DriverError::InvalidRequest(format!(
                "note exceeds {} bytes",
                self.config.max_note_bytes
            )));
        }

        let ttl = Ttl::parse(&req.delete_after)?;
        let passphrase = Passphrase::parse(&req.secret)?;

        let mut nonce = [0u8; NONCE_SIZE];
        self.env.random_bytes(&mut nonce);

        let note = StoredNote {
            body: cinder_crypto::seal(req.note.as_bytes(), &passphrase, nonce),
            expires_at_secs: ttl.expires_at(self.env.wall_clock_secs()),
        };

        for _ in 0..MAX_ID_ATTEMPTS {
            let id = NoteId::generate(&self.env);
            match self.storage.put(id, &note) {
                Ok(()) => {
                    self.stats.notes_created += 1;
                    return Ok(Payload::NoteCreated(NoteCreated { id: id.to_string() }));
                },
                Err(StorageError::Conflict) => {},
                Err(e) => return Err(e.into()),
            }
        }

        Err(DriverError::Storage(StorageError::Conflict))
    }

    /// Destructive read. Every miss looks the same to the caller.
    fn fetch_note(&mut self, req: &FetchNote) -> Result<Payload, DriverError> {
        let Ok(id) = NoteId::parse(&req.id) else {
            self.stats.notes_missing += 1;
            return Err(DriverError::NotFound);
        };

        match self.storage.take(id, self.env.wall_clock_secs())? {
            Some(body) => {
                self.stats.notes_read += 1;
                Ok(Payload::NoteBody(NoteBody { body }))
            },
            None => {
                self.stats.notes_missing += 1;
                Err(DriverError::NotFound)
            },
        }
    }

    fn decrypt(&mut self, req: &Decrypt) -> Result<Payload, DriverError> {
        let passphrase = Passphrase::parse(&req.secret)?;

        match cinder_crypto::open_utf8(&req.message, &passphrase) {
            Ok(note) => {
                self.stats.decryptions += 1;
                Ok(Payload::Plaintext(Plaintext { note }))
            },
            Err(e) => {
                self.stats.decrypt_failures += 1;
                Err(e.into())
            },
        }
    }

    fn issue_key(&mut self) -> Payload {
        let mut key = [0u8; cinder_crypto::KEY_SIZE];
        self.env.random_bytes(&mut key);
        let passphrase = Passphrase::from_bytes(key);

        self.stats.keys_issued += 1;
        Payload::IssuedKey(IssuedKey { secret: passphrase.encode() })
    }

    /// Sweep expired notes at most once per `sweep_interval`.
    fn handle_tick(&mut self) -> Vec<ServerAction> {
        let now = self.env.now();
        if let Some(last) = self.last_sweep {
            if now - last < self.config.sweep_interval {
                return Vec::new();
            }
        }
        self.last_sweep = Some(now);

        match self.storage.purge_expired(self.env.wall_clock_secs()) {
            Ok(0) => Vec::new(),
            Ok(purged) => {
                self.stats.notes_purged += purged as u64;
                vec![ServerAction::Log {
                    level: LogLevel::Info,
                    message: format!("purged {purged} expired notes"),
                }]
            },
            Err(e) => vec![ServerAction::Log {
                level: LogLevel::Warn,
                message: format!("expiry sweep failed: {e}"),
            }],
        }
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Lifetime counters.
    pub fn stats(&self) -> DriverStats {
        self.stats
    }

    /// Storage backend.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Driver configuration.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }
}

impl<E, S> std::fmt::Debug for ServerDriver<E, S>
where
    E: Environment,
    S: NoteStore,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDriver")
            .field("sessions", &self.sessions.len())
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
