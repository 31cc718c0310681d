//! Observable state captured for invariant checks.

use std::collections::HashMap;

use cinder_client::{NoteId, Retrieval, RetrievalState};
use cinder_server::NoteStore;

use crate::SimServer;

/// One viewer session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Note the session reads.
    pub note: NoteId,
    /// Visible state.
    pub state: RetrievalState,
    /// Fetches the session issued.
    pub fetch_requests: u32,
    /// Fetch bound the session was started with.
    pub max_fetch_attempts: u32,
    /// Whether the session ever held the note body.
    pub received_body: bool,
}

impl SessionSnapshot {
    /// Capture a retrieval machine.
    pub fn from_retrieval(machine: &Retrieval) -> Self {
        Self {
            note: machine.id(),
            state: machine.state().clone(),
            fetch_requests: machine.fetch_requests(),
            max_fetch_attempts: machine.max_fetch_attempts(),
            received_body: machine.has_body()
                || matches!(machine.state(), RetrievalState::Decrypted { .. }),
        }
    }
}

/// Everything the invariants look at.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Viewer sessions.
    pub sessions: Vec<SessionSnapshot>,
    /// Bodies the server handed out, per note.
    pub deliveries: HashMap<NoteId, usize>,
}

impl SystemSnapshot {
    /// Snapshot with no sessions and no deliveries.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Capture the server's delivery log and the given sessions.
    pub fn capture<S: NoteStore>(server: &SimServer<S>, sessions: &[&Retrieval]) -> Self {
        Self {
            sessions: sessions.iter().map(|m| SessionSnapshot::from_retrieval(m)).collect(),
            deliveries: server.deliveries(),
        }
    }
}
