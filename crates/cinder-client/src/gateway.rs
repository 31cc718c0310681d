//! Remote calls the client depends on.
//!
//! [`NoteGateway`] is the seam between the state machines and whatever
//! carries the calls: QUIC in production, an in-process driver in
//! simulation, scripted fakes in tests. The [`wire`] helpers translate
//! between gateway values and protocol payloads so every frame-based
//! gateway shares one mapping.

use std::{fmt, future::Future, sync::Arc};

use cinder_core::{NoteId, Ttl};
use cinder_crypto::Passphrase;
use cinder_proto::ErrorPayload;
use thiserror::Error;

/// Everything needed to store one note.
///
/// Consumed by a single submission; the client keeps nothing of it afterwards
/// except the resulting id.
#[derive(Clone, PartialEq, Eq)]
pub struct CreateNoteRequest {
    /// Note text.
    pub plaintext: String,
    /// Key the server seals the note with.
    pub passphrase: Passphrase,
    /// Lifetime of the stored note.
    pub ttl: Ttl,
}

impl fmt::Debug for CreateNoteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateNoteRequest")
            .field("plaintext_len", &self.plaintext.len())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Result of a destructive read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The note's encrypted body. The note no longer exists on the server.
    Found(Vec<u8>),
    /// Never existed, already read, or expired. Indistinguishable by design.
    NotFound,
}

/// Result of a decrypt call.
#[derive(Clone, PartialEq, Eq)]
pub enum DecryptOutcome {
    /// Recovered note text.
    Plaintext(String),
    /// Wrong passphrase or tampered body.
    Rejected,
}

impl fmt::Debug for DecryptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plaintext(_) => f.write_str("Plaintext(..)"),
            Self::Rejected => f.write_str("Rejected"),
        }
    }
}

/// A remote call that did not produce an answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The server could not be reached or the connection dropped.
    #[error("server unreachable: {0}")]
    Unreachable(String),

    /// No response within the request timeout.
    #[error("request timed out")]
    Timeout,

    /// The server refused the request as invalid.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The server failed while handling the request.
    #[error("server error {code}: {message}")]
    Server {
        /// Wire error code
        code: u16,
        /// Server-supplied message
        message: String,
    },

    /// The response did not make sense for the request.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl GatewayError {
    /// Returns true if repeating the call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable(_) | Self::Timeout => true,
            Self::Server { code, .. } => matches!(
                *code,
                ErrorPayload::STORAGE_ERROR | ErrorPayload::INTERNAL
            ),
            Self::Rejected(_) | Self::Protocol(_) => false,
        }
    }
}

/// The four calls of the note service.
pub trait NoteGateway: Send + Sync {
    /// Store a note; returns its id.
    fn create_note(
        &self,
        request: &CreateNoteRequest,
    ) -> impl Future<Output = Result<NoteId, GatewayError>> + Send;

    /// Destructive read of a note.
    fn fetch_note(&self, id: NoteId) -> impl Future<Output = Result<FetchOutcome, GatewayError>> + Send;

    /// Decrypt a body. Touches no stored state; safe to repeat.
    fn decrypt(
        &self,
        body: &[u8],
        passphrase: &Passphrase,
    ) -> impl Future<Output = Result<DecryptOutcome, GatewayError>> + Send;

    /// Obtain a freshly generated passphrase.
    fn issue_key(&self) -> impl Future<Output = Result<Passphrase, GatewayError>> + Send;
}

impl<G: NoteGateway> NoteGateway for &G {
    fn create_note(
        &self,
        request: &CreateNoteRequest,
    ) -> impl Future<Output = Result<NoteId, GatewayError>> + Send {
        (**self).create_note(request)
    }

    fn fetch_note(&self, id: NoteId) -> impl Future<Output = Result<FetchOutcome, GatewayError>> + Send {
        (**self).fetch_note(id)
    }

    fn decrypt(
        &self,
        body: &[u8],
        passphrase: &Passphrase,
    ) -> impl Future<Output = Result<DecryptOutcome, GatewayError>> + Send {
        (**self).decrypt(body, passphrase)
    }

    fn issue_key(&self) -> impl Future<Output = Result<Passphrase, GatewayError>> + Send {
        (**self).issue_key()
    }
}

impl<G: NoteGateway> NoteGateway for Arc<G> {
    fn create_note(
        &self,
        request: &CreateNoteRequest,
    ) -> impl Future<Output = Result<NoteId, GatewayError>> + Send {
        (**self).create_note(request)
    }

    fn fetch_note(&self, id: NoteId) -> impl Future<Output = Result<FetchOutcome, GatewayError>> + Send {
        (**self).fetch_note(id)
    }

    fn decrypt(
        &self,
        body: &[u8],
        passphrase: &Passphrase,
    ) -> impl Future<Output = Result<DecryptOutcome, GatewayError>> + Send {
        (**self).decrypt(body, passphrase)
    }

    fn issue_key(&self) -> impl Future<Output = Result<Passphrase, GatewayError>> + Send {
        (**self).issue_key()
    }
}

/// Mapping between gateway values and protocol payloads.
pub mod wire {
    use cinder_core::NoteId;
    use cinder_crypto::Passphrase;
    use cinder_proto::{
        ErrorPayload, Payload,
        payloads::note::{CreateNote, Decrypt, FetchNote},
    };

    use super::{CreateNoteRequest, DecryptOutcome, FetchOutcome, GatewayError};

    /// Request payload for [`super::NoteGateway::create_note`].
    pub fn create_note_request(request: &CreateNoteRequest) -> Payload {
        Payload::CreateNote(CreateNote {
            note: request.plaintext.clone(),
            secret: request.passphrase.encode(),
            delete_after: request.ttl.to_string(),
        })
    }

    /// Interpret the response to a create request.
    pub fn note_created(response: Payload) -> Result<NoteId, GatewayError> {
        match response {
            Payload::NoteCreated(created) => NoteId::parse(&created.id)
                .map_err(|e| GatewayError::Protocol(format!("server returned bad id: {e}"))),
            Payload::Error(err) => Err(server_error(err)),
            other => Err(unexpected(&other)),
        }
    }

    /// Request payload for [`super::NoteGateway::fetch_note`].
    pub fn fetch_note_request(id: NoteId) -> Payload {
        Payload::FetchNote(FetchNote { id: id.to_string() })
    }

    /// Interpret the response to a fetch request.
    pub fn fetch_outcome(response: Payload) -> Result<FetchOutcome, GatewayError> {
        match response {
            Payload::NoteBody(body) => Ok(FetchOutcome::Found(body.body)),
            Payload::Error(err) if err.code == ErrorPayload::NOT_FOUND => {
                Ok(FetchOutcome::NotFound)
            },
            Payload::Error(err) => Err(server_error(err)),
            other => Err(unexpected(&other)),
        }
    }

    /// Request payload for [`super::NoteGateway::decrypt`].
    pub fn decrypt_request(body: &[u8], passphrase: &Passphrase) -> Payload {
        Payload::Decrypt(Decrypt { message: body.to_vec(), secret: passphrase.encode() })
    }

    /// Interpret the response to a decrypt request.
    pub fn decrypt_outcome(response: Payload) -> Result<DecryptOutcome, GatewayError> {
        match response {
            Payload::Plaintext(plaintext) => Ok(DecryptOutcome::Plaintext(plaintext.note)),
            Payload::Error(err) if err.code == ErrorPayload::DECRYPT_FAILED => {
                Ok(DecryptOutcome::Rejected)
            },
            Payload::Error(err) => Err(server_error(err)),
            other => Err(unexpected(&other)),
        }
    }

    /// Request payload for [`super::NoteGateway::issue_key`].
    pub fn issue_key_request() -> Payload {
        Payload::IssueKey
    }

    /// Interpret the response to a key request.
    pub fn issued_key(response: Payload) -> Result<Passphrase, GatewayError> {
        match response {
            Payload::IssuedKey(issued) => Passphrase::parse(&issued.secret)
                .map_err(|e| GatewayError::Protocol(format!("server issued bad key: {e}"))),
            Payload::Error(err) => Err(server_error(err)),
            other => Err(unexpected(&other)),
        }
    }

    fn server_error(err: ErrorPayload) -> GatewayError {
        if err.code == ErrorPayload::INVALID_REQUEST {
            GatewayError::Rejected(err.message)
        } else {
            GatewayError::Server { code: err.code, message: err.message }
        }
    }

    fn unexpected(payload: &Payload) -> GatewayError {
        GatewayError::Protocol(format!("unexpected response {:?}", payload.opcode()))
    }
}
