//! Note creation form.

use cinder_core::{NoteId, Ttl};

use crate::{
    error::ClientError,
    gateway::{CreateNoteRequest, GatewayError},
    provisioner::{Provisioner, ProvisionerAction},
};

/// Where the form is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposerState {
    /// Accepting input.
    Editing,
    /// A create request is in flight.
    Submitting,
    /// The note is stored.
    Created {
        /// Id of the stored note.
        id: NoteId,
        /// Link to hand to the recipient.
        link: String,
    },
    /// The create request failed; the input is kept for another try.
    Failed {
        /// Failure description.
        reason: String,
    },
}

/// Requests for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposerAction {
    /// Send a create request.
    SubmitNote(CreateNoteRequest),
}

/// Creation form: note text, lifetime and a provisioned passphrase.
#[derive(Debug)]
pub struct Composer {
    note: String,
    ttl: Ttl,
    provisioner: Provisioner,
    share_base_url: String,
    state: ComposerState,
}

impl Composer {
    /// Empty form producing links under `share_base_url`.
    pub fn new(share_base_url: impl Into<String>) -> Self {
        Self {
            note: String::new(),
            ttl: Ttl::default(),
            provisioner: Provisioner::new(),
            share_base_url: share_base_url.into(),
            state: ComposerState::Editing,
        }
    }

    /// Replace the note text.
    pub fn set_note(&mut self, note: impl Into<String>) {
        self.note = note.into();
    }

    /// Choose the note lifetime.
    pub fn set_ttl(&mut self, ttl: Ttl) {
        self.ttl = ttl;
    }

    /// Build the create request.
    ///
    /// # Errors
    ///
    /// - `ClientError::AlreadySubmitting` while a request is in flight
    /// - `ClientError::AlreadyCreated` once the note is stored, until
    ///   [`Self::reset`]
    /// - `ClientError::EmptyNote` if the text is blank
    /// - `ClientError::NoPassphrase` if no passphrase is held yet
    pub fn submit(&mut self) -> Result<ComposerAction, ClientError> {
        match self.state {
            ComposerState::Submitting => return Err(ClientError::AlreadySubmitting),
            ComposerState::Created { .. } => return Err(ClientError::AlreadyCreated),
            ComposerState::Editing | ComposerState::Failed { .. } => {},
        }
        if self.note.trim().is_empty() {
            return Err(ClientError::EmptyNote);
        }
        let passphrase = self.provisioner.passphrase().cloned().ok_or(ClientError::NoPassphrase)?;

        self.state = ComposerState::Submitting;
        Ok(ComposerAction::SubmitNote(CreateNoteRequest {
            plaintext: self.note.clone(),
            passphrase,
            ttl: self.ttl,
        }))
    }

    /// The server stored the note. Returns the share link.
    ///
    /// The plaintext is dropped; only the id and link remain.
    pub fn created(&mut self, id: NoteId) -> String {
        self.note = String::new();
        let link = share_link(&self.share_base_url, id);
        self.state = ComposerState::Created { id, link: link.clone() };
        link
    }

    /// The create request failed.
    pub fn create_failed(&mut self, error: &GatewayError) {
        tracing::warn!(%error, "note creation failed");
        self.state = ComposerState::Failed { reason: error.to_string() };
    }

    /// Start over with an empty note and a fresh passphrase.
    pub fn reset(&mut self) -> Vec<ProvisionerAction> {
        self.note.clear();
        self.ttl = Ttl::default();
        self.state = ComposerState::Editing;
        self.provisioner.clear()
    }

    /// Current form state.
    pub fn state(&self) -> &ComposerState {
        &self.state
    }

    /// Current note text.
    pub fn note(&self) -> &str {
        &self.note
    }

    /// Selected lifetime.
    pub fn ttl(&self) -> Ttl {
        self.ttl
    }

    /// Passphrase source for this form.
    pub fn provisioner(&self) -> &Provisioner {
        &self.provisioner
    }

    /// Mutable passphrase source, for feeding issuance results.
    pub fn provisioner_mut(&mut self) -> &mut Provisioner {
        &mut self.provisioner
    }
}

/// Link under which a recipient reads `id`.
pub fn share_link(base: &str, id: NoteId) -> String {
    format!("{}/notes/{id}", base.trim_end_matches('/'))
}

/// Extract the note id from a share link or a bare id.
///
/// # Errors
///
/// - `ClientError::InvalidLink` if no id can be found
pub fn parse_share_link(text: &str) -> Result<NoteId, ClientError> {
    let without_query = text.trim().split(['?', '#']).next().unwrap_or_default();
    let path = without_query.trim_end_matches('/');
    let candidate = path.rsplit('/').next().unwrap_or(path);

    NoteId::parse(candidate).map_err(|_| ClientError::InvalidLink(text.trim().to_string()))
}
