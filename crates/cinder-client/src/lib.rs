//! Client
//!
//! Client-side state machines for cinder notes. A viewer fetches a note
//! exactly once and then decrypts the cached body as many times as it takes;
//! a creator obtains a passphrase, submits a note and gets a share link.
//!
//! # Architecture
//!
//! The state machines are Sans-IO: [`Retrieval`], [`Provisioner`] and
//! [`Composer`] take inputs and return actions for the caller to execute.
//! They never touch the network. The async runners in [`session`] execute
//! those actions against a [`NoteGateway`] and handle cancellation.
//!
//! # Components
//!
//! - [`Retrieval`]: fetch-once, decrypt-many viewer state machine
//! - [`Provisioner`]: single-flight passphrase issuance
//! - [`Composer`]: note creation form logic and share links
//! - [`NoteGateway`]: the four remote calls (create, fetch, decrypt, issue)
//! - [`session`]: async runners with cancellation
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, [`transport::QuicGateway`] implements
//! [`NoteGateway`] over QUIC.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod composer;
mod config;
mod error;
pub mod gateway;
mod provisioner;
mod retrieval;
pub mod session;

#[cfg(feature = "transport")]
pub mod transport;

pub use cinder_core::{NoteId, Ttl};
pub use cinder_crypto::Passphrase;
pub use composer::{Composer, ComposerAction, ComposerState, parse_share_link, share_link};
pub use config::ClientConfig;
pub use error::ClientError;
pub use gateway::{CreateNoteRequest, DecryptOutcome, FetchOutcome, GatewayError, NoteGateway};
pub use provisioner::{Provisioner, ProvisionerAction};
pub use retrieval::{DecryptFailure, Retrieval, RetrievalAction, RetrievalEvent, RetrievalState};
