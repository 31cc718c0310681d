//! Core types shared by the cinder server and client.
//!
//! - [`env::Environment`]: time and randomness, so every state machine can run
//!   against a deterministic simulation or the real system.
//! - [`NoteId`]: bearer identifier of a stored note.
//! - [`Ttl`]: validated note lifetime.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod env;
mod error;
mod note;

pub use error::CoreError;
pub use note::{NoteId, Ttl};
