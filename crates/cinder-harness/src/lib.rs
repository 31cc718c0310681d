//! Deterministic simulation harness for cinder.
//!
//! Runs the real [`ServerDriver`](cinder_server::ServerDriver) in-process
//! behind a [`NoteGateway`](cinder_client::NoteGateway), so client state
//! machines and the server exercise the real wire format without sockets.
//! Time is virtual and randomness is seeded, which makes TTL expiry and
//! fault schedules reproducible.
//!
//! # Components
//!
//! - [`SimEnv`]: manual clock and seeded RNG
//! - [`SimServer`]: shared driver with delivery bookkeeping
//! - [`LoopbackGateway`]: one simulated connection to a [`SimServer`]
//! - [`FaultyGateway`]: drops requests or responses on a seeded schedule
//!
//! # Invariant Testing
//!
//! The [`invariants`] module checks properties that must hold after any
//! sequence of operations, most importantly that no note body is ever
//! delivered twice. Use [`InvariantRegistry::standard()`] for the usual set.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod faulty;
pub mod invariants;
mod sim_env;
mod sim_server;

pub use faulty::{FaultPlan, FaultyGateway};
pub use invariants::{
    AtMostOneDelivery, FetchBound, Invariant, InvariantRegistry, InvariantResult,
    SessionSnapshot, SystemSnapshot, TerminalConsistency, Violation,
};
pub use sim_env::SimEnv;
pub use sim_server::{LoopbackGateway, SimServer};
