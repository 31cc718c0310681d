//! Standard invariants.

use std::collections::HashMap;

use cinder_client::RetrievalState;

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// A note body is delivered at most once, and at most one session holds it.
pub struct AtMostOneDelivery;

impl Invariant for AtMostOneDelivery {
    fn name(&self) -> &'static str {
        "at_most_one_delivery"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        if let Some((note, count)) = state.deliveries.iter().find(|(_, count)| **count > 1) {
            return Err(Violation {
                invariant: self.name(),
                message: format!("note {note:?} delivered {count} times"),
            });
        }

        let mut holders = HashMap::new();
        for session in state.sessions.iter().filter(|s| s.received_body) {
            let count = holders.entry(session.note).or_insert(0usize);
            *count += 1;
            if *count > 1 {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("note {:?} held by {count} sessions", session.note),
                });
            }
        }

        Ok(())
    }
}

/// Sessions never issue more fetches than their bound.
pub struct FetchBound;

impl Invariant for FetchBound {
    fn name(&self) -> &'static str {
        "fetch_bound"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for session in &state.sessions {
            if session.fetch_requests > session.max_fetch_attempts {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "session for {:?} fetched {} times, bound {}",
                        session.note, session.fetch_requests, session.max_fetch_attempts
                    ),
                });
            }
        }
        Ok(())
    }
}

/// What a session shows agrees with what the server delivered.
///
/// A session holding a body implies a recorded delivery for its note; a
/// `Gone` session never held one.
pub struct TerminalConsistency;

impl Invariant for TerminalConsistency {
    fn name(&self) -> &'static str {
        "terminal_consistency"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for session in &state.sessions {
            let delivered = state.deliveries.get(&session.note).copied().unwrap_or(0);

            if session.received_body && delivered == 0 {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("session for {:?} holds an undelivered body", session.note),
                });
            }
            if session.state == RetrievalState::Gone && session.received_body {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("session for {:?} is gone but held the body", session.note),
                });
            }
        }
        Ok(())
    }
}
