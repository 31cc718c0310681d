//! Single-flight passphrase issuance.
//!
//! The creation form wants a passphrase whenever its field is empty. Every
//! re-evaluation of that rule lands in [`Provisioner::evaluate`], which starts
//! an issuance only when none is in flight, so the form can re-check as often
//! as it likes without duplicate requests.

use cinder_crypto::Passphrase;

/// Requests for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionerAction {
    /// Ask the server for a fresh passphrase.
    IssueKey {
        /// Correlates the answer with this request.
        request_id: u64,
    },
}

/// Passphrase holder with at most one issuance in flight.
///
/// # Invariants
///
/// - At most one `IssueKey` is outstanding at any time.
/// - Answers for anything but the outstanding request are discarded.
/// - A user-supplied passphrase is never overwritten by an issued one.
#[derive(Debug, Default)]
pub struct Provisioner {
    held: Option<Passphrase>,
    in_flight: Option<u64>,
    reissue: bool,
    next_request_id: u64,
    issued_requests: u64,
}

impl Provisioner {
    /// Empty provisioner. Call [`Self::evaluate`] to start the first issuance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the trigger rule: empty and idle starts an issuance.
    pub fn evaluate(&mut self) -> Vec<ProvisionerAction> {
        if self.held.is_some() || self.in_flight.is_some() {
            return Vec::new();
        }
        self.issue()
    }

    /// An issuance succeeded.
    pub fn issued(&mut self, request_id: u64, passphrase: Passphrase) -> Vec<ProvisionerAction> {
        if self.in_flight != Some(request_id) {
            tracing::debug!(request_id, "discarding stale issued key");
            return Vec::new();
        }
        self.in_flight = None;

        if self.reissue {
            self.reissue = false;
            return self.issue();
        }
        if self.held.is_none() {
            self.held = Some(passphrase);
        }
        Vec::new()
    }

    /// An issuance failed. The passphrase stays empty and the next
    /// [`Self::evaluate`] tries again.
    pub fn issue_failed(&mut self, request_id: u64, reason: &str) -> Vec<ProvisionerAction> {
        if self.in_flight != Some(request_id) {
            return Vec::new();
        }
        self.in_flight = None;
        tracing::warn!(request_id, %reason, "key issuance failed");

        if self.reissue {
            self.reissue = false;
            return self.issue();
        }
        Vec::new()
    }

    /// Drop the held passphrase and get a fresh one.
    ///
    /// With an issuance in flight, its answer is discarded and exactly one new
    /// issuance starts when it resolves.
    pub fn clear(&mut self) -> Vec<ProvisionerAction> {
        self.held = None;
        if self.in_flight.is_some() {
            self.reissue = true;
            return Vec::new();
        }
        self.issue()
    }

    /// Use a passphrase the user typed. Wins over anything in flight.
    pub fn supply(&mut self, passphrase: Passphrase) {
        self.held = Some(passphrase);
        self.reissue = false;
    }

    /// Current passphrase, if any.
    pub fn passphrase(&self) -> Option<&Passphrase> {
        self.held.as_ref()
    }

    /// Whether an issuance is in flight.
    pub fn is_pending(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Issuances started so far.
    pub fn issued_requests(&self) -> u64 {
        self.issued_requests
    }

    fn issue(&mut self) -> Vec<ProvisionerAction> {
        self.next_request_id = self.next_request_id.wrapping_add(1);
        let request_id = self.next_request_id;
        self.in_flight = Some(request_id);
        self.issued_requests += 1;
        vec![ProvisionerAction::IssueKey { request_id }]
    }
}
