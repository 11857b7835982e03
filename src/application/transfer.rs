//! Transfer coordinator
//!
//! Owns the single pending transfer attempt: the dialed candidate leg, the
//! caller's responder and the pre-transfer hold snapshot. Promotion and
//! rollback side effects (hangups, media, unhold) are executed by the
//! control loop; the coordinator guarantees there is at most one attempt
//! and that it resolves exactly once.

use crate::domain::call::leg::CallLeg;
use crate::domain::call::transfer::TransferAttempt;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::LegId;
use tokio::sync::oneshot;
use tracing::debug;

type Responder = oneshot::Sender<Result<LegId>>;

pub struct PendingTransfer {
    pub attempt: TransferAttempt,
    responder: Responder,
}

impl PendingTransfer {
    /// Deliver the final outcome to the caller.
    pub fn resolve(self, result: Result<LegId>) {
        let _ = self.responder.send(result);
    }
}

#[derive(Default)]
pub struct TransferCoordinator {
    pending: Option<PendingTransfer>,
}

impl TransferCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_progress(&self) -> bool {
        self.pending.is_some()
    }

    /// Install a new attempt. The caller must have checked `in_progress`.
    pub fn begin(&mut self, attempt: TransferAttempt, responder: Responder) {
        debug_assert!(self.pending.is_none());
        debug!(
            "transfer to {} pending on candidate leg {}",
            attempt.destination, attempt.candidate.id
        );
        self.pending = Some(PendingTransfer { attempt, responder });
    }

    pub fn is_candidate(&self, leg_id: &LegId) -> bool {
        self.pending
            .as_ref()
            .map(|p| &p.attempt.candidate.id == leg_id)
            .unwrap_or(false)
    }

    pub fn candidate_mut(&mut self) -> Option<&mut CallLeg> {
        self.pending.as_mut().map(|p| &mut p.attempt.candidate)
    }

    /// Remove and return the pending attempt for promotion or rollback.
    /// Whoever takes it first (answer event, terminal event, deadline,
    /// cleanup) performs the resolution; later racers find nothing.
    pub fn take(&mut self) -> Option<PendingTransfer> {
        self.pending.take()
    }
}
