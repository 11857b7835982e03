//! Participant registry
//!
//! Tracks the in-flight `add_participant` dials: the caller's pending
//! responder, keyed by the dialed leg. The settled participant legs
//! themselves live in the session aggregate (in add order); this registry
//! only owns the resolution of the asynchronous add operation.
//!
//! A dialed leg is registered before any progress event can arrive, so a
//! concurrent `end_call` is guaranteed to find and tear it down.

use crate::domain::shared::error::CallError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::LegId;
use std::collections::HashMap;
use tokio::sync::oneshot;
use tracing::{debug, warn};

type Responder = oneshot::Sender<Result<LegId>>;

#[derive(Default)]
pub struct ParticipantRegistry {
    pending: HashMap<LegId, Responder>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly dialed participant leg.
    pub fn register(&mut self, leg_id: LegId, responder: Responder) {
        debug!("participant dial pending for leg {}", leg_id);
        self.pending.insert(leg_id, responder);
    }

    pub fn is_pending(&self, leg_id: &LegId) -> bool {
        self.pending.contains_key(leg_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Resolve a pending add successfully. Returns false if the leg was not
    /// pending (deadline or terminal event won the race earlier).
    pub fn resolve_answered(&mut self, leg_id: &LegId) -> bool {
        match self.pending.remove(leg_id) {
            Some(responder) => {
                if responder.send(Ok(leg_id.clone())).is_err() {
                    warn!("participant add resolved but caller went away: {}", leg_id);
                }
                true
            }
            None => false,
        }
    }

    /// Reject a pending add. Returns false if the leg was not pending.
    pub fn reject(&mut self, leg_id: &LegId, error: CallError) -> bool {
        match self.pending.remove(leg_id) {
            Some(responder) => {
                debug!("participant add for leg {} rejected: {}", leg_id, error);
                let _ = responder.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Reject every in-flight add; cleanup leaves no dangling promise.
    /// Returns the legs that were still pending so the caller can tear the
    /// dials down.
    pub fn drain_rejecting(&mut self, error: CallError) -> Vec<LegId> {
        let mut legs = Vec::with_capacity(self.pending.len());
        for (leg_id, responder) in self.pending.drain() {
            debug!("rejecting in-flight participant add for leg {}", leg_id);
            let _ = responder.send(Err(error.clone()));
            legs.push(leg_id);
        }
        legs
    }
}
