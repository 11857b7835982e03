//! Call session aggregate
//!
//! The session is the orchestrator's aggregate view of one live call: the
//! primary leg, any conference participants, a possible pending transfer
//! and the user-facing mute/hold flags. It is owned and mutated by exactly
//! one control loop; everything here is plain synchronous state.

use crate::domain::call::leg::{CallLeg, LegState, ParticipantDisplayStatus};
use crate::domain::shared::value_objects::{LegId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Call direction from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

/// Aggregate session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// No call in progress
    Idle,
    /// Inbound offer waiting for accept/reject
    Incoming,
    /// Outbound dial issued, no progress report yet
    Connecting,
    /// Remote endpoint is being alerted
    Ringing,
    /// Two-party call with media flowing
    Active,
    /// Primary leg on hold
    Held,
    /// Primary active with at least one participant attached
    Conference,
    /// A transfer attempt is pending
    Transferring,
    /// Primary hung up, teardown grace period running
    Ending,
    /// Terminal snapshot emitted just before the session resets to idle
    Ended,
}

impl CallStatus {
    /// States in which the duration counter advances.
    pub fn counts_duration(&self) -> bool {
        matches!(self, CallStatus::Active | CallStatus::Conference)
    }
}

/// The orchestrator's aggregate view of the current call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    pub id: SessionId,
    pub status: CallStatus,
    pub direction: Option<CallDirection>,
    /// Present in every status except `Idle`/`Ended`.
    pub primary: Option<CallLeg>,
    /// Conference participants, in add order.
    pub participants: Vec<CallLeg>,
    /// Legs the session still owns but no longer drives (the deposed
    /// primary after an attended transfer). Torn down with the session.
    pub parked: Vec<CallLeg>,
    /// Mirrors the existence of a pending transfer attempt.
    pub transferring: bool,
    pub muted: bool,
    pub held: bool,
    /// Monotonic while Active/Conference, frozen otherwise.
    pub duration_seconds: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub answered_at: Option<DateTime<Utc>>,
}

impl Default for CallSession {
    fn default() -> Self {
        Self {
            id: SessionId::new(),
            status: CallStatus::Idle,
            direction: None,
            primary: None,
            participants: Vec::new(),
            parked: Vec::new(),
            transferring: false,
            muted: false,
            held: false,
            duration_seconds: 0,
            started_at: None,
            answered_at: None,
        }
    }
}

impl CallSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        self.status == CallStatus::Idle
    }

    /// Start an outbound session around a freshly dialed primary leg.
    pub fn begin_outbound(&mut self, primary: CallLeg) {
        self.id = SessionId::new();
        self.status = CallStatus::Connecting;
        self.direction = Some(CallDirection::Outbound);
        self.primary = Some(primary);
        self.started_at = Some(Utc::now());
    }

    /// Start an inbound session around an offered leg.
    pub fn begin_inbound(&mut self, primary: CallLeg) {
        self.id = SessionId::new();
        self.status = CallStatus::Incoming;
        self.direction = Some(CallDirection::Inbound);
        self.primary = Some(primary);
        self.started_at = Some(Utc::now());
    }

    pub fn is_primary(&self, leg_id: &LegId) -> bool {
        self.primary.as_ref().map(|p| &p.id == leg_id).unwrap_or(false)
    }

    pub fn primary_state(&self) -> Option<LegState> {
        self.primary.as_ref().map(|p| p.state)
    }

    /// The primary is live and unheld.
    pub fn primary_is_active(&self) -> bool {
        self.primary_state() == Some(LegState::Active)
    }

    /// The primary has answered (active or held).
    pub fn primary_is_established(&self) -> bool {
        self.primary_state().map(|s| s.is_established()).unwrap_or(false)
    }

    pub fn mark_answered(&mut self) {
        if self.answered_at.is_none() {
            self.answered_at = Some(Utc::now());
        }
    }

    pub fn find_participant_mut(&mut self, leg_id: &LegId) -> Option<&mut CallLeg> {
        self.participants.iter_mut().find(|p| &p.id == leg_id)
    }

    pub fn is_participant(&self, leg_id: &LegId) -> bool {
        self.participants.iter().any(|p| &p.id == leg_id)
    }

    /// Remove a participant leg. Remaining entries keep their add order.
    pub fn remove_participant(&mut self, leg_id: &LegId) -> Option<CallLeg> {
        let idx = self.participants.iter().position(|p| &p.id == leg_id)?;
        Some(self.participants.remove(idx))
    }

    pub fn park(&mut self, leg: CallLeg) {
        self.parked.push(leg);
    }

    pub fn is_parked(&self, leg_id: &LegId) -> bool {
        self.parked.iter().any(|p| &p.id == leg_id)
    }

    pub fn remove_parked(&mut self, leg_id: &LegId) -> Option<CallLeg> {
        let idx = self.parked.iter().position(|p| &p.id == leg_id)?;
        Some(self.parked.remove(idx))
    }

    /// Re-derive the aggregate status from the established-phase flags.
    ///
    /// Only applies once the call has left its setup phase; pre-answer
    /// statuses (Incoming/Connecting/Ringing) and the teardown statuses
    /// are assigned explicitly by the control loop.
    pub fn recompute_status(&mut self) {
        if matches!(
            self.status,
            CallStatus::Idle | CallStatus::Ending | CallStatus::Ended
        ) {
            return;
        }
        let Some(primary) = &self.primary else {
            return;
        };
        if self.transferring {
            self.status = CallStatus::Transferring;
            return;
        }
        match primary.state {
            LegState::Active => {
                self.status = if self.participants.is_empty() {
                    CallStatus::Active
                } else {
                    CallStatus::Conference
                };
            }
            LegState::Held => self.status = CallStatus::Held,
            // Setup and terminal phases keep their explicit status.
            _ => {}
        }
    }

    /// Full read-only view emitted on the status stream.
    pub fn snapshot(&self) -> CallSessionSnapshot {
        CallSessionSnapshot {
            session_id: self.id,
            status: self.status,
            direction: self.direction,
            remote_address: self.primary.as_ref().map(|p| p.remote_address.clone()),
            duration_seconds: self.duration_seconds,
            muted: self.muted,
            held: self.held,
            participants: self
                .participants
                .iter()
                .map(|p| ParticipantSnapshot {
                    leg_id: p.id.clone(),
                    remote_address: p.remote_address.clone(),
                    status: p.display_status(),
                })
                .collect(),
        }
    }

    /// Return the session to idle. Only the cleanup routine calls this.
    pub fn reset(&mut self) {
        *self = CallSession::default();
    }
}

/// Read-only participant view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantSnapshot {
    pub leg_id: LegId,
    pub remote_address: String,
    pub status: ParticipantDisplayStatus,
}

/// Full session view emitted to the presentation layer on every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSessionSnapshot {
    pub session_id: SessionId,
    pub status: CallStatus,
    pub direction: Option<CallDirection>,
    pub remote_address: Option<String>,
    pub duration_seconds: u64,
    pub muted: bool,
    pub held: bool,
    pub participants: Vec<ParticipantSnapshot>,
}
