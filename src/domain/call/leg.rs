//! Call leg - a single network call endpoint

use crate::domain::shared::value_objects::LegId;
use serde::{Deserialize, Serialize};

/// Role a leg plays within the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegRole {
    /// The leg representing "the call" from the user's perspective
    Primary,
    /// An additional leg attached for a multi-party conference
    Participant,
    /// A leg dialed as the target of a pending transfer
    TransferCandidate,
}

/// Leg state as reported by the signaling client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegState {
    /// Outbound dial in progress
    Dialing,
    /// Remote endpoint is being alerted
    Ringing,
    /// Media is flowing
    Active,
    /// Leg is on hold
    Held,
    /// Remote or local hangup observed
    Hangup,
    /// The signaling client destroyed the leg (hard terminal)
    Destroyed,
    /// Leg setup or signaling failed
    Failed,
}

impl LegState {
    /// Terminal states never transition back to a live state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LegState::Hangup | LegState::Destroyed | LegState::Failed)
    }

    /// A leg is established once it has answered, held or not.
    pub fn is_established(&self) -> bool {
        matches!(self, LegState::Active | LegState::Held)
    }
}

/// Display status derived for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantDisplayStatus {
    Dialing,
    Ringing,
    Connected,
    Disconnected,
}

impl From<LegState> for ParticipantDisplayStatus {
    fn from(state: LegState) -> Self {
        match state {
            LegState::Dialing => ParticipantDisplayStatus::Dialing,
            LegState::Ringing => ParticipantDisplayStatus::Ringing,
            LegState::Active | LegState::Held => ParticipantDisplayStatus::Connected,
            LegState::Hangup | LegState::Destroyed | LegState::Failed => {
                ParticipantDisplayStatus::Disconnected
            }
        }
    }
}

/// A single network call endpoint tracked by the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLeg {
    pub id: LegId,
    pub role: LegRole,
    pub remote_address: String,
    pub state: LegState,
    pub media_attached: bool,
}

impl CallLeg {
    /// Create a freshly dialed leg.
    pub fn new(id: LegId, role: LegRole, remote_address: impl Into<String>) -> Self {
        Self {
            id,
            role,
            remote_address: remote_address.into(),
            state: LegState::Dialing,
            media_attached: false,
        }
    }

    /// Promote this leg to the primary role (transfer completion).
    pub fn promote_to_primary(&mut self) {
        self.role = LegRole::Primary;
    }

    pub fn display_status(&self) -> ParticipantDisplayStatus {
        self.state.into()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
