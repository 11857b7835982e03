//! Transfer attempt value objects

use crate::domain::call::leg::CallLeg;
use serde::{Deserialize, Serialize};

/// Transfer handshake variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    /// Redirect and abandon the original leg once the target answers.
    Blind,
    /// Connect to the target first; the original leg stays held and its
    /// final disposition is left to the signaling client.
    Attended,
}

/// A pending transfer: the dialed candidate plus the state needed to roll
/// the primary back if the candidate never answers.
#[derive(Debug, Clone)]
pub struct TransferAttempt {
    pub destination: String,
    pub mode: TransferMode,
    pub candidate: CallLeg,
    /// The primary's hold flag before the transfer placed it on hold.
    /// Rollback restores exactly this value.
    pub prior_primary_held: bool,
}

impl TransferAttempt {
    pub fn new(
        destination: impl Into<String>,
        mode: TransferMode,
        candidate: CallLeg,
        prior_primary_held: bool,
    ) -> Self {
        Self {
            destination: destination.into(),
            mode,
            candidate,
            prior_primary_held,
        }
    }
}
