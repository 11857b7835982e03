//! Signaling client seam
//!
//! The signaling client is an opaque capability: it opens network call legs
//! and reports their progress as asynchronous events. The orchestrator never
//! sees protocol details, only leg handles and `(leg, event)` pairs.

pub mod loopback;

use crate::domain::call::leg::LegState;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::LegId;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Asynchronous per-leg notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegEvent {
    pub leg_id: LegId,
    pub kind: LegEventKind,
}

/// `LegState` has no mute dimension, so mute confirmations travel as their
/// own event kind on the same stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegEventKind {
    State(LegState),
    MuteChanged(bool),
}

impl LegEvent {
    pub fn state(leg_id: LegId, state: LegState) -> Self {
        Self {
            leg_id,
            kind: LegEventKind::State(state),
        }
    }

    pub fn mute_changed(leg_id: LegId, muted: bool) -> Self {
        Self {
            leg_id,
            kind: LegEventKind::MuteChanged(muted),
        }
    }
}

/// An inbound call offered by the network.
pub struct IncomingOffer {
    pub leg: Arc<dyn LegController>,
    pub remote_address: String,
}

impl fmt::Debug for IncomingOffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingOffer")
            .field("leg", &self.leg.id())
            .field("remote_address", &self.remote_address)
            .finish()
    }
}

/// Control surface of a single call leg.
///
/// A small closed set of operations; command rejections map to
/// `CallError::AdapterCommandFailed`. State changes caused by a command are
/// reported on the event stream, never implied by the command returning.
#[async_trait]
pub trait LegController: Send + Sync {
    fn id(&self) -> LegId;
    async fn answer(&self) -> Result<()>;
    async fn hangup(&self) -> Result<()>;
    async fn hold(&self) -> Result<()>;
    async fn unhold(&self) -> Result<()>;
    async fn mute(&self) -> Result<()>;
    async fn unmute(&self) -> Result<()>;
    async fn send_dtmf(&self, digit: char) -> Result<()>;
}

/// Factory for call legs.
///
/// `dial` returns once the signaling client has created the leg; the dial's
/// network progress (ringing, answer, failure) arrives as `LegEvent`s.
#[async_trait]
pub trait SignalingClient: Send + Sync {
    /// Whether the client is registered with its backend and able to dial.
    fn registered(&self) -> bool;

    async fn dial(&self, destination: &str, caller_id: &str) -> Result<Arc<dyn LegController>>;
}
