//! Cloneable command surface for the orchestrator
//!
//! Wraps the command mailbox plus the status broadcaster. Precondition
//! violations come back synchronously; long-running operations (dial,
//! participant add, transfer) resolve when the control loop reaches a
//! terminal outcome or a deadline.

use crate::application::orchestrator::OrchestratorCommand;
use crate::domain::call::session::CallSessionSnapshot;
use crate::domain::call::transfer::TransferMode;
use crate::domain::session_log::SessionLogEntry;
use crate::domain::shared::error::CallError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::LegId;
use crate::interface::broadcaster::{SessionEvent, StatusBroadcaster};
use tokio::sync::{broadcast, mpsc, oneshot};

#[derive(Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::Sender<OrchestratorCommand>,
    broadcaster: StatusBroadcaster,
}

impl OrchestratorHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<OrchestratorCommand>,
        broadcaster: StatusBroadcaster,
    ) -> Self {
        Self {
            commands,
            broadcaster,
        }
    }

    /// Subscribe to the live status stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.broadcaster.subscribe()
    }

    pub async fn initiate_call(
        &self,
        destination: impl Into<String>,
        caller_id: Option<String>,
    ) -> Result<LegId> {
        let (responder, rx) = oneshot::channel();
        self.request(
            OrchestratorCommand::InitiateCall {
                destination: destination.into(),
                caller_id,
                responder,
            },
            rx,
        )
        .await
    }

    pub async fn accept_incoming(&self) -> Result<()> {
        let (responder, rx) = oneshot::channel();
        self.request(OrchestratorCommand::AcceptIncoming { responder }, rx)
            .await
    }

    pub async fn reject_incoming(&self) -> Result<()> {
        let (responder, rx) = oneshot::channel();
        self.request(OrchestratorCommand::RejectIncoming { responder }, rx)
            .await
    }

    pub async fn end_call(&self) -> Result<()> {
        let (responder, rx) = oneshot::channel();
        self.request(OrchestratorCommand::EndCall { responder }, rx)
            .await
    }

    /// Returns the confirmed hold state after the adapter acknowledges.
    pub async fn toggle_hold(&self) -> Result<bool> {
        let (responder, rx) = oneshot::channel();
        self.request(OrchestratorCommand::ToggleHold { responder }, rx)
            .await
    }

    /// Returns the confirmed mute state after the adapter acknowledges.
    pub async fn toggle_mute(&self) -> Result<bool> {
        let (responder, rx) = oneshot::channel();
        self.request(OrchestratorCommand::ToggleMute { responder }, rx)
            .await
    }

    pub async fn send_dtmf(&self, digit: char) -> Result<()> {
        let (responder, rx) = oneshot::channel();
        self.request(OrchestratorCommand::SendDtmf { digit, responder }, rx)
            .await
    }

    /// Resolves when the participant answers, or with
    /// `ParticipantNoAnswer`/`ParticipantRejected` otherwise.
    pub async fn add_participant(&self, destination: impl Into<String>) -> Result<LegId> {
        let (responder, rx) = oneshot::channel();
        self.request(
            OrchestratorCommand::AddParticipant {
                destination: destination.into(),
                responder,
            },
            rx,
        )
        .await
    }

    /// Resolves when the target answers (the call is handed over), or with
    /// `TransferNoAnswer`/`TransferRejected` after rollback otherwise.
    pub async fn transfer_call(
        &self,
        destination: impl Into<String>,
        mode: TransferMode,
    ) -> Result<LegId> {
        let (responder, rx) = oneshot::channel();
        self.request(
            OrchestratorCommand::TransferCall {
                destination: destination.into(),
                mode,
                responder,
            },
            rx,
        )
        .await
    }

    pub async fn snapshot(&self) -> Result<CallSessionSnapshot> {
        let (responder, rx) = oneshot::channel();
        self.request(OrchestratorCommand::GetSnapshot { responder }, rx)
            .await
    }

    pub async fn session_log(&self) -> Result<Vec<SessionLogEntry>> {
        let (responder, rx) = oneshot::channel();
        self.request(OrchestratorCommand::GetSessionLog { responder }, rx)
            .await
    }

    async fn request<T>(
        &self,
        command: OrchestratorCommand,
        rx: oneshot::Receiver<Result<T>>,
    ) -> Result<T> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CallError::Closed)?;
        rx.await.map_err(|_| CallError::Closed)?
    }
}
