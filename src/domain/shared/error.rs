//! Domain errors

use thiserror::Error;

/// Errors surfaced by the call session orchestrator.
///
/// Precondition violations (`InvalidState`, `NoActiveCall`,
/// `TransferInProgress`) are returned synchronously and have no side
/// effects. The answer/rejection variants resolve a pending operation
/// asynchronously, once the guarded leg reaches a terminal state or its
/// deadline fires.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("signaling client is not registered")]
    NotReady,

    #[error("no caller id available for outbound call")]
    NoCallerId,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("no active call")]
    NoActiveCall,

    #[error("a transfer is already in progress")]
    TransferInProgress,

    #[error("participant did not answer")]
    ParticipantNoAnswer,

    #[error("participant rejected the call")]
    ParticipantRejected,

    #[error("transfer target did not answer")]
    TransferNoAnswer,

    #[error("transfer target rejected the call")]
    TransferRejected,

    #[error("call ended during the operation")]
    CallEndedDuringOperation,

    #[error("adapter command failed: {0}")]
    AdapterCommandFailed(String),

    #[error("orchestrator is no longer running")]
    Closed,
}
