//! Call domain model

pub mod leg;
pub mod session;
pub mod transfer;

pub use leg::{CallLeg, LegRole, LegState, ParticipantDisplayStatus};
pub use session::{
    CallDirection, CallSession, CallSessionSnapshot, CallStatus, ParticipantSnapshot,
};
pub use transfer::{TransferAttempt, TransferMode};
