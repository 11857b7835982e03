//! palaver - call session orchestrator
//!
//! Drives a single live voice call through a pluggable signaling client:
//! outbound/inbound setup, hold/mute with confirmed state, DTMF,
//! conference participants with answer deadlines, blind and attended
//! transfer with rollback, and guaranteed idempotent teardown. All session
//! state is owned by one control-loop task; the rest of the program talks
//! to it through `OrchestratorHandle` and watches the broadcast status
//! stream.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

pub use application::orchestrator::CallOrchestrator;
pub use config::Config;
pub use domain::call::session::{CallSessionSnapshot, CallStatus};
pub use domain::call::transfer::TransferMode;
pub use domain::shared::error::CallError;
pub use domain::shared::result::Result;
pub use domain::shared::value_objects::LegId;
pub use interface::broadcaster::SessionEvent;
pub use interface::handle::OrchestratorHandle;
