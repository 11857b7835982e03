//! Crate-wide result type

use crate::domain::shared::error::CallError;

/// Result alias used throughout the orchestrator.
pub type Result<T> = std::result::Result<T, CallError>;
