//! Domain layer - call session model and shared kernel

pub mod call;
pub mod session_log;
pub mod shared;
