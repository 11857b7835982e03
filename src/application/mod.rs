//! Application layer - the control loop and its collaborating services

pub mod orchestrator;
pub mod participants;
pub mod timers;
pub mod transfer;
