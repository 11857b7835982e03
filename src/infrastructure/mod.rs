//! Infrastructure layer - adapters to the signaling client and media router

pub mod media;
pub mod signaling;
