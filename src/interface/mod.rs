//! Interface layer - command/query surface and the status stream

pub mod broadcaster;
pub mod handle;
