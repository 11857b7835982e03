//! Shared kernel - types used across all call modules

pub mod error;
pub mod result;
pub mod value_objects;
