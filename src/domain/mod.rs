//! Domain layer types and invariants.

pub mod compilation;
pub mod error;
pub mod job;
