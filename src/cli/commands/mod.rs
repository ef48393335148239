//! CLI command implementations.

pub mod corpus;
pub mod job;
