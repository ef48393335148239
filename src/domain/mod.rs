//! Domain layer for the demand corpus pipeline
//!
//! Core models, the errors they raise, and the ports adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
