//! Adapters for storage and the external provider.

pub mod http;
pub mod memory;
pub mod sqlite;
