//! HTTP adapters for the external keyword-volume provider.

pub mod volume_provider;

pub use volume_provider::HttpVolumeProvider;
