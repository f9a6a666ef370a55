//! Configuration management for tapline.
//!
//! This module handles loading and saving configuration from `~/.tapline/`.

mod paths;
mod settings;

pub use paths::Paths;
pub use settings::{Config, StorageConfig, SyncConfig};
