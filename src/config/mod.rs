//! Configuration management for scopeline.
//!
//! Loads and saves the TOML settings file in the user's config directory.

pub mod file;

pub use file::{config_path, ScopelineConfig};
