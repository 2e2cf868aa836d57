//! Command handlers for scopeline.
//!
//! # Commands
//! - `scope`: live or offline oscilloscope (default)
//! - `config`: open the configuration file in the user's editor
//! - `list_devices`: list available audio input devices
//! - `logs`: display recent log entries

pub mod config;
pub mod list_devices;
pub mod logs;
pub mod scope;

pub use config::handle_config;
pub use list_devices::handle_list_devices;
pub use logs::handle_logs;
pub use scope::{handle_scope, ScopeArgs};
