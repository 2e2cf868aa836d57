//! Error kinds surfaced by the acquisition and buffering core.
//!
//! Viewport range problems are never errors; positions and widths are
//! clamped silently by the viewport rules instead.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScopeError {
    /// The input device could not be opened; acquisition never started.
    #[error("failed to open audio input: {0}")]
    HardwareOpen(String),

    /// A blocking read failed mid-session; the producer loop has exited.
    #[error("audio input read failed: {0}")]
    HardwareRead(String),

    /// A sample file was malformed, truncated or of the wrong type.
    /// The stream buffer is left untouched when this is returned.
    #[error("cannot load {path}: {reason}")]
    FileLoad { path: PathBuf, reason: String },

    #[error("cannot save {path}: {reason}")]
    FileSave { path: PathBuf, reason: String },

    #[error("acquisition is already running")]
    AlreadyRunning,

    #[error("unsupported trigger {setting} {value}; expected one of {allowed:?}")]
    UnsupportedTriggerSetting {
        setting: &'static str,
        value: u32,
        allowed: &'static [u32],
    },

    #[error("scope engine is no longer running")]
    EngineStopped,

    #[error("failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: &'static str,
        source: std::io::Error,
    },
}

impl ScopeError {
    pub(crate) fn file_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ScopeError::FileLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn file_save(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ScopeError::FileSave {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<cpal::BuildStreamError> for ScopeError {
    fn from(value: cpal::BuildStreamError) -> Self {
        ScopeError::HardwareOpen(value.to_string())
    }
}

impl From<cpal::PlayStreamError> for ScopeError {
    fn from(value: cpal::PlayStreamError) -> Self {
        ScopeError::HardwareOpen(value.to_string())
    }
}

impl From<cpal::StreamError> for ScopeError {
    fn from(value: cpal::StreamError) -> Self {
        ScopeError::HardwareRead(value.to_string())
    }
}
