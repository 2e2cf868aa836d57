//! Acquisition and buffering core.
//!
//! Owns the append-only stream buffer, the viewport rules that select and
//! decimate the visible window, sample file persistence, and the threads that
//! tie a [`crate::capture::SampleSource`] to all of it.

pub mod buffer;
pub mod error;
pub mod pipeline;
pub mod storage;
pub mod viewport;

pub use error::ScopeError;
pub use pipeline::{Scope, ScopeOptions};
pub use viewport::{PlotArea, ViewportSnapshot, ZoomDirection};
