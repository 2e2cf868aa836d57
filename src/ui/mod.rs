//! Terminal screens.

pub mod error;
pub mod screen;

pub use error::report_fatal;
pub use screen::{ScopeCommand, ScopeTui, StatusLine};
