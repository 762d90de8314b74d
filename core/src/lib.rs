//! Shared data model, event streams, and error taxonomy for the netscan engine.

pub mod error;
pub mod events;
pub mod models;

pub use error::ScanError;

use std::fmt;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Host under scan (hostname or IP literal).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target(pub String);

impl From<&str> for Target {
    fn from(s: &str) -> Self {
        Target(s.to_string())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
