//! Error type shared by all browser-automation backends.

use std::time::Duration;
use thiserror::Error;

/// Result alias for driver calls.
pub type DriverResult<T> = Result<T, DriverError>;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("invalid selector \"{selector}\": {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("timed out after {}s waiting for {what}", .after.as_secs_f64())]
    Timeout { what: String, after: Duration },

    #[error("element is no longer attached to the page")]
    Detached,

    #[error("script execution failed: {0}")]
    Script(String),

    #[error("operation not supported by this driver: {0}")]
    Unsupported(&'static str),

    #[error("browser session crashed: {0}")]
    Crashed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// Shorthand for a timeout on `what`.
    pub fn timeout(what: impl Into<String>, after: Duration) -> Self {
        Self::Timeout { what: what.into(), after }
    }

    /// Returns true for errors that come from the page content rather than the session.
    pub fn is_dom_miss(&self) -> bool {
        matches!(self, Self::InvalidSelector { .. } | Self::Detached)
    }

    /// Returns true when the session can no longer be driven.
    pub fn is_session_lost(&self) -> bool {
        matches!(self, Self::Crashed(_) | Self::Launch(_))
    }
}
