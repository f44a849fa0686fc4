//! Public error taxonomy for session client operations.

use thiserror::Error;

/// Errors surfaced by [`SessionClient`](crate::SessionClient).
///
/// Only `login` and the `refresh_*` family return these to callers. Read
/// accessors and `verify_session` resolve to sentinels instead and report
/// failures through the `error` event.
#[derive(Debug, Error)]
pub enum Error {
    /// The backend rejected the credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Network failure or an unparseable response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The session is no longer accepted (failed verify or HTTP 401).
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    /// The backend could not produce the requested data.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Check if this error means the stored session has been discarded.
    pub fn is_invalid_session(&self) -> bool {
        matches!(self, Error::InvalidSession(_))
    }

    /// The human-readable message without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            Error::Auth(m)
            | Error::Transport(m)
            | Error::InvalidSession(m)
            | Error::Unavailable(m)
            | Error::Config(m) => m,
        }
    }
}

/// Result type for session client operations.
pub type Result<T> = std::result::Result<T, Error>;
