//! Session persistence.
//!
//! This module provides:
//! - `Session`: the `{token, user, timestamp}` record issued at login
//! - `UserRef`: the identity attached to a session
//! - `SessionStore`: owner of the one session per client, mirrored to disk
//!
//! Sessions do not expire locally; only the backend decides when a token is
//! no longer valid.

pub mod session;

pub use session::{Session, SessionStore, UserRef};
