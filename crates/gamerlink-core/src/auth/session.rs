use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Identity attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct UserRef {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl UserRef {
    pub fn new(username: impl Into<String>, email: Option<String>) -> Self {
        Self {
            username: username.into(),
            email,
        }
    }

    /// Additive merge: present values overwrite, absent values never erase.
    /// Returns true if anything changed.
    pub fn merge(&mut self, username: Option<String>, email: Option<String>) -> bool {
        let mut changed = false;
        if let Some(username) = username.filter(|u| !u.is_empty()) {
            if username != self.username {
                self.username = username;
                changed = true;
            }
        }
        if let Some(email) = email.filter(|e| !e.is_empty()) {
            if self.email.as_deref() != Some(email.as_str()) {
                self.email = Some(email);
                changed = true;
            }
        }
        changed
    }
}

/// The persisted `{token, user, timestamp}` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: UserRef,
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Session {
    fn is_complete(&self) -> bool {
        !self.token.is_empty() && !self.user.username.is_empty()
    }
}

/// Owns the single session of a client and mirrors it to disk.
///
/// In-memory state is the source of truth for the running process; disk
/// failures are logged and never undo an in-memory change.
pub struct SessionStore {
    path: PathBuf,
    data: Option<Session>,
}

impl SessionStore {
    pub fn new(storage_dir: impl AsRef<Path>, storage_key: &str) -> Self {
        Self {
            path: storage_dir.as_ref().join(format!("{}.json", storage_key)),
            data: None,
        }
    }

    /// Create a store and populate it from disk
    pub fn open(storage_dir: impl AsRef<Path>, storage_key: &str) -> Self {
        let mut store = Self::new(storage_dir, storage_key);
        store.load();
        store
    }

    /// Load the persisted record. Returns whether a session was restored.
    pub fn load(&mut self) -> bool {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No persisted session");
                return false;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read session file");
                return false;
            }
        };

        match serde_json::from_str::<Session>(&contents) {
            Ok(session) if session.is_complete() => {
                debug!(username = %session.user.username, "Session restored");
                self.data = Some(session);
                true
            }
            Ok(_) => {
                warn!(path = %self.path.display(), "Ignoring incomplete session record");
                false
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to parse session file");
                false
            }
        }
    }

    /// Replace the session and persist it with a fresh timestamp
    pub fn save(&mut self, token: impl Into<String>, user: UserRef) {
        self.data = Some(Session {
            token: token.into(),
            user,
            created_at: Utc::now(),
        });
        self.persist();
    }

    /// Enrich the current user additively. The record is only rewritten
    /// when something changed.
    pub fn merge_user(&mut self, username: Option<String>, email: Option<String>) -> bool {
        let Some(session) = self.data.as_mut() else {
            return false;
        };
        if !session.user.merge(username, email) {
            return false;
        }
        session.created_at = Utc::now();
        self.persist();
        true
    }

    /// Overwrite the current user wholesale and persist
    pub fn replace_user(&mut self, user: UserRef) {
        if let Some(token) = self.token().map(str::to_string) {
            self.save(token, user);
        }
    }

    /// Drop the session and erase the persisted record
    pub fn clear(&mut self) {
        self.data = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Session file removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove session file"),
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.data.as_ref()
    }

    pub fn token(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.token.as_str())
    }

    pub fn user(&self) -> Option<&UserRef> {
        self.data.as_ref().map(|d| &d.user)
    }

    pub fn is_logged_in(&self) -> bool {
        self.data.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) {
        let Some(ref data) = self.data else {
            return;
        };
        if let Err(e) = self.write(data) {
            warn!(path = %self.path.display(), error = %e, "Failed to persist session");
        }
    }

    fn write(&self, data: &Session) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(data)?;
        std::fs::write(&self.path, contents)
    }
}
