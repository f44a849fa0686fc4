use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// Server-maintained collections the client can read and refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Friends,
    Games,
    Profile,
    /// Legacy alias. The backend no longer serves mutes.
    Mutes,
}

impl Collection {
    /// Collections the backend still serves
    pub const AVAILABLE: [Collection; 3] = [Collection::Friends, Collection::Games, Collection::Profile];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Friends => "friends",
            Collection::Games => "games",
            Collection::Profile => "profile",
            Collection::Mutes => "mutes",
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, Collection::Mutes)
    }

    /// Message used when a legacy collection is requested
    pub fn unavailable_message(&self) -> String {
        let mut name = self.as_str().to_string();
        if let Some(first) = name.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        format!("{} are no longer available", name)
    }

    /// Default message for a failed refresh
    pub fn refresh_failed_message(&self) -> String {
        format!("Failed to refresh {}", self.as_str())
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "friends" => Ok(Collection::Friends),
            "games" => Ok(Collection::Games),
            "profile" => Ok(Collection::Profile),
            "mutes" => Ok(Collection::Mutes),
            other => Err(format!("Unknown collection: {}", other)),
        }
    }
}

/// A snapshot of one server-cached collection.
///
/// The client never caches these itself; every accessor call fetches a fresh
/// snapshot from the backend's cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct CollectionSnapshot<T> {
    pub items: Vec<T>,
    #[serde(rename = "lastUpdated")]
    pub last_updated: Option<DateTime<Utc>>,
    pub count: u64,
}

impl<T> Default for CollectionSnapshot<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            last_updated: None,
            count: 0,
        }
    }
}

impl<T: DeserializeOwned> CollectionSnapshot<T> {
    /// Normalize a backend response body into a snapshot.
    ///
    /// Items are read from the field named after the collection, or from the
    /// body itself when the backend sends a bare array. Missing
    /// fields default: no items, `count` 0, no `lastUpdated`. The backend's
    /// `count` is kept as sent, even if it disagrees with the item count.
    pub fn from_response(kind: Collection, body: &Value) -> Result<Self, serde_json::Error> {
        let items = match body {
            Value::Array(items) => items.clone(),
            _ => match body.get(kind.as_str()) {
                Some(Value::Array(items)) => items.clone(),
                Some(obj @ Value::Object(_)) => vec![obj.clone()],
                _ => Vec::new(),
            },
        };

        let items: Vec<T> = serde_json::from_value(Value::Array(items))?;
        let count = body.get("count").and_then(Value::as_u64).unwrap_or(0);
        let last_updated = body.get("lastUpdated").and_then(parse_timestamp);

        Ok(Self {
            items,
            last_updated,
            count,
        })
    }
}

impl<T> CollectionSnapshot<T> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Accepts RFC 3339 strings or epoch milliseconds
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}
