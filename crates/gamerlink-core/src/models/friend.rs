use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A friend as reported by the backend.
///
/// Presence fields (online state, current game, elapsed time) are derived
/// server-side and passed through untouched. Fields this type does not name
/// are kept in `extra` so nothing the backend sends is lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Friend {
    #[serde(default)]
    pub gamertag: String,
    #[serde(rename = "isOnline", default)]
    pub is_online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "currentGame", default, skip_serializing_if = "Option::is_none")]
    pub current_game: Option<String>,
    #[serde(rename = "elapsedTime", default, skip_serializing_if = "Option::is_none")]
    pub elapsed_time: Option<String>,
    #[serde(flatten)]
    #[cfg_attr(feature = "ts", ts(skip))]
    pub extra: Map<String, Value>,
}

impl Friend {
    /// Short presence line for display
    pub fn presence_display(&self) -> String {
        match (self.is_online, &self.current_game, &self.elapsed_time) {
            (false, _, _) => self.status.clone().unwrap_or_else(|| "Offline".to_string()),
            (true, Some(game), Some(elapsed)) => format!("Playing {} ({})", game, elapsed),
            (true, Some(game), None) => format!("Playing {}", game),
            (true, None, _) => self.status.clone().unwrap_or_else(|| "Online".to_string()),
        }
    }
}

/// A game from the user's played-games list. Entries without a `title`
/// keep whatever the backend sent in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Game {
    #[serde(default)]
    pub title: String,
    #[serde(rename = "lastPlayed", default, skip_serializing_if = "Option::is_none")]
    pub last_played: Option<String>,
    #[serde(flatten)]
    #[cfg_attr(feature = "ts", ts(skip))]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_friend_round_trips_unknown_fields() {
        let raw = json!({"gamertag": "X", "isOnline": true, "gamerscore": 4200});
        let friend: Friend = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(friend.gamertag, "X");
        assert!(friend.is_online);
        assert_eq!(friend.extra.get("gamerscore"), Some(&json!(4200)));
        assert_eq!(serde_json::to_value(&friend).unwrap(), raw);
    }

    #[test]
    fn test_friend_presence_display() {
        let mut friend: Friend =
            serde_json::from_value(json!({"gamertag": "X", "isOnline": false})).unwrap();
        assert_eq!(friend.presence_display(), "Offline");

        friend.is_online = true;
        assert_eq!(friend.presence_display(), "Online");

        friend.current_game = Some("Halo Infinite".to_string());
        assert_eq!(friend.presence_display(), "Playing Halo Infinite");

        friend.elapsed_time = Some("1h 5m".to_string());
        assert_eq!(friend.presence_display(), "Playing Halo Infinite (1h 5m)");
    }

    #[test]
    fn test_game_minimal() {
        let game: Game = serde_json::from_value(json!({"title": "Forza"})).unwrap();
        assert_eq!(game.title, "Forza");
        assert_eq!(game.last_played, None);
        assert!(game.extra.is_empty());
    }

    #[test]
    fn test_items_without_names_pass_through() {
        let friend: Friend = serde_json::from_value(json!({"isOnline": false, "xuid": "42"})).unwrap();
        assert_eq!(friend.gamertag, "");
        assert_eq!(friend.extra.get("xuid"), Some(&json!("42")));

        let game: Game = serde_json::from_value(json!({"name": "Halo"})).unwrap();
        assert_eq!(game.title, "");
        assert_eq!(game.extra.get("name"), Some(&json!("Halo")));
    }
}
