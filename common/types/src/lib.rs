use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current version of the `user_interactions` message schema.
/// Evolution is additive-only: new optional fields may be added, existing
/// fields are never removed or retyped. Consumers accept any version up to
/// the one they were built against and dead-letter anything newer.
pub const ACTION_SCHEMA_VERSION: u32 = 1;

/// Current version of the `event_similarity` message schema. Same
/// additive-only policy as [`ACTION_SCHEMA_VERSION`].
pub const SIMILARITY_SCHEMA_VERSION: u32 = 1;

/// Returns true if a message produced at `version` can be consumed by code
/// built against `supported`.
pub fn schema_compatible(version: u32, supported: u32) -> bool {
    (1..=supported).contains(&version)
}

/// Startup self-check for the additive-only evolution policy: current
/// messages must round-trip, a missing version must default, and unknown
/// fields from newer producers must be tolerated. Run by every service
/// before it touches a stream, so a breaking wire change fails the deploy
/// instead of poisoning a partition.
pub fn validate_wire_compat() -> Result<(), String> {
    let action = UserAction {
        version: ACTION_SCHEMA_VERSION,
        user_id: 1,
        event_id: 1,
        action: ActionType::View,
        timestamp: chrono::Utc::now(),
    };
    let mut value =
        serde_json::to_value(&action).map_err(|e| format!("action does not serialize: {e}"))?;
    let object = value
        .as_object_mut()
        .ok_or("action does not serialize to an object")?;
    object.remove("version");
    object.insert("__future_field".to_owned(), serde_json::json!(true));
    let decoded: UserAction = serde_json::from_value(value)
        .map_err(|e| format!("action wire format is not additive-compatible: {e}"))?;
    if decoded.version != ACTION_SCHEMA_VERSION || !decoded.is_compatible() {
        return Err("action version does not default to the current schema".to_owned());
    }

    let similarity = EventSimilarity::new(EventPair::new(1, 2), 0.0, chrono::Utc::now());
    let encoded = serde_json::to_string(&similarity)
        .map_err(|e| format!("similarity does not serialize: {e}"))?;
    let decoded: EventSimilarity = serde_json::from_str(&encoded)
        .map_err(|e| format!("similarity does not round-trip: {e}"))?;
    if !decoded.is_compatible() {
        return Err("similarity version is outside the supported range".to_owned());
    }

    Ok(())
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("{0} is not a valid action type")]
pub struct ParseActionTypeError(String);

/// The kind of interaction a user had with an event. Each type carries a
/// fixed weight, strictly increasing with engagement level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionType {
    View,
    Register,
    Like,
}

impl ActionType {
    pub fn weight(self) -> f64 {
        match self {
            ActionType::View => 0.4,
            ActionType::Register => 0.8,
            ActionType::Like => 1.0,
        }
    }
}

impl FromStr for ActionType {
    type Err = ParseActionTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_ref() {
            "VIEW" => Ok(ActionType::View),
            "REGISTER" => Ok(ActionType::Register),
            "LIKE" => Ok(ActionType::Like),
            invalid => Err(ParseActionTypeError(invalid.to_owned())),
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ActionType::View => write!(f, "VIEW"),
            ActionType::Register => write!(f, "REGISTER"),
            ActionType::Like => write!(f, "LIKE"),
        }
    }
}

fn action_schema_version() -> u32 {
    ACTION_SCHEMA_VERSION
}

fn similarity_schema_version() -> u32 {
    SIMILARITY_SCHEMA_VERSION
}

/// One observed interaction, as carried on the `user_interactions` topic.
/// Append-only input: never mutated once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAction {
    #[serde(default = "action_schema_version")]
    pub version: u32,
    pub user_id: i64,
    pub event_id: i64,
    pub action: ActionType,
    pub timestamp: DateTime<Utc>,
}

impl UserAction {
    /// Kafka partition key. Keying by user keeps all of one user's actions
    /// in a single partition, processed in arrival order by one consumer.
    pub fn partition_key(&self) -> String {
        self.user_id.to_string()
    }

    pub fn is_compatible(&self) -> bool {
        schema_compatible(self.version, ACTION_SCHEMA_VERSION)
    }
}

/// A canonically ordered pair of event ids: `first < second` always, so
/// (A,B) and (B,A) collapse to one key everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventPair {
    first: i64,
    second: i64,
}

impl EventPair {
    /// Callers must not pair an event with itself.
    pub fn new(a: i64, b: i64) -> Self {
        debug_assert_ne!(a, b, "an event cannot be paired with itself");
        if a < b {
            EventPair { first: a, second: b }
        } else {
            EventPair { first: b, second: a }
        }
    }

    pub fn first(&self) -> i64 {
        self.first
    }

    pub fn second(&self) -> i64 {
        self.second
    }

    /// Compaction key for the similarity topic: `"<min>:<max>"`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.first, self.second)
    }
}

/// Latest similarity score for a pair of events, as carried on the
/// log-compacted `event_similarity` topic and materialized by recs-api.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSimilarity {
    #[serde(default = "similarity_schema_version")]
    pub version: u32,
    pub event_a: i64,
    pub event_b: i64,
    pub score: f64,
    pub timestamp: DateTime<Utc>,
}

impl EventSimilarity {
    pub fn new(pair: EventPair, score: f64, timestamp: DateTime<Utc>) -> Self {
        EventSimilarity {
            version: SIMILARITY_SCHEMA_VERSION,
            event_a: pair.first(),
            event_b: pair.second(),
            score,
            timestamp,
        }
    }

    pub fn pair(&self) -> EventPair {
        EventPair::new(self.event_a, self.event_b)
    }

    /// Compaction key for the similarity topic.
    pub fn partition_key(&self) -> String {
        self.pair().key()
    }

    pub fn is_compatible(&self) -> bool {
        schema_compatible(self.version, SIMILARITY_SCHEMA_VERSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_increase_with_engagement() {
        assert!(ActionType::View.weight() < ActionType::Register.weight());
        assert!(ActionType::Register.weight() < ActionType::Like.weight());
    }

    #[test]
    fn action_type_round_trips_through_strings() {
        for (s, t) in [
            ("VIEW", ActionType::View),
            ("REGISTER", ActionType::Register),
            ("LIKE", ActionType::Like),
        ] {
            assert_eq!(s.parse::<ActionType>().unwrap(), t);
            assert_eq!(t.to_string(), s);
        }
        assert!("SHARE".parse::<ActionType>().is_err());
    }

    #[test]
    fn pair_is_always_ordered() {
        let p = EventPair::new(42, 7);
        assert_eq!(p.first(), 7);
        assert_eq!(p.second(), 42);
        assert_eq!(p, EventPair::new(7, 42));
        assert_eq!(p.key(), "7:42");
    }

    #[test]
    fn missing_version_defaults_to_current() {
        let action: UserAction = serde_json::from_str(
            r#"{"user_id":1,"event_id":10,"action":"VIEW","timestamp":"2024-03-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(action.version, ACTION_SCHEMA_VERSION);
        assert!(action.is_compatible());
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        // Additive evolution: a newer producer may add fields we don't know.
        let action: UserAction = serde_json::from_str(
            r#"{"version":1,"user_id":1,"event_id":10,"action":"LIKE","timestamp":"2024-03-01T12:00:00Z","origin":"mobile"}"#,
        )
        .unwrap();
        assert_eq!(action.action, ActionType::Like);
    }

    #[test]
    fn wire_compat_self_check_passes() {
        validate_wire_compat().unwrap();
    }

    #[test]
    fn newer_schema_versions_are_rejected() {
        let mut sim = EventSimilarity::new(EventPair::new(1, 2), 0.5, Utc::now());
        assert!(sim.is_compatible());
        sim.version = SIMILARITY_SCHEMA_VERSION + 1;
        assert!(!sim.is_compatible());
    }
}
