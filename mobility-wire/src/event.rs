//! The event wire schema (§3, §6).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::time::Time;

/// One of the closed set of event types named by §3, plus an escape hatch for
/// event types a given deployment adds without a protocol-level schema
/// change.
///
/// `EventType` round-trips through its wire string exactly (`DEMAND`,
/// `RESERVE`, …), including for `Other` variants, so an unrecognized type
/// name survives a broker hop unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    Demand,
    Reserve,
    Reserved,
    Depart,
    Departed,
    Arrived,
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::Demand => "DEMAND",
            EventType::Reserve => "RESERVE",
            EventType::Reserved => "RESERVED",
            EventType::Depart => "DEPART",
            EventType::Departed => "DEPARTED",
            EventType::Arrived => "ARRIVED",
            EventType::Other(s) => s,
        }
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        match s {
            "DEMAND" => EventType::Demand,
            "RESERVE" => EventType::Reserve,
            "RESERVED" => EventType::Reserved,
            "DEPART" => EventType::Depart,
            "DEPARTED" => EventType::Departed,
            "ARRIVED" => EventType::Arrived,
            other => EventType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(EventType::from(s.as_str()))
    }
}

/// An event as it travels over HTTP/JSON: `{eventType, time, source,
/// details}` (§6).
///
/// `source` names the emitting service. Per §6, the broker **overwrites**
/// `source` with the stepping service's directory name on every forward,
/// regardless of what a producer put there (§9 Open Questions resolves the
/// ambiguity in favor of the literal statement in §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "eventType")]
    pub event_type: EventType,
    pub time: Time,
    pub source: String,
    pub details: Value,
}

impl Event {
    pub fn new(event_type: impl Into<EventType>, time: Time, source: impl Into<String>, details: Value) -> Self {
        Self {
            event_type: event_type.into(),
            time,
            source: source.into(),
            details,
        }
    }

    /// Returns a copy of this event with `source` overwritten, the broker's
    /// forwarding behavior (§6).
    pub fn with_source(&self, source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..self.clone()
        }
    }
}
