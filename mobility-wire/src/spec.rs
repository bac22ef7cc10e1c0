//! The `GET /spec` contract (§4.E, §6): what a service produces and consumes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::event::EventType;

/// Per-event-type feature declaration: fields a producer declares it emits,
/// or fields a consumer requires to be emitted (§3 "Feature set per event
/// type").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFeatures {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub declared: BTreeSet<String>,
    #[serde(default)]
    pub required: BTreeSet<String>,
}

/// A service's declared event protocol, returned from `GET /spec` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Schema version. All configured services must agree (§4.E.2).
    pub version: String,
    pub events: Vec<EventFeatures>,
    #[serde(rename = "step_schema", default)]
    pub step_schema: Option<serde_json::Value>,
    #[serde(rename = "triggered_schema", default)]
    pub triggered_schema: Option<serde_json::Value>,
}

impl ServiceSpec {
    /// Event types this service produces: those with a non-empty `declared`
    /// set, or that appear only on the producing side of the protocol.
    pub fn produced_types(&self) -> impl Iterator<Item = &EventType> {
        self.events
            .iter()
            .filter(|e| !e.declared.is_empty())
            .map(|e| &e.event_type)
    }

    /// Event types this service consumes: those with a non-empty `required`
    /// set.
    pub fn consumed_types(&self) -> impl Iterator<Item = &EventType> {
        self.events
            .iter()
            .filter(|e| !e.required.is_empty())
            .map(|e| &e.event_type)
    }

    pub fn declared_fields(&self, event_type: &EventType) -> BTreeSet<String> {
        self.events
            .iter()
            .find(|e| &e.event_type == event_type)
            .map(|e| e.declared.clone())
            .unwrap_or_default()
    }

    pub fn required_fields(&self, event_type: &EventType) -> BTreeSet<String> {
        self.events
            .iter()
            .find(|e| &e.event_type == event_type)
            .map(|e| e.required.clone())
            .unwrap_or_default()
    }
}
