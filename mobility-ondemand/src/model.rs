//! Static configuration for the on-demand simulator: the stop network, the
//! single vehicle's setting, and its service window — parsed from the
//! service-specific blob `POST /setup` carries (§6).
//!
//! Grounded in `test_integration.py`'s `Network`/`Trip`/`CarSetting`
//! fixtures (edge weights, `board_time`, `max_delay_time`, service window),
//! but not in any original controller source: the ondemand dispatch
//! algorithm itself is out-of-scope domain logic (§1), so only the
//! externally observable shape of its configuration is grounded here.

use std::collections::HashMap;

use mobility_wire::SetupError;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct EdgeConfig {
    pub a: String,
    pub b: String,
    pub minutes: f64,
}

/// An undirected weighted graph over stop ids (§3 "Network" fixture).
#[derive(Debug, Clone, Default)]
pub struct Network {
    edges: HashMap<(String, String), f64>,
}

impl Network {
    pub fn from_edges(edges: &[EdgeConfig]) -> Self {
        let mut network = Network::default();
        for edge in edges {
            network.edges.insert((edge.a.clone(), edge.b.clone()), edge.minutes);
            network.edges.insert((edge.b.clone(), edge.a.clone()), edge.minutes);
        }
        network
    }

    /// Direct travel time between two stops, or `None` if unconnected.
    pub fn travel_time(&self, from: &str, to: &str) -> Option<f64> {
        if from == to {
            return Some(0.0);
        }
        self.edges.get(&(from.to_string(), to.to_string())).copied()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetupConfig {
    pub mobility_id: String,
    pub capacity: u32,
    pub home_stop: String,
    pub board_time: f64,
    #[serde(default)]
    pub max_delay_time: f64,
    #[serde(default)]
    pub start_window: f64,
    pub end_window: f64,
    pub network: Vec<EdgeConfig>,
}

impl SetupConfig {
    pub fn parse(value: serde_json::Value) -> Result<Self, SetupError> {
        serde_json::from_value(value).map_err(|e| SetupError::Malformed(e.to_string()))
    }
}
