//! Request/response bodies for the HTTP control surface of §6.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::Event;
use crate::time::{time_to_peek_wire, Time};

/// `{message}` — the generic acknowledgement body for `/setup`, `/start`,
/// `/finish` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReply {
    pub message: String,
}

impl MessageReply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// `{next: number}` from a simulator's `GET /peek`, where `-1` denotes `+∞`
/// (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeekReply {
    pub next: f64,
}

impl PeekReply {
    pub fn from_time(t: Time) -> Self {
        Self {
            next: time_to_peek_wire(t),
        }
    }
}

/// `{now: number, events: Event[]}` from a simulator's `POST /step` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReply {
    pub now: f64,
    pub events: Vec<Event>,
}

/// Body of a service-scoped portion of the broker's `/setup` configuration.
///
/// The broker forwards `config` verbatim to the matching service's `/setup`
/// endpoint (§4.E.5); it is opaque to the broker itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSetup {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub writer_url: Option<String>,
    #[serde(default)]
    pub config: Value,
}

/// Body of `POST /setup` on the broker (§6): "global config including
/// per-service setup blobs".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSetupRequest {
    pub services: Vec<ServiceSetup>,
}

/// `{running, next, success}` from the broker's `GET /peek` (§4.F, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerPeekReply {
    pub running: bool,
    pub next: f64,
    pub success: bool,
}

/// A sequenced record wrapping one event as it is mirrored to an external
/// result sink (§3.1, ADDED): `{seqno, data}`, where `seqno` is a
/// process-wide monotonically increasing counter independent of virtual
/// time, letting an offline consumer reconstruct delivery order even after
/// re-sorting by `time`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    pub seqno: u64,
    pub data: Event,
}

/// A JSON error body returned on non-2xx HTTP responses, `{code, message}`,
/// the Rust-idiomatic analogue of the Python stack's pydantic validation
/// error bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}
