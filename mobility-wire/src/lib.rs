//! Shared HTTP/JSON wire types for the mobility co-simulation protocol.
//!
//! This crate has no HTTP framework dependency of its own: it defines the
//! data that travels between the broker and simulator services (§3, §6 of
//! the protocol specification), leaving transport (`axum`, `reqwest`) to the
//! crates that actually speak HTTP.

mod control;
mod error;
mod event;
mod spec;
mod time;

pub use control::{
    BrokerPeekReply, BrokerSetupRequest, ErrorBody, MessageReply, PeekReply, ResultRecord,
    ServiceSetup, StepReply,
};
pub use error::{DispatchError, ProtocolError, RunError, RuntimeError, SetupError};
pub use event::{Event, EventType};
pub use spec::{EventFeatures, ServiceSpec};
pub use time::{peek_wire_to_time, time_to_peek_wire, Time};
