//! The error taxonomy of §7, made concrete as Rust types.
//!
//! Each abstract kind in §7 becomes a `thiserror` variant (or, where a kind
//! covers several distinct structural shapes, its own enum). Transport
//! concerns (HTTP status mapping) live with the HTTP surfaces that use these
//! types (`mobility-broker`, `mobility-sim-host`), not here: this crate only
//! describes *what went wrong*.

use thiserror::Error;

/// Errors raised while negotiating and applying a `/setup` configuration
/// (§4.E, §7 `ConfigError` / `UnsatisfiedFeature`).
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("service '{name}' is missing from the configuration")]
    MissingService { name: String },

    #[error("service '{name}' could not be reached: {source}")]
    ServiceUnreachable {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(
        "schema version mismatch: '{a_name}' declares '{a_version}' but '{b_name}' declares '{b_version}'"
    )]
    SpecVersionMismatch {
        a_name: String,
        a_version: String,
        b_name: String,
        b_version: String,
    },

    #[error(
        "consumer '{consumer}' requires field '{field}' on event type '{event_type}' but no producer declares it"
    )]
    UnsatisfiedFeature {
        consumer: String,
        event_type: String,
        field: String,
    },

    #[error("malformed setup configuration: {0}")]
    Malformed(String),
}

/// Errors raised when a simulator service violates the peek/step contract
/// (§7 `ProtocolError`).
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("service '{name}' reported peek time {reported} after its previous peek {previous}, violating monotonicity (I2)")]
    NonMonotoneTime {
        name: String,
        previous: f64,
        reported: f64,
    },

    #[error("service '{name}' was stepped with an empty event queue")]
    StepOnEmptyQueue { name: String },

    #[error("service '{name}' did not respond after {attempts} attempts: {source}")]
    Unreachable {
        name: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("service '{name}' emitted event at time {event_time} before the current global clock {global_clock} (violates I3)")]
    FutureViolation {
        name: String,
        event_time: f64,
        global_clock: f64,
    },
}

/// Errors raised while fanning an event out to subscribers (§4.G, §7
/// `DispatchError`).
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("subscriber '{endpoint}' rejected event of type '{event_type}' after {attempts} attempts: {reason}")]
    Rejected {
        endpoint: String,
        event_type: String,
        attempts: u32,
        reason: String,
    },
}

/// The broker's top-level run error, covering every kind in §7 that aborts a
/// run (as opposed to `DomainError`, which is an application-level outcome
/// and never surfaces as a Rust `Error`).
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("{0}")]
    InvalidState(String),
}

/// Errors raised inside a simulator runtime (`mobility-kernel`'s
/// `SimulatorRuntime` trait and the kernel itself).
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("step() called with an empty event queue")]
    EmptyQueue,

    #[error("cannot advance to {target} because the clock is already at {current}")]
    TimeWentBackwards { current: f64, target: f64 },

    #[error("triggered() received an event at {event_time}, before the runtime's clock at {current}")]
    TriggeredInPast { current: f64, event_time: f64 },

    #[error("the simulator has not been started")]
    NotStarted,

    #[error("the simulator has already finished")]
    AlreadyFinished,

    #[error("no wait-condition named '{name}' is pending")]
    UnknownWaitCondition { name: String },
}
