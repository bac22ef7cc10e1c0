//! The simulator-runtime contract (§4.B): the seam every concrete simulator
//! implements, and the seam [`mobility-sim-host`](https://docs.rs/mobility-sim-host)
//! is generic over.

use mobility_wire::{Event, RuntimeError, ServiceSpec, SetupError, Time};

/// The result of one [`SimulatorRuntime::step`]: the runtime's new clock
/// value and every event emitted while producing it (§4.B's "outbox").
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub now: Time,
    pub events: Vec<Event>,
}

/// The contract a concrete simulator implements over its embedded
/// [`EventQueue`](crate::queue::EventQueue), and that [`mobility-sim-host`]
/// hosts behind HTTP (§4.B.1).
///
/// Mirrors the teacher's `SimGen: FnMut() -> (SimInit, EndpointRegistry)`
/// pattern: a generic host (here, an `axum` service) is parameterized over
/// this trait rather than over a concrete simulator type.
pub trait SimulatorRuntime: Send {
    /// Declares this simulator's produced/consumed event types and required
    /// schema version (§4.E, `GET /spec`).
    fn spec(&self) -> ServiceSpec;

    /// Applies a service-specific configuration blob (`POST /setup`).
    fn setup(&mut self, config: serde_json::Value) -> Result<(), SetupError>;

    /// Arms the simulator (`POST /start`); no events are emitted yet.
    fn start(&mut self) -> Result<(), RuntimeError>;

    /// The time of this runtime's next scheduled event, or
    /// [`Time::INFINITY`] if idle (`GET /peek`); pure, idempotent (P3).
    fn peek(&self) -> Time;

    /// Pops and executes the earliest scheduled event, returning the new
    /// clock value and every event emitted while producing it (`POST
    /// /step`).
    ///
    /// # Errors
    ///
    /// [`RuntimeError::EmptyQueue`] if [`Self::peek`] is `Time::INFINITY`.
    fn step(&mut self) -> Result<StepOutcome, RuntimeError>;

    /// Ingests an externally delivered event (`POST /triggered`).
    ///
    /// Per §4.B, if this runtime's clock lags `event.time` it is first
    /// advanced to `event.time`; the runtime never advances *past*
    /// `event.time` while doing so. An implementation normally delegates to
    /// `self.queue_mut().advance_to(event.time)` before acting.
    fn triggered(&mut self, event: Event) -> Result<(), RuntimeError>;

    /// Tears down simulator-owned state (`POST /finish`). Idempotent: a
    /// second call after the first succeeds is a no-op success (P7's
    /// broker-level analogue applies to simulators too).
    fn finish(&mut self) -> Result<(), RuntimeError>;

    /// Repeatedly steps while `peek() < until` (§4.B `run_until`).
    ///
    /// The default only drains live work; it cannot also advance the idle
    /// clock to `until` since this trait does not expose the embedded
    /// queue generically. A concrete simulator that wants its clock to
    /// reach `until` even while idle (the common case) overrides this to
    /// finish with its own `queue.advance_to(until)`, as
    /// `OndemandSimulator` does.
    fn run_until(&mut self, until: Time) -> Result<Vec<Event>, RuntimeError> {
        let mut events = Vec::new();
        while self.peek() < until {
            let mut outcome = self.step()?;
            events.append(&mut outcome.events);
        }
        Ok(events)
    }
}
