//! The per-simulator event-scheduling kernel and runtime contract (§4.A,
//! §4.B).
//!
//! Each simulator process embeds one [`EventQueue`] and implements
//! [`SimulatorRuntime`] over it; [`mobility-sim-host`] hosts any such
//! runtime behind the HTTP surface of §6.

mod queue;
mod runtime;

pub use queue::{EventKey, EventQueue, Fired};
pub use runtime::{SimulatorRuntime, StepOutcome};
