//! The broker's state machine (§4.F):
//!
//! ```text
//! Unconfigured --setup--> Configured --start--> Started --run--> Running
//! Running --(idle)--> Idle --run--> Running
//! Running --(error)--> Failed
//! any --finish--> Stopped
//! ```

/// The broker's global simulation state (§3 "Global Simulation State").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    Unconfigured,
    Configured,
    Started,
    Running,
    Idle,
    Stopped,
    Failed,
}

impl BrokerState {
    /// Whether `/setup` is legal from this state.
    pub fn can_setup(self) -> bool {
        matches!(self, BrokerState::Unconfigured | BrokerState::Stopped)
    }

    /// Whether `/start` is legal from this state.
    pub fn can_start(self) -> bool {
        matches!(self, BrokerState::Configured)
    }

    /// Whether `/run` is legal from this state.
    pub fn can_run(self) -> bool {
        matches!(self, BrokerState::Started | BrokerState::Idle)
    }

    /// `/finish` is legal from any state (idempotent, P7).
    pub fn can_finish(self) -> bool {
        true
    }
}

impl Default for BrokerState {
    fn default() -> Self {
        BrokerState::Unconfigured
    }
}
