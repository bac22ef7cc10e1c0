//! The global coordinator of the mobility co-simulation protocol (§2, §4.C–
//! §4.H): service directory, subscription registry, spec negotiator, broker
//! loop, event dispatcher, result sink, and HTTP control surface.

mod broker;
mod directory;
mod dispatcher;
mod error;
mod http;
mod negotiator;
mod registry;
mod result_writer;
mod state;

pub use broker::{Broker, InvalidTransition};
pub use directory::{Directory, ServiceDescriptor};
pub use error::ApiError;
pub use http::{router, SharedBroker};
pub use registry::SubscriptionRegistry;
pub use result_writer::ResultWriter;
pub use state::BrokerState;
