//! meshgym Environment Abstraction Layer
//!
//! This crate defines everything that crosses the boundary between a running
//! mesh simulation and an external reinforcement-learning agent:
//!
//! - **Spaces**: [`SpaceDescriptor`] / [`SpaceValue`] tagged unions
//! - **Façade**: the [`EnvironmentHooks`] query trait and the
//!   [`ActionScheduler`] seam through which actions mutate the model
//! - **Protocol**: [`EnvMessage`] / [`AgentMessage`]
//! - **Transports**: in-process [`ChannelTransport`] and [`ZmqTransport`]
//!
//! # Step exchange
//!
//! ```text
//! simulation thread                        agent
//!   hooks.collect_step(model) ──State──►  policy(observation)
//!   blocks in exchange()      ◄─Action──
//!   hooks.execute_action(action, scheduler)
//! ```
//!
//! The simulation blocks for the whole exchange, so the agent sees exactly
//! one snapshot per action it returns.

mod error;
mod hooks;
pub mod protocol;
pub mod space;
mod transport;
mod types;
pub mod zmq_transport;

pub use error::EnvError;
pub use hooks::{ActionScheduler, DeferredAction, EnvironmentHooks};
pub use protocol::{AgentMessage, EnvMessage};
pub use space::{ActionValue, BoxData, Dtype, ObservationValue, SpaceDescriptor, SpaceValue};
pub use transport::{channel_pair, AgentEndpoint, AgentTransport, ChannelTransport};
pub use types::{EndReason, StepRecord};
#[cfg(feature = "zmq")]
pub use zmq_transport::ZmqAgentSocket;
pub use zmq_transport::ZmqTransport;
