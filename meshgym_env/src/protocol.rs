//! Messages of the simulation ⇄ agent protocol.
//!
//! The simulation always speaks first and the agent answers exactly once:
//!
//! ```text
//! Simulation                                  Agent
//!   |-- Init { action_space, obs_space } ------->|
//!   |<------------------------------------ Ack --|
//!   |-- State { step, time, record } ----------->|   (once per step interval)
//!   |<------------------ Action | StopSimulation --|
//!   |   ...                                      |
//!   |-- SimulationEnd { reason } --------------->|
//!   |<------------------------------------ Ack --|
//! ```
//!
//! `Init` answers the agent's action/observation space queries, `State`
//! answers observation/reward/game-over/extra-info, the `Action` reply is the
//! execute-action request and `SimulationEnd` is the end-of-session notice.

use crate::error::EnvError;
use crate::space::{ActionValue, SpaceDescriptor};
use crate::types::{EndReason, StepRecord};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Message sent by the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnvMessage {
    Init {
        action_space: SpaceDescriptor,
        observation_space: SpaceDescriptor,
    },
    State {
        step: u64,
        time_secs: f64,
        record: StepRecord,
    },
    SimulationEnd {
        reason: EndReason,
        steps: u64,
        time_secs: f64,
    },
}

impl EnvMessage {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EnvMessage::Init { .. } => "init",
            EnvMessage::State { .. } => "state",
            EnvMessage::SimulationEnd { .. } => "simulation_end",
        }
    }
}

/// Reply sent by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AgentMessage {
    /// Acknowledges `Init` or `SimulationEnd`
    Ack,

    /// Action to apply for the current step
    Action(ActionValue),

    /// Asks the simulation to stop after this step
    StopSimulation,
}

impl AgentMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            AgentMessage::Ack => "ack",
            AgentMessage::Action(_) => "action",
            AgentMessage::StopSimulation => "stop_simulation",
        }
    }
}

/// Encodes a protocol message as JSON bytes.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EnvError> {
    Ok(serde_json::to_vec(message)?)
}

/// Decodes a protocol message from JSON bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, EnvError> {
    Ok(serde_json::from_slice(bytes)?)
}
