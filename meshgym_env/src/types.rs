//! Common types exchanged across the agent boundary.

use crate::space::ObservationValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Snapshot produced by one environment step.
///
/// Has no identity beyond the exchange it belongs to: it is serialized to the
/// agent and dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Current observation (shape matches the declared observation space)
    pub observation: ObservationValue,

    /// Reward reported for this step
    pub reward: f32,

    /// True once the episode is over
    pub game_over: bool,

    /// Free-form diagnostic string
    pub extra_info: String,
}

/// Why a simulation session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum EndReason {
    /// The scheduler reached its stop time
    StopTimeReached,

    /// The environment reported game over
    GameOver,

    /// The agent asked the simulation to stop
    AgentStopped,

    /// The run aborted with an error
    Error(String),
}

impl EndReason {
    pub fn is_error(&self) -> bool {
        matches!(self, EndReason::Error(_))
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::StopTimeReached => f.write_str("stop time reached"),
            EndReason::GameOver => f.write_str("game over"),
            EndReason::AgentStopped => f.write_str("agent stopped"),
            EndReason::Error(msg) => write!(f, "error: {}", msg),
        }
    }
}
