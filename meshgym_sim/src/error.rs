//! Error types for the simulation core.

use crate::config::ConfigError;
use meshgym_env::EnvError;
use std::time::Duration;
use thiserror::Error;

/// Errors that abort a simulation run.
#[derive(Debug, Error)]
pub enum SimError {
    /// An event was scheduled before the current virtual time
    #[error("Event scheduled at {at:?} but clock is already at {now:?}")]
    CausalityViolation { at: Duration, now: Duration },

    /// Periodic timers need a strictly positive interval
    #[error("Invalid timer interval: {0:?}")]
    InvalidInterval(Duration),

    /// A periodic timer fired while its previous firing was still running
    #[error("Timer {0} re-entered while still running")]
    ReentrantTimer(u64),

    /// Node id outside the scenario
    #[error("Unknown node: {0}")]
    UnknownNode(u32),

    /// Failure talking to the agent (fatal to the session)
    #[error("Environment error: {0}")]
    Environment(#[from] EnvError),

    /// Rejected configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
