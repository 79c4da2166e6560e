//! meshgym Deterministic Mesh Simulation
//!
//! This crate runs a wireless ad-hoc mesh (mobile nodes, range-based links,
//! shortest-hop routing, CBR traffic) on a single-threaded discrete-event
//! scheduler and, optionally, exposes it to a reinforcement-learning agent
//! as a step-synchronized environment.
//!
//! # Core Principle: One Clock, One Writer
//!
//! - **Time**: a virtual clock that only moves when the scheduler pops the
//!   next event; events at equal times run in scheduling order
//! - **State**: the [`Scenario`] is lent to one callback at a time
//! - **Randomness**: all entropy derived from a `(global seed, run)` pair,
//!   one stream per subsystem
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Scheduler<Scenario>                        │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ EventQueue: (time, sequence) → callback              │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │      │ mobility      │ routing      │ traffic    │ step     │
//! │  ┌───▼───────────────▼──────────────▼────┐  ┌────▼──────┐   │
//! │  │              Scenario                 │◄─┤StepBridge │   │
//! │  │  nodes · topology · flows · stats     │  │ (hooks)   │   │
//! │  └───────────────────────────────────────┘  └────┬──────┘   │
//! └──────────────────────────────────────────────────│──────────┘
//!                                                    │ State / Action
//!                                              ┌─────▼─────┐
//!                                              │   Agent   │
//!                                              └───────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use meshgym_sim::{run_gym_with, AgentPolicy, AgentSource, GymConfig};
//!
//! let report = run_gym_with(&GymConfig::default(), AgentSource::Local(AgentPolicy::Random))?;
//! assert_eq!(report.bridge.map(|b| b.steps), Some(10));
//! # Ok::<(), meshgym_sim::SimError>(())
//! ```

mod agent;
mod bridge;
pub mod config;
mod env;
mod error;
mod mobility;
mod queue;
mod routing;
mod runner;
mod scenario;
mod scheduler;
mod seeds;
mod traffic;

pub use agent::{AgentPolicy, LocalAgent};
pub use bridge::{BridgeState, BridgeStats, EnvironmentSession, StepBridge};
pub use config::{AdhocConfig, ConfigError, EnvConfig, GymConfig, ScenarioConfig};
pub use env::MeshGymEnv;
pub use error::SimError;
pub use mobility::{MobilityState, Phase, RandomDirection};
pub use queue::{Callback, EventKey, EventQueue};
pub use routing::{Route, Topology};
pub use runner::{run_adhoc, run_gym, run_gym_with, AgentSource, RunReport};
pub use scenario::{grid_position, NodeId, Scenario, SimulatedNode};
pub use scheduler::{EventHandle, RunSummary, Scheduler, SchedulerStats, TimerId};
pub use seeds::{SeedStreams, Stream};
pub use traffic::{Delivery, Flow, TrafficStats};
