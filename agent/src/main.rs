//! meshgym Agent - random reference agent
//!
//! Binds a REP socket and serves one or more simulation runs:
//! - acknowledges `Init` and remembers the action space
//! - answers every `State` with a uniformly random valid action
//! - optionally asks the simulation to stop after a step budget
//! - acknowledges `SimulationEnd` and waits for the next episode

use anyhow::{Context, Result};
use clap::Parser;
use meshgym_env::zmq_transport::DEFAULT_PORT;
use meshgym_env::{AgentMessage, EnvMessage, SpaceDescriptor, ZmqAgentSocket};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Random agent for the meshgym environment
#[derive(Parser, Debug)]
#[command(name = "meshgym-agent")]
#[command(about = "Answer meshgym steps with random valid actions", long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Seed of the action generator
    #[arg(short, long, default_value = "0")]
    seed: u64,

    /// Episodes to serve before exiting (0 = forever)
    #[arg(short, long, default_value = "1")]
    episodes: u64,

    /// Ask the simulation to stop after this many steps per episode
    #[arg(long)]
    stop_after: Option<u64>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Per-episode agent state.
struct Episode {
    action_space: Option<SpaceDescriptor>,
    steps: u64,
    total_reward: f64,
    stop_after: Option<u64>,
}

impl Episode {
    fn new(stop_after: Option<u64>) -> Self {
        Self {
            action_space: None,
            steps: 0,
            total_reward: 0.0,
            stop_after,
        }
    }

    /// Reply to one simulation message. The second value is true once the
    /// episode has ended.
    fn respond(&mut self, message: &EnvMessage, rng: &mut ChaCha8Rng) -> (AgentMessage, bool) {
        match message {
            EnvMessage::Init {
                action_space,
                observation_space,
            } => {
                info!(action_space = %action_space, observation_space = %observation_space, "Environment ready");
                self.action_space = Some(action_space.clone());
                (AgentMessage::Ack, false)
            }
            EnvMessage::State { step, time_secs, record } => {
                self.steps += 1;
                self.total_reward += f64::from(record.reward);
                debug!(
                    step,
                    time = time_secs,
                    obs = %record.observation,
                    reward = record.reward,
                    info = %record.extra_info,
                    "Step"
                );

                if record.game_over || self.stop_after.is_some_and(|limit| self.steps >= limit) {
                    return (AgentMessage::StopSimulation, false);
                }

                let action = self.action_space.as_ref().and_then(|space| space.sample(rng));
                match action {
                    Some(action) => (AgentMessage::Action(action), false),
                    None => {
                        warn!("No valid action available, stopping");
                        (AgentMessage::StopSimulation, false)
                    }
                }
            }
            EnvMessage::SimulationEnd { reason, steps, time_secs } => {
                info!(
                    reason = %reason,
                    steps,
                    time = time_secs,
                    total_reward = self.total_reward,
                    "Episode finished"
                );
                (AgentMessage::Ack, true)
            }
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    info!("meshgym agent v{}", env!("CARGO_PKG_VERSION"));

    let socket = ZmqAgentSocket::bind(cli.port)
        .with_context(|| format!("Failed to bind agent socket on port {}", cli.port))?;
    info!(address = %socket.local_address()?, "Waiting for the simulation");

    let mut rng = ChaCha8Rng::seed_from_u64(cli.seed);
    let mut served = 0u64;

    while cli.episodes == 0 || served < cli.episodes {
        let mut episode = Episode::new(cli.stop_after);
        loop {
            let message = socket.recv().context("Failed to receive from simulation")?;
            let (reply, finished) = episode.respond(&message, &mut rng);
            socket.reply(&reply).context("Failed to reply to simulation")?;
            if finished {
                break;
            }
        }
        served += 1;
    }

    info!(episodes = served, "Done.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshgym_env::{EndReason, SpaceValue, StepRecord};

    fn init(n: u32) -> EnvMessage {
        EnvMessage::Init {
            action_space: SpaceDescriptor::discrete(n),
            observation_space: SpaceDescriptor::discrete(1),
        }
    }

    fn state(step: u64, game_over: bool) -> EnvMessage {
        EnvMessage::State {
            step,
            time_secs: step as f64 * 0.1,
            record: StepRecord {
                observation: SpaceValue::Discrete(0),
                reward: 1.0,
                game_over,
                extra_info: String::new(),
            },
        }
    }

    #[test]
    fn test_random_actions_are_valid() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut episode = Episode::new(None);
        assert_eq!(episode.respond(&init(3), &mut rng), (AgentMessage::Ack, false));

        let space = SpaceDescriptor::discrete(3);
        for step in 0..50 {
            let (reply, finished) = episode.respond(&state(step, false), &mut rng);
            assert!(!finished);
            let AgentMessage::Action(action) = reply else {
                panic!("expected an action");
            };
            assert!(space.contains(&action));
        }
        assert_eq!(episode.total_reward, 50.0);
    }

    #[test]
    fn test_stop_after_budget() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut episode = Episode::new(Some(2));
        episode.respond(&init(2), &mut rng);

        assert!(matches!(episode.respond(&state(0, false), &mut rng).0, AgentMessage::Action(_)));
        assert_eq!(episode.respond(&state(1, false), &mut rng).0, AgentMessage::StopSimulation);
    }

    #[test]
    fn test_game_over_stops() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut episode = Episode::new(None);
        episode.respond(&init(2), &mut rng);
        assert_eq!(episode.respond(&state(0, true), &mut rng).0, AgentMessage::StopSimulation);
    }

    #[test]
    fn test_state_before_init_stops() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut episode = Episode::new(None);
        assert_eq!(episode.respond(&state(0, false), &mut rng).0, AgentMessage::StopSimulation);
    }

    #[test]
    fn test_end_finishes_episode() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut episode = Episode::new(None);
        let end = EnvMessage::SimulationEnd {
            reason: EndReason::StopTimeReached,
            steps: 0,
            time_secs: 1.0,
        };
        assert_eq!(episode.respond(&end, &mut rng), (AgentMessage::Ack, true));
    }
}
