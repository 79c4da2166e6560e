//! In-process agents for local runs and tests.
//!
//! An agent runs on its own OS thread and answers the simulation through a
//! [`channel_pair`]. It learns the action space from the `Init` message.

use meshgym_env::{
    channel_pair, AgentMessage, ChannelTransport, EnvError, EnvMessage, SpaceDescriptor,
    SpaceValue,
};
use rand_chacha::ChaCha8Rng;
use std::str::FromStr;
use std::thread::{self, JoinHandle};
use tracing::debug;

/// How an in-process agent picks actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPolicy {
    /// Uniformly random valid action (agent stream)
    Random,
    /// Always the first action of a discrete space
    First,
}

impl FromStr for AgentPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "random" => Ok(AgentPolicy::Random),
            "first" => Ok(AgentPolicy::First),
            _ => Err(format!("unknown agent policy '{}'", s)),
        }
    }
}

/// Handle to a running in-process agent.
pub struct LocalAgent {
    handle: JoinHandle<Result<u64, EnvError>>,
}

impl LocalAgent {
    /// Starts an agent thread and returns the simulation side of its link.
    pub fn spawn(policy: AgentPolicy, mut rng: ChaCha8Rng) -> Result<(ChannelTransport, Self), EnvError> {
        let (transport, endpoint) = channel_pair();

        let handle = thread::Builder::new()
            .name("meshgym-agent".to_string())
            .spawn(move || {
                let mut action_space: Option<SpaceDescriptor> = None;
                endpoint.serve(|message| match message {
                    EnvMessage::Init { action_space: space, .. } => {
                        action_space = Some(space.clone());
                        AgentMessage::Ack
                    }
                    EnvMessage::State { step, .. } => {
                        let action = action_space
                            .as_ref()
                            .and_then(|space| choose(policy, space, &mut rng));
                        match action {
                            Some(action) => {
                                debug!(step, action = %action, "Agent action");
                                AgentMessage::Action(action)
                            }
                            None => AgentMessage::StopSimulation,
                        }
                    }
                    EnvMessage::SimulationEnd { .. } => AgentMessage::Ack,
                })
            })
            .map_err(|e| EnvError::transport(e.to_string()))?;

        Ok((transport, Self { handle }))
    }

    /// Waits for the agent thread and returns the number of messages it
    /// served.
    pub fn join(self) -> Result<u64, EnvError> {
        self.handle
            .join()
            .map_err(|_| EnvError::transport("agent thread panicked"))?
    }
}

fn choose(policy: AgentPolicy, space: &SpaceDescriptor, rng: &mut ChaCha8Rng) -> Option<SpaceValue> {
    match (policy, space) {
        (AgentPolicy::First, SpaceDescriptor::Discrete { n }) if *n > 0 => Some(SpaceValue::Discrete(0)),
        _ => space.sample(rng),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshgym_env::{AgentTransport, EndReason, StepRecord};
    use rand::SeedableRng;

    fn state(step: u64) -> EnvMessage {
        EnvMessage::State {
            step,
            time_secs: 0.0,
            record: StepRecord {
                observation: SpaceValue::Discrete(0),
                reward: 0.0,
                game_over: false,
                extra_info: String::new(),
            },
        }
    }

    fn session(policy: AgentPolicy, space: SpaceDescriptor, steps: u64) -> Vec<AgentMessage> {
        let (mut transport, agent) = LocalAgent::spawn(policy, ChaCha8Rng::seed_from_u64(5)).unwrap();
        let init = EnvMessage::Init {
            action_space: space,
            observation_space: SpaceDescriptor::discrete(1),
        };
        assert_eq!(transport.exchange(&init, None).unwrap(), AgentMessage::Ack);

        let replies = (0..steps).map(|i| transport.exchange(&state(i), None).unwrap()).collect();

        let end = EnvMessage::SimulationEnd {
            reason: EndReason::StopTimeReached,
            steps,
            time_secs: 0.0,
        };
        assert_eq!(transport.exchange(&end, None).unwrap(), AgentMessage::Ack);
        assert_eq!(agent.join().unwrap(), steps + 2);
        replies
    }

    #[test]
    fn test_random_agent_stays_in_action_space() {
        let space = SpaceDescriptor::discrete(4);
        for reply in session(AgentPolicy::Random, space.clone(), 20) {
            let AgentMessage::Action(action) = reply else {
                panic!("expected an action");
            };
            assert!(space.contains(&action));
        }
    }

    #[test]
    fn test_first_agent() {
        let replies = session(AgentPolicy::First, SpaceDescriptor::discrete(4), 3);
        assert!(replies
            .iter()
            .all(|r| *r == AgentMessage::Action(SpaceValue::Discrete(0))));
    }

    #[test]
    fn test_empty_action_space_stops() {
        let replies = session(AgentPolicy::Random, SpaceDescriptor::discrete(0), 1);
        assert_eq!(replies, vec![AgentMessage::StopSimulation]);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("Random".parse::<AgentPolicy>().unwrap(), AgentPolicy::Random);
        assert_eq!("first".parse::<AgentPolicy>().unwrap(), AgentPolicy::First);
        assert!("zmq".parse::<AgentPolicy>().is_err());
    }
}
