//! Environment hooks over the mesh scenario.

use crate::config::EnvConfig;
use crate::scenario::{NodeId, Scenario};
use meshgym_env::{
    ActionScheduler, ActionValue, Dtype, EnvironmentHooks, ObservationValue, SpaceDescriptor,
    SpaceValue,
};
use tracing::debug;

/// Reinforcement-learning view of a [`Scenario`].
///
/// - Observation: routing neighbor count of every node, clamped to
///   `observation_high`
/// - Action: index of a node to send off in a new random direction
/// - Reward: 1, 2, 3, … over the session
/// - Game over: once `max_steps` steps have been reported, if configured
#[derive(Debug)]
pub struct MeshGymEnv {
    node_count: u32,
    observation_high: u32,
    max_steps: Option<u64>,

    /// Reward accumulator
    reward_calls: u64,

    /// Game-over queries answered so far
    steps_reported: u64,
}

impl MeshGymEnv {
    pub fn new(node_count: usize, config: &EnvConfig) -> Self {
        Self {
            node_count: node_count as u32,
            observation_high: config.observation_high,
            max_steps: config.max_steps,
            reward_calls: 0,
            steps_reported: 0,
        }
    }

    pub fn steps_reported(&self) -> u64 {
        self.steps_reported
    }
}

impl EnvironmentHooks<Scenario> for MeshGymEnv {
    fn action_space(&self) -> SpaceDescriptor {
        SpaceDescriptor::discrete(self.node_count)
    }

    fn observation_space(&self) -> SpaceDescriptor {
        SpaceDescriptor::bounded(
            0.0,
            self.observation_high as f64,
            vec![self.node_count],
            Dtype::U32,
        )
    }

    fn observation(&mut self, scenario: &Scenario) -> ObservationValue {
        let counts = (0..self.node_count)
            .map(|i| {
                scenario
                    .neighbors_of(NodeId(i))
                    .map_or(0, |set| set.len() as u32)
                    .min(self.observation_high)
            })
            .collect();
        SpaceValue::u32_vector(counts)
    }

    fn reward(&mut self, _scenario: &Scenario) -> f32 {
        self.reward_calls += 1;
        self.reward_calls as f32
    }

    fn game_over(&mut self, _scenario: &Scenario) -> bool {
        self.steps_reported += 1;
        self.max_steps.is_some_and(|max| self.steps_reported >= max)
    }

    fn extra_info(&mut self, scenario: &Scenario) -> String {
        let stats = scenario.traffic_stats();
        format!(
            "links={}|delivered={}|dropped={}",
            scenario.link_count(),
            stats.delivered,
            stats.dropped
        )
    }

    fn execute_action(
        &mut self,
        action: &ActionValue,
        scheduler: &mut dyn ActionScheduler<Scenario>,
    ) -> bool {
        if !self.action_space().contains(action) {
            return false;
        }
        let Some(index) = action.as_discrete() else {
            return false;
        };

        debug!(node = index, "Redirect requested");
        Scenario::request_redirect(NodeId(index), scheduler);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScenarioConfig;
    use crate::scheduler::Scheduler;
    use crate::seeds::SeedStreams;
    use std::time::Duration;

    fn setup(nodes: usize, max_steps: Option<u64>) -> (Scheduler<Scenario>, Scenario, MeshGymEnv) {
        let mut sched = Scheduler::new();
        let scenario =
            Scenario::create(ScenarioConfig::with_nodes(nodes), &SeedStreams::default(), &mut sched).unwrap();
        let env = MeshGymEnv::new(
            nodes,
            &EnvConfig {
                max_steps,
                ..Default::default()
            },
        );
        (sched, scenario, env)
    }

    #[test]
    fn test_spaces_follow_node_count() {
        let (_, scenario, mut env) = setup(5, None);

        assert_eq!(env.action_space(), SpaceDescriptor::discrete(5));
        let obs = env.observation(&scenario);
        assert!(env.observation_space().contains(&obs));
        assert_eq!(env.observation_space().element_count(), 5);
    }

    #[test]
    fn test_observation_counts_neighbors() {
        let (_, scenario, mut env) = setup(2, None);
        assert_eq!(env.observation(&scenario), SpaceValue::u32_vector(vec![1, 1]));
    }

    #[test]
    fn test_observation_is_clamped() {
        // 25 nodes 20 m apart: inner nodes have more than 10 neighbors.
        let (_, scenario, mut env) = setup(25, None);
        let obs = env.observation(&scenario);
        assert!(env.observation_space().contains(&obs));
        let SpaceValue::Box { data, .. } = obs else {
            panic!("expected a box observation");
        };
        assert!(data.as_f64().iter().any(|&v| v == 10.0));
    }

    #[test]
    fn test_reward_counts_up() {
        let (_, scenario, mut env) = setup(2, None);
        let rewards: Vec<f32> = (0..4).map(|_| env.reward(&scenario)).collect();
        assert_eq!(rewards, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_game_over_after_max_steps() {
        let (_, scenario, mut env) = setup(2, Some(3));
        let flags: Vec<bool> = (0..4).map(|_| env.game_over(&scenario)).collect();
        assert_eq!(flags, vec![false, false, true, true]);

        let (_, scenario, mut env) = setup(2, None);
        assert!(!(0..100).any(|_| env.game_over(&scenario)));
    }

    #[test]
    fn test_extra_info_format() {
        let (_, scenario, mut env) = setup(2, None);
        assert_eq!(env.extra_info(&scenario), "links=1|delivered=0|dropped=0");
    }

    #[test]
    fn test_execute_action_defers_redirect() {
        let (mut sched, mut scenario, mut env) = setup(3, None);

        assert!(env.execute_action(&SpaceValue::Discrete(1), &mut sched));
        assert_eq!(scenario.redirects(), 0);

        sched.run(Duration::from_millis(1), &mut scenario).unwrap();
        assert_eq!(scenario.redirects(), 1);
    }

    #[test]
    fn test_mismatched_action_is_rejected() {
        let (mut sched, mut scenario, mut env) = setup(3, None);
        let pending = sched.pending();

        assert!(!env.execute_action(&SpaceValue::Discrete(3), &mut sched));
        assert!(!env.execute_action(&SpaceValue::u32_vector(vec![0, 1, 2]), &mut sched));
        assert_eq!(sched.pending(), pending, "Rejected actions schedule nothing");

        sched.run(Duration::from_millis(1), &mut scenario).unwrap();
        assert_eq!(scenario.redirects(), 0);
    }
}
