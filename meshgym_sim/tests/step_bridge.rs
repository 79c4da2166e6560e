//! Step exchange between a gym run and a scripted agent.

mod common;

use common::{scripted_agent, step_of};
use meshgym_env::{AgentMessage, EndReason, EnvError, EnvMessage, SpaceDescriptor, SpaceValue};
use meshgym_sim::{run_gym, GymConfig, SimError};
use std::thread;
use std::time::Duration;

fn always(action: u32) -> impl FnMut(&EnvMessage) -> AgentMessage + Send + 'static {
    move |_| AgentMessage::Action(SpaceValue::Discrete(action))
}

#[test]
fn test_ten_steps_then_end() {
    let (transport, agent) = scripted_agent(always(0));
    let report = run_gym(&GymConfig::default(), transport).unwrap();
    let seen = agent.join().unwrap();

    // init, 10 states, end
    assert_eq!(seen.len(), 12);
    assert!(matches!(seen[0], EnvMessage::Init { .. }));

    let times: Vec<f64> = seen
        .iter()
        .filter_map(|m| match m {
            EnvMessage::State { time_secs, .. } => Some(*time_secs),
            _ => None,
        })
        .collect();
    assert_eq!(times.len(), 10);
    for (i, t) in times.iter().enumerate() {
        approx::assert_relative_eq!(*t, i as f64 * 0.1, epsilon = 1e-9);
    }

    match &seen[11] {
        EnvMessage::SimulationEnd { reason, steps, time_secs } => {
            assert_eq!(*reason, EndReason::StopTimeReached);
            assert_eq!(*steps, 10);
            assert_eq!(*time_secs, 1.0);
        }
        other => panic!("expected simulation end, got {}", other.kind()),
    }
    assert_eq!(report.end_reason, Some(EndReason::StopTimeReached));
    assert_eq!(report.final_time_secs, 1.0);
}

#[test]
fn test_init_declares_spaces() {
    let (transport, agent) = scripted_agent(always(0));
    run_gym(&GymConfig::default(), transport).unwrap();
    let seen = agent.join().unwrap();

    let EnvMessage::Init { action_space, observation_space } = &seen[0] else {
        panic!("first message must be init");
    };
    assert_eq!(*action_space, SpaceDescriptor::discrete(2));
    assert_eq!(observation_space.element_count(), 2);
}

#[test]
fn test_reward_sequence() {
    let (transport, agent) = scripted_agent(always(1));
    run_gym(&GymConfig::default(), transport).unwrap();

    let rewards: Vec<f32> = agent
        .join()
        .unwrap()
        .iter()
        .filter_map(|m| match m {
            EnvMessage::State { record, .. } => Some(record.reward),
            _ => None,
        })
        .collect();
    let expected: Vec<f32> = (1..=10).map(|r| r as f32).collect();
    assert_eq!(rewards, expected);
}

#[test]
fn test_observations_match_declared_space() {
    let mut config = GymConfig::default();
    config.scenario.node_count = 6;
    let (transport, agent) = scripted_agent(always(3));
    run_gym(&config, transport).unwrap();

    let seen = agent.join().unwrap();
    let EnvMessage::Init { observation_space, .. } = &seen[0] else {
        panic!("first message must be init");
    };
    for message in &seen {
        if let EnvMessage::State { record, .. } = message {
            assert!(observation_space.contains(&record.observation));
            assert!(record.extra_info.starts_with("links="));
        }
    }
}

#[test]
fn test_mismatched_action_is_rejected() {
    let (transport, agent) = scripted_agent(always(99));
    let report = run_gym(&GymConfig::default(), transport).unwrap();
    agent.join().unwrap();

    let bridge = report.bridge.unwrap();
    assert_eq!(bridge.actions_rejected, 10);
    assert_eq!(bridge.actions_applied, 0);
    assert_eq!(report.redirects, 0);
    assert_eq!(report.end_reason, Some(EndReason::StopTimeReached));
}

#[test]
fn test_agent_stop_ends_run_early() {
    let (transport, agent) = scripted_agent(|message| {
        if step_of(message) == Some(3) {
            AgentMessage::StopSimulation
        } else {
            AgentMessage::Action(SpaceValue::Discrete(0))
        }
    });
    let report = run_gym(&GymConfig::default(), transport).unwrap();
    let seen = agent.join().unwrap();

    assert!(report.stopped_early);
    assert_eq!(report.end_reason, Some(EndReason::AgentStopped));
    assert_eq!(report.bridge.unwrap().steps, 4);
    approx::assert_relative_eq!(report.final_time_secs, 0.3, epsilon = 1e-9);
    assert!(matches!(
        seen.last(),
        Some(EnvMessage::SimulationEnd { reason: EndReason::AgentStopped, steps: 4, .. })
    ));
}

#[test]
fn test_game_over_ends_run_early() {
    let mut config = GymConfig::default();
    config.env.max_steps = Some(4);
    let (transport, agent) = scripted_agent(always(0));
    let report = run_gym(&config, transport).unwrap();
    let seen = agent.join().unwrap();

    assert_eq!(report.end_reason, Some(EndReason::GameOver));
    assert_eq!(report.bridge.unwrap().steps, 4);

    let flags: Vec<bool> = seen
        .iter()
        .filter_map(|m| match m {
            EnvMessage::State { record, .. } => Some(record.game_over),
            _ => None,
        })
        .collect();
    assert_eq!(flags, vec![false, false, false, true]);
}

#[test]
fn test_timeout_aborts_run_but_notifies_end() {
    let mut config = GymConfig::default();
    config.env.action_timeout = Some(Duration::from_millis(250));

    let (transport, agent) = scripted_agent(|message| {
        if step_of(message) == Some(2) {
            thread::sleep(Duration::from_millis(400));
        }
        AgentMessage::Action(SpaceValue::Discrete(0))
    });

    let result = run_gym(&config, transport);
    assert!(matches!(
        result,
        Err(SimError::Environment(EnvError::Timeout(250)))
    ));

    let seen = agent.join().unwrap();
    match seen.last() {
        Some(EnvMessage::SimulationEnd { reason, steps, .. }) => {
            assert!(reason.is_error());
            assert_eq!(*steps, 3);
        }
        other => panic!("expected simulation end, got {:?}", other.map(|m| m.kind())),
    }
}

#[test]
fn test_disconnected_agent_is_fatal() {
    let (transport, endpoint) = meshgym_env::channel_pair();
    drop(endpoint);

    let result = run_gym(&GymConfig::default(), transport);
    assert!(matches!(
        result,
        Err(SimError::Environment(EnvError::Disconnected))
    ));
}
