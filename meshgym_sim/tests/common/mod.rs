//! Scripted agents for integration tests.

#![allow(dead_code)]

use meshgym_env::{channel_pair, AgentMessage, ChannelTransport, EnvMessage};
use std::thread::{self, JoinHandle};

/// Starts an agent that answers `State` messages with `policy`,
/// acknowledges everything else, and returns every message it received.
pub fn scripted_agent<F>(mut policy: F) -> (ChannelTransport, JoinHandle<Vec<EnvMessage>>)
where
    F: FnMut(&EnvMessage) -> AgentMessage + Send + 'static,
{
    let (transport, endpoint) = channel_pair();
    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        while let Ok(message) = endpoint.recv() {
            let reply = match &message {
                EnvMessage::State { .. } => policy(&message),
                _ => AgentMessage::Ack,
            };
            let last = matches!(message, EnvMessage::SimulationEnd { .. });
            seen.push(message);
            if endpoint.reply(reply).is_err() || last {
                break;
            }
        }
        seen
    });
    (transport, handle)
}

/// Step index of a `State` message.
pub fn step_of(message: &EnvMessage) -> Option<u64> {
    match message {
        EnvMessage::State { step, .. } => Some(*step),
        _ => None,
    }
}
