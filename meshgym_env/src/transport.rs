//! Transport abstraction between the simulation and an external agent.

use crate::error::EnvError;
use crate::protocol::{AgentMessage, EnvMessage};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::time::Duration;
use tracing::debug;

/// Synchronous request/response link to an agent.
///
/// # Implementations
///
/// - **In-process**: [`ChannelTransport`], a crossbeam rendezvous with an
///   [`AgentEndpoint`] served on another thread
/// - **External process**: `ZmqTransport` (feature `zmq`)
///
/// # Blocking
///
/// [`AgentTransport::exchange`] blocks the calling thread until the agent
/// replies, the optional `timeout` expires, or the link breaks. No second
/// exchange can start before the first one returns.
pub trait AgentTransport {
    /// Sends `message` and waits for exactly one reply.
    fn exchange(
        &mut self,
        message: &EnvMessage,
        timeout: Option<Duration>,
    ) -> Result<AgentMessage, EnvError>;

    /// Human readable description of the peer (for logging).
    fn peer(&self) -> String;
}

impl<T: AgentTransport + ?Sized> AgentTransport for Box<T> {
    fn exchange(
        &mut self,
        message: &EnvMessage,
        timeout: Option<Duration>,
    ) -> Result<AgentMessage, EnvError> {
        (**self).exchange(message, timeout)
    }

    fn peer(&self) -> String {
        (**self).peer()
    }
}

/// Simulation side of an in-process agent link.
pub struct ChannelTransport {
    to_agent: Sender<EnvMessage>,
    from_agent: Receiver<AgentMessage>,

    /// A reply timed out and may still arrive
    stale_reply: bool,
}

/// Agent side of an in-process agent link.
pub struct AgentEndpoint {
    from_env: Receiver<EnvMessage>,
    to_env: Sender<AgentMessage>,
}

/// Creates a connected transport/endpoint pair.
///
/// Both directions are zero-capacity channels, so every message is a
/// rendezvous between the two threads.
pub fn channel_pair() -> (ChannelTransport, AgentEndpoint) {
    let (to_agent, from_env) = channel::bounded(0);
    let (to_env, from_agent) = channel::bounded(0);
    (
        ChannelTransport {
            to_agent,
            from_agent,
            stale_reply: false,
        },
        AgentEndpoint { from_env, to_env },
    )
}

impl ChannelTransport {
    /// Waits for the reply a previous exchange gave up on and drops it.
    fn discard_stale(&mut self, timeout: Option<Duration>) -> Result<(), EnvError> {
        let late = match timeout {
            None => self.from_agent.recv().map_err(|_| EnvError::Disconnected)?,
            Some(limit) => self.from_agent.recv_timeout(limit).map_err(|e| match e {
                RecvTimeoutError::Timeout => EnvError::Timeout(limit.as_millis() as u64),
                RecvTimeoutError::Disconnected => EnvError::Disconnected,
            })?,
        };
        debug!(kind = late.kind(), "Discarded late agent reply");
        self.stale_reply = false;
        Ok(())
    }
}

impl AgentTransport for ChannelTransport {
    fn exchange(
        &mut self,
        message: &EnvMessage,
        timeout: Option<Duration>,
    ) -> Result<AgentMessage, EnvError> {
        if self.stale_reply {
            self.discard_stale(timeout)?;
        }

        match timeout {
            None => {
                self.to_agent
                    .send(message.clone())
                    .map_err(|_| EnvError::Disconnected)?;
                self.from_agent.recv().map_err(|_| EnvError::Disconnected)
            }
            Some(limit) => {
                let ms = limit.as_millis() as u64;
                self.to_agent
                    .send_timeout(message.clone(), limit)
                    .map_err(|e| match e {
                        SendTimeoutError::Timeout(_) => EnvError::Timeout(ms),
                        SendTimeoutError::Disconnected(_) => EnvError::Disconnected,
                    })?;
                self.from_agent.recv_timeout(limit).map_err(|e| match e {
                    RecvTimeoutError::Timeout => {
                        self.stale_reply = true;
                        EnvError::Timeout(ms)
                    }
                    RecvTimeoutError::Disconnected => EnvError::Disconnected,
                })
            }
        }
    }

    fn peer(&self) -> String {
        "in-process agent".to_string()
    }
}

impl AgentEndpoint {
    /// Blocks until the simulation sends the next message.
    pub fn recv(&self) -> Result<EnvMessage, EnvError> {
        self.from_env.recv().map_err(|_| EnvError::Disconnected)
    }

    /// Sends the reply to the last received message.
    pub fn reply(&self, message: AgentMessage) -> Result<(), EnvError> {
        self.to_env.send(message).map_err(|_| EnvError::Disconnected)
    }

    /// Answers messages with `policy` until the simulation ends the session.
    ///
    /// `Init` and `SimulationEnd` are acknowledged automatically; `policy` is
    /// only consulted for `State` messages but sees every message first.
    /// Returns the number of messages served.
    pub fn serve<F>(self, mut policy: F) -> Result<u64, EnvError>
    where
        F: FnMut(&EnvMessage) -> AgentMessage,
    {
        let mut served = 0;
        loop {
            let message = self.recv()?;
            served += 1;
            let reply = policy(&message);
            match message {
                EnvMessage::State { .. } => self.reply(reply)?,
                EnvMessage::Init { .. } => self.reply(AgentMessage::Ack)?,
                EnvMessage::SimulationEnd { .. } => {
                    // The simulation may already be gone after a fatal error.
                    let _ = self.reply(AgentMessage::Ack);
                    return Ok(served);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::{SpaceDescriptor, SpaceValue};
    use crate::types::{EndReason, StepRecord};
    use std::thread;

    fn state(step: u64) -> EnvMessage {
        EnvMessage::State {
            step,
            time_secs: step as f64 * 0.1,
            record: StepRecord {
                observation: SpaceValue::u32_vector(vec![0]),
                reward: step as f32,
                game_over: false,
                extra_info: String::new(),
            },
        }
    }

    #[test]
    fn test_channel_exchange_round_trip() {
        let (mut transport, endpoint) = channel_pair();

        let agent = thread::spawn(move || {
            endpoint.serve(|msg| match msg {
                EnvMessage::State { step, .. } => {
                    AgentMessage::Action(SpaceValue::Discrete(*step as u32 % 2))
                }
                _ => AgentMessage::Ack,
            })
        });

        let init = EnvMessage::Init {
            action_space: SpaceDescriptor::discrete(2),
            observation_space: SpaceDescriptor::discrete(1),
        };
        assert_eq!(transport.exchange(&init, None).unwrap(), AgentMessage::Ack);

        for step in 0..3 {
            let reply = transport.exchange(&state(step), None).unwrap();
            assert_eq!(reply, AgentMessage::Action(SpaceValue::Discrete(step as u32 % 2)));
        }

        let end = EnvMessage::SimulationEnd {
            reason: EndReason::StopTimeReached,
            steps: 3,
            time_secs: 0.3,
        };
        assert_eq!(transport.exchange(&end, None).unwrap(), AgentMessage::Ack);

        assert_eq!(agent.join().unwrap().unwrap(), 5);
    }

    #[test]
    fn test_channel_disconnected_agent() {
        let (mut transport, endpoint) = channel_pair();
        drop(endpoint);

        let result = transport.exchange(&state(0), None);
        assert!(matches!(result, Err(EnvError::Disconnected)));
    }

    #[test]
    fn test_channel_timeout() {
        let (mut transport, endpoint) = channel_pair();

        // Agent receives but never answers.
        let agent = thread::spawn(move || {
            let _msg = endpoint.recv();
            thread::sleep(Duration::from_millis(500));
            drop(endpoint);
        });

        let result = transport.exchange(&state(0), Some(Duration::from_millis(100)));
        assert!(matches!(result, Err(EnvError::Timeout(100))));
        agent.join().unwrap();
    }

    #[test]
    fn test_late_reply_is_discarded() {
        let (mut transport, endpoint) = channel_pair();

        let agent = thread::spawn(move || {
            let _first = endpoint.recv().unwrap();
            thread::sleep(Duration::from_millis(300));
            endpoint.reply(AgentMessage::Action(SpaceValue::Discrete(0))).unwrap();
            let _second = endpoint.recv().unwrap();
            endpoint.reply(AgentMessage::StopSimulation).unwrap();
        });

        let limit = Some(Duration::from_millis(100));
        assert!(matches!(transport.exchange(&state(0), limit), Err(EnvError::Timeout(_))));

        // The next exchange drains the late action before sending.
        let reply = transport.exchange(&state(1), Some(Duration::from_secs(5))).unwrap();
        assert_eq!(reply, AgentMessage::StopSimulation);
        agent.join().unwrap();
    }
}
