//! ZeroMQ link to an agent running in another process.
//!
//! The simulation owns a REQ socket that connects to the agent's REP socket:
//! - one JSON-encoded [`EnvMessage`] per request frame
//! - one JSON-encoded [`AgentMessage`] per reply frame
//! - receive timeout mapped to [`EnvError::Timeout`]
//! - a lost agent connection mapped to [`EnvError::Disconnected`]
//!
//! A REQ socket reconnects silently when its peer goes away, so a dead agent
//! would otherwise leave the simulation waiting forever. The transport
//! watches the socket's disconnect events on a monitor socket and polls it
//! together with the reply.

use crate::error::EnvError;
#[cfg(feature = "zmq")]
use crate::protocol;
use crate::protocol::{AgentMessage, EnvMessage};
use crate::transport::AgentTransport;
use std::time::Duration;
#[cfg(feature = "zmq")]
use std::time::Instant;

/// In-process endpoint the disconnect monitor publishes on.
#[cfg(feature = "zmq")]
const MONITOR_ENDPOINT: &str = "inproc://meshgym-agent-monitor";

/// Default port the agent listens on.
pub const DEFAULT_PORT: u16 = 5555;

/// Address the simulation connects to for a given port.
pub fn connect_address(port: u16) -> String {
    format!("tcp://localhost:{}", port)
}

/// Address the agent binds for a given port.
pub fn bind_address(port: u16) -> String {
    format!("tcp://*:{}", port)
}

#[cfg_attr(not(feature = "zmq"), allow(dead_code))]
fn timeout_millis(timeout: Option<Duration>) -> i32 {
    match timeout {
        // -1 = wait forever
        None => -1,
        Some(limit) => limit.as_millis().min(i32::MAX as u128) as i32,
    }
}

/// Simulation side: REQ socket connected to the agent.
#[cfg(feature = "zmq")]
pub struct ZmqTransport {
    socket: zmq::Socket,
    /// Receives one event per dropped agent connection
    monitor: zmq::Socket,
    _context: zmq::Context,
    address: String,
}

#[cfg(feature = "zmq")]
impl ZmqTransport {
    /// Connects to an agent listening on `port`.
    pub fn connect(port: u16) -> Result<Self, EnvError> {
        Self::connect_to(&connect_address(port))
    }

    /// Connects to an explicit ZeroMQ endpoint.
    pub fn connect_to(address: &str) -> Result<Self, EnvError> {
        let context = zmq::Context::new();

        let socket = context
            .socket(zmq::REQ)
            .map_err(|e| EnvError::transport(e.to_string()))?;
        socket
            .set_linger(0) // Do not block teardown on an absent agent
            .map_err(|e| EnvError::transport(e.to_string()))?;
        // After a timed-out request the next send must be allowed, and the
        // late reply must not be taken for the answer to it.
        socket
            .set_req_relaxed(true)
            .map_err(|e| EnvError::transport(e.to_string()))?;
        socket
            .set_req_correlate(true)
            .map_err(|e| EnvError::transport(e.to_string()))?;
        socket
            .monitor(MONITOR_ENDPOINT, zmq::SocketEvent::DISCONNECTED as i32)
            .map_err(|e| EnvError::transport(e.to_string()))?;
        let monitor = context
            .socket(zmq::PAIR)
            .map_err(|e| EnvError::transport(e.to_string()))?;
        monitor
            .connect(MONITOR_ENDPOINT)
            .map_err(|e| EnvError::transport(e.to_string()))?;
        socket
            .connect(address)
            .map_err(|e| EnvError::transport(e.to_string()))?;

        tracing::info!(address, "Connected agent transport");

        Ok(Self {
            socket,
            monitor,
            _context: context,
            address: address.to_string(),
        })
    }

    /// Consumes pending monitor events. Returns true if the agent connection
    /// dropped.
    fn peer_lost(&self) -> Result<bool, EnvError> {
        let mut lost = false;
        loop {
            match self.monitor.recv_multipart(zmq::DONTWAIT) {
                Ok(_) => lost = true,
                Err(zmq::Error::EAGAIN) => return Ok(lost),
                Err(e) => return Err(EnvError::transport(e.to_string())),
            }
        }
    }

    /// Waits for the reply, the end of the agent connection or the deadline.
    fn await_reply(&self, timeout: Option<Duration>) -> Result<AgentMessage, EnvError> {
        let deadline = timeout.map(|limit| Instant::now() + limit);
        loop {
            let wait = match deadline {
                None => -1,
                Some(at) => at.saturating_duration_since(Instant::now()).as_millis() as i64,
            };

            let mut items = [
                self.socket.as_poll_item(zmq::POLLIN),
                self.monitor.as_poll_item(zmq::POLLIN),
            ];
            let ready = zmq::poll(&mut items, wait).map_err(|e| EnvError::transport(e.to_string()))?;
            let (reply_ready, monitor_ready) = (items[0].is_readable(), items[1].is_readable());

            if reply_ready {
                match self.socket.recv_bytes(zmq::DONTWAIT) {
                    Ok(data) => return protocol::decode(&data),
                    // A late reply to an earlier request was discarded.
                    Err(zmq::Error::EAGAIN) => {}
                    Err(zmq::Error::ETERM) => return Err(EnvError::Disconnected),
                    Err(e) => return Err(EnvError::transport(e.to_string())),
                }
            }
            if monitor_ready && self.peer_lost()? {
                tracing::warn!(address = %self.address, "Agent connection lost");
                return Err(EnvError::Disconnected);
            }
            if ready == 0 {
                if let Some(limit) = timeout {
                    return Err(EnvError::Timeout(limit.as_millis() as u64));
                }
            }
        }
    }
}

#[cfg(feature = "zmq")]
impl AgentTransport for ZmqTransport {
    fn exchange(
        &mut self,
        message: &EnvMessage,
        timeout: Option<Duration>,
    ) -> Result<AgentMessage, EnvError> {
        // A connection dropped while no request was pending.
        if self.peer_lost()? {
            return Err(EnvError::Disconnected);
        }

        self.socket
            .set_sndtimeo(timeout_millis(timeout))
            .map_err(|e| EnvError::transport(e.to_string()))?;
        let bytes = protocol::encode(message)?;
        match self.socket.send(bytes, 0) {
            Ok(()) => {}
            Err(zmq::Error::EAGAIN) => {
                return Err(EnvError::Timeout(timeout.map_or(0, |t| t.as_millis() as u64)))
            }
            Err(e) => return Err(EnvError::transport(e.to_string())),
        }

        self.await_reply(timeout)
    }

    fn peer(&self) -> String {
        self.address.clone()
    }
}

/// Agent side: REP socket bound to the port the simulation connects to.
#[cfg(feature = "zmq")]
pub struct ZmqAgentSocket {
    socket: zmq::Socket,
    _context: zmq::Context,
}

#[cfg(feature = "zmq")]
impl ZmqAgentSocket {
    /// Binds the agent socket on `port`.
    pub fn bind(port: u16) -> Result<Self, EnvError> {
        Self::bind_to(&bind_address(port))
    }

    /// Binds the agent socket on an explicit ZeroMQ endpoint.
    pub fn bind_to(address: &str) -> Result<Self, EnvError> {
        let context = zmq::Context::new();
        let socket = context
            .socket(zmq::REP)
            .map_err(|e| EnvError::transport(e.to_string()))?;
        socket
            .bind(address)
            .map_err(|e| EnvError::transport(e.to_string()))?;
        Ok(Self {
            socket,
            _context: context,
        })
    }

    /// Endpoint actually bound (resolves wildcard ports).
    pub fn local_address(&self) -> Result<String, EnvError> {
        match self.socket.get_last_endpoint() {
            Ok(Ok(address)) => Ok(address),
            Ok(Err(_)) => Err(EnvError::transport("endpoint is not valid UTF-8")),
            Err(e) => Err(EnvError::transport(e.to_string())),
        }
    }

    /// Blocks until the simulation sends the next message.
    pub fn recv(&self) -> Result<EnvMessage, EnvError> {
        let data = self
            .socket
            .recv_bytes(0)
            .map_err(|e| EnvError::transport(e.to_string()))?;
        protocol::decode(&data)
    }

    /// Sends the reply to the last received message.
    pub fn reply(&self, message: &AgentMessage) -> Result<(), EnvError> {
        let bytes = protocol::encode(message)?;
        self.socket
            .send(bytes, 0)
            .map_err(|e| EnvError::transport(e.to_string()))
    }
}

// ============================================================================
// NON-ZMQ FALLBACK (when zmq feature is disabled)
// ============================================================================

/// Placeholder transport for builds without ZeroMQ.
#[cfg(not(feature = "zmq"))]
pub struct ZmqTransport {
    address: String,
}

#[cfg(not(feature = "zmq"))]
impl ZmqTransport {
    pub fn connect(port: u16) -> Result<Self, EnvError> {
        Self::connect_to(&connect_address(port))
    }

    pub fn connect_to(address: &str) -> Result<Self, EnvError> {
        Err(EnvError::Unsupported(format!(
            "cannot connect to {}: built without the `zmq` feature",
            address
        )))
    }
}

#[cfg(not(feature = "zmq"))]
impl AgentTransport for ZmqTransport {
    fn exchange(
        &mut self,
        _message: &EnvMessage,
        _timeout: Option<Duration>,
    ) -> Result<AgentMessage, EnvError> {
        Err(EnvError::Unsupported("zmq transport".to_string()))
    }

    fn peer(&self) -> String {
        self.address.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addresses() {
        assert_eq!(connect_address(DEFAULT_PORT), "tcp://localhost:5555");
        assert_eq!(bind_address(6000), "tcp://*:6000");
    }

    #[test]
    fn test_timeout_millis() {
        assert_eq!(timeout_millis(None), -1);
        assert_eq!(timeout_millis(Some(Duration::from_millis(250))), 250);
        assert_eq!(timeout_millis(Some(Duration::from_secs(u64::MAX / 2))), i32::MAX);
    }

    #[cfg(not(feature = "zmq"))]
    #[test]
    fn test_connect_without_feature_is_unsupported() {
        assert!(matches!(
            ZmqTransport::connect(DEFAULT_PORT),
            Err(EnvError::Unsupported(_))
        ));
    }

    #[cfg(feature = "zmq")]
    #[test]
    fn test_zmq_agent_exit_is_disconnect() {
        use crate::space::{SpaceDescriptor, SpaceValue};
        use crate::types::StepRecord;

        let agent = ZmqAgentSocket::bind_to("tcp://127.0.0.1:*").unwrap();
        let address = agent.local_address().unwrap();

        // Acknowledges init, then exits without answering the first state.
        let server = std::thread::spawn(move || {
            agent.recv().unwrap();
            agent.reply(&AgentMessage::Ack).unwrap();
            let state = agent.recv().unwrap();
            assert_eq!(state.kind(), "state");
            drop(agent);
        });

        let mut transport = ZmqTransport::connect_to(&address).unwrap();
        let init = EnvMessage::Init {
            action_space: SpaceDescriptor::discrete(2),
            observation_space: SpaceDescriptor::discrete(2),
        };
        assert_eq!(transport.exchange(&init, None).unwrap(), AgentMessage::Ack);

        let state = EnvMessage::State {
            step: 0,
            time_secs: 0.0,
            record: StepRecord {
                observation: SpaceValue::Discrete(0),
                reward: 1.0,
                game_over: false,
                extra_info: String::new(),
            },
        };
        // Bounded only so a regression fails instead of hanging.
        let result = transport.exchange(&state, Some(Duration::from_secs(30)));
        server.join().unwrap();
        assert!(matches!(result, Err(EnvError::Disconnected)), "got {:?}", result);
    }

    #[cfg(feature = "zmq")]
    #[test]
    fn test_zmq_timeout() {
        use crate::space::SpaceDescriptor;

        let agent = ZmqAgentSocket::bind_to("tcp://127.0.0.1:*").unwrap();
        let address = agent.local_address().unwrap();
        let mut transport = ZmqTransport::connect_to(&address).unwrap();

        let init = EnvMessage::Init {
            action_space: SpaceDescriptor::discrete(2),
            observation_space: SpaceDescriptor::discrete(2),
        };
        let result = transport.exchange(&init, Some(Duration::from_millis(200)));
        assert!(matches!(result, Err(EnvError::Timeout(200))), "got {:?}", result);
        drop(agent);
    }

    #[cfg(feature = "zmq")]
    #[test]
    fn test_zmq_round_trip() {
        use crate::space::{SpaceDescriptor, SpaceValue};

        let agent = ZmqAgentSocket::bind_to("tcp://127.0.0.1:*").unwrap();
        let address = agent.local_address().unwrap();

        let server = std::thread::spawn(move || {
            let first = agent.recv().unwrap();
            assert_eq!(first.kind(), "init");
            agent.reply(&AgentMessage::Action(SpaceValue::Discrete(1))).unwrap();
        });

        let mut transport = ZmqTransport::connect_to(&address).unwrap();
        let init = EnvMessage::Init {
            action_space: SpaceDescriptor::discrete(2),
            observation_space: SpaceDescriptor::discrete(2),
        };
        let reply = transport
            .exchange(&init, Some(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(reply, AgentMessage::Action(SpaceValue::Discrete(1)));
        server.join().unwrap();
    }
}
