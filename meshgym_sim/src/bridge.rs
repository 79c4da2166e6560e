//! Step bridge between the scheduler loop and an external agent.
//!
//! Once per step interval a periodic event hands the current model to the
//! [`EnvironmentHooks`], sends the resulting [`StepRecord`] to the agent and
//! blocks until the agent answers. The virtual clock does not move while the
//! bridge waits, so the agent always acts on the snapshot it was sent.
//!
//! ```text
//!   Idle ──timer fires──► AwaitingAction ──Action──► Applying ──► Idle
//!                               │
//!                               └──StopSimulation──► Idle (scheduler stopped)
//! ```
//!
//! [`StepRecord`]: meshgym_env::StepRecord

use crate::error::SimError;
use crate::scheduler::{Scheduler, TimerId};
use meshgym_env::{AgentMessage, AgentTransport, EndReason, EnvError, EnvMessage, EnvironmentHooks};
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where the bridge is within one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    AwaitingAction,
    Applying,
}

/// Counters over one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    /// State messages sent
    pub steps: u64,
    pub actions_applied: u64,
    /// Actions outside the declared action space
    pub actions_rejected: u64,
}

/// Performs the per-step exchange.
pub struct StepBridge<H, T> {
    hooks: H,
    transport: T,
    state: BridgeState,
    stats: BridgeStats,
    action_timeout: Option<Duration>,

    /// Set when the agent or the environment ended the episode
    outcome: Option<EndReason>,

    /// Virtual time of the last step
    last_step_at: Duration,

    /// Clock value when the scheduler loop halted
    halted_at: Option<Duration>,

    end_sent: bool,
}

impl<H, T: AgentTransport> StepBridge<H, T> {
    pub fn new(hooks: H, transport: T, action_timeout: Option<Duration>) -> Self {
        Self {
            hooks,
            transport,
            state: BridgeState::Idle,
            stats: BridgeStats::default(),
            action_timeout,
            outcome: None,
            last_step_at: Duration::ZERO,
            halted_at: None,
            end_sent: false,
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Why the episode ended, if the agent or the environment ended it.
    pub fn outcome(&self) -> Option<&EndReason> {
        self.outcome.as_ref()
    }

    /// Sends both space descriptors and waits for the agent's `Ack`.
    pub fn handshake<M>(&mut self) -> Result<(), SimError>
    where
        H: EnvironmentHooks<M>,
    {
        let init = EnvMessage::Init {
            action_space: self.hooks.action_space(),
            observation_space: self.hooks.observation_space(),
        };
        info!(
            peer = %self.transport.peer(),
            action_space = %self.hooks.action_space(),
            observation_space = %self.hooks.observation_space(),
            "Opening environment session"
        );

        match self.transport.exchange(&init, self.action_timeout)? {
            AgentMessage::Ack => Ok(()),
            other => Err(EnvError::protocol(format!("expected ack to init, got {}", other.kind())).into()),
        }
    }

    /// One step: snapshot, exchange, apply.
    ///
    /// Transport and protocol errors are returned and abort the run.
    pub fn step<M: 'static>(&mut self, scheduler: &mut Scheduler<M>, model: &mut M) -> Result<(), SimError>
    where
        H: EnvironmentHooks<M>,
    {
        let now = scheduler.now();
        self.last_step_at = now;
        self.state = BridgeState::AwaitingAction;

        let record = self.hooks.collect_step(model);
        let game_over = record.game_over;
        let message = EnvMessage::State {
            step: self.stats.steps,
            time_secs: now.as_secs_f64(),
            record,
        };
        self.stats.steps += 1;

        let reply = match self.transport.exchange(&message, self.action_timeout) {
            Ok(reply) => reply,
            Err(e) => {
                self.state = BridgeState::Idle;
                return Err(e.into());
            }
        };

        match reply {
            AgentMessage::Action(action) => {
                self.state = BridgeState::Applying;
                if self.hooks.execute_action(&action, scheduler) {
                    self.stats.actions_applied += 1;
                } else {
                    self.stats.actions_rejected += 1;
                    warn!(action = %action, at = ?now, "Rejected action outside the action space");
                }
            }
            AgentMessage::StopSimulation => {
                info!(at = ?now, "Agent requested stop");
                self.outcome.get_or_insert(EndReason::AgentStopped);
                scheduler.stop();
            }
            AgentMessage::Ack => {
                self.state = BridgeState::Idle;
                return Err(EnvError::protocol("expected action or stop_simulation, got ack").into());
            }
        }

        if game_over {
            info!(at = ?now, "Game over");
            self.outcome.get_or_insert(EndReason::GameOver);
            scheduler.stop();
        }

        self.state = BridgeState::Idle;
        debug!(step = self.stats.steps, at = ?now, "Step complete");
        Ok(())
    }

    /// Sends the end-of-session notice once. Later calls are no-ops.
    pub fn notify_end(&mut self, reason: EndReason, now: Duration) -> Result<(), EnvError> {
        if self.end_sent {
            return Ok(());
        }
        self.end_sent = true;

        info!(reason = %reason, steps = self.stats.steps, "Notifying simulation end");
        let end = EnvMessage::SimulationEnd {
            reason,
            steps: self.stats.steps,
            time_secs: now.as_secs_f64(),
        };
        match self.transport.exchange(&end, self.action_timeout)? {
            AgentMessage::Ack => Ok(()),
            other => {
                debug!(reply = other.kind(), "Unexpected reply to simulation end");
                Ok(())
            }
        }
    }
}

/// An open environment session on a scheduler.
///
/// Owns the bridge (shared with the step timer) and closes the session with
/// exactly one `SimulationEnd` notice, sent by [`EnvironmentSession::finish`]
/// or, failing that, on drop.
pub struct EnvironmentSession<H, T: AgentTransport> {
    bridge: Rc<RefCell<StepBridge<H, T>>>,
    timer: TimerId,
    step_interval: Duration,
}

impl<H: 'static, T: AgentTransport + 'static> EnvironmentSession<H, T> {
    /// Performs the handshake and arms the step timer: first step at the
    /// scheduler's current time, then every `step_interval`.
    pub fn open<M: 'static>(
        hooks: H,
        transport: T,
        step_interval: Duration,
        action_timeout: Option<Duration>,
        scheduler: &mut Scheduler<M>,
    ) -> Result<Self, SimError>
    where
        H: EnvironmentHooks<M>,
    {
        let mut bridge = StepBridge::new(hooks, transport, action_timeout);
        bridge.handshake::<M>()?;

        let bridge = Rc::new(RefCell::new(bridge));
        let stepper = Rc::clone(&bridge);
        let timer = scheduler.schedule_periodic(Duration::ZERO, step_interval, move |s, model: &mut M| {
            stepper.borrow_mut().step(s, model)
        })?;

        debug!(interval = ?step_interval, "Step timer armed");
        Ok(Self {
            bridge,
            timer,
            step_interval,
        })
    }

    pub fn step_interval(&self) -> Duration {
        self.step_interval
    }

    pub fn stats(&self) -> BridgeStats {
        self.bridge.borrow().stats().clone()
    }

    pub fn state(&self) -> BridgeState {
        self.bridge.borrow().state()
    }

    /// Runs `f` against the hooks (e.g. to read session counters).
    pub fn with_hooks<R>(&self, f: impl FnOnce(&H) -> R) -> R {
        f(self.bridge.borrow().hooks())
    }

    /// End reason for a run that returned `result`.
    pub fn end_reason<S>(&self, result: &Result<S, SimError>) -> EndReason {
        match result {
            Err(e) => EndReason::Error(e.to_string()),
            Ok(_) => self
                .bridge
                .borrow()
                .outcome()
                .cloned()
                .unwrap_or(EndReason::StopTimeReached),
        }
    }

    /// Records the clock value the run halted at. The end notice sent on
    /// drop reports it instead of the last step time.
    pub fn record_halt(&self, now: Duration) {
        self.bridge.borrow_mut().halted_at = Some(now);
    }

    /// Stops stepping and notifies the agent.
    pub fn finish<M: 'static>(&self, reason: EndReason, scheduler: &mut Scheduler<M>) -> Result<(), SimError> {
        scheduler.cancel_timer(self.timer);
        self.record_halt(scheduler.now());
        self.bridge.borrow_mut().notify_end(reason, scheduler.now())?;
        Ok(())
    }
}

impl<H, T: AgentTransport> Drop for EnvironmentSession<H, T> {
    fn drop(&mut self) {
        let Ok(mut bridge) = self.bridge.try_borrow_mut() else {
            return;
        };
        if bridge.end_sent {
            return;
        }
        let reason = bridge
            .outcome
            .clone()
            .unwrap_or_else(|| EndReason::Error("session closed without end notice".to_string()));
        let at = bridge.halted_at.unwrap_or(bridge.last_step_at);
        if let Err(e) = bridge.notify_end(reason, at) {
            warn!(error = %e, "Could not notify agent of simulation end");
        }
    }
}
