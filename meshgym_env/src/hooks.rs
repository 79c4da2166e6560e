//! The state query façade an environment exposes to the step bridge.

use crate::space::{ActionValue, ObservationValue, SpaceDescriptor};
use crate::types::StepRecord;
use std::time::Duration;

/// Deferred mutation of a model of type `M`.
pub type DeferredAction<M> = Box<dyn FnOnce(&mut M)>;

/// The only way a hook may change the model: by scheduling work.
///
/// Implemented by the discrete-event scheduler. Mutations handed to
/// [`ActionScheduler::defer`] run later as ordinary events, so the model has
/// a single writer per event.
pub trait ActionScheduler<M> {
    /// Current virtual time.
    fn now(&self) -> Duration;

    /// Schedules `apply` to run `delay` after the current virtual time.
    fn defer(&mut self, delay: Duration, apply: DeferredAction<M>);
}

/// Named state queries over a model `M`.
///
/// # Contract
///
/// - Every query reads `M` and never advances the clock or schedules events.
/// - Queries take `&mut self` because some of them keep session-scoped
///   counters (a reward accumulator, a step counter); callers must not
///   assume repeated calls return the same value.
/// - [`EnvironmentHooks::execute_action`] is the only hook allowed to cause
///   mutation, and only through the [`ActionScheduler`]. A value that the
///   declared action space does not contain must be rejected without
///   scheduling anything.
pub trait EnvironmentHooks<M> {
    /// Declared action space (constant for the session).
    fn action_space(&self) -> SpaceDescriptor;

    /// Declared observation space (constant for the session).
    fn observation_space(&self) -> SpaceDescriptor;

    /// Current observation. Must be contained in `observation_space()`.
    fn observation(&mut self, model: &M) -> ObservationValue;

    /// Reward for the current step.
    fn reward(&mut self, model: &M) -> f32;

    /// Whether the episode is over.
    fn game_over(&mut self, model: &M) -> bool;

    /// Free-form diagnostic string.
    fn extra_info(&mut self, model: &M) -> String;

    /// Applies an action. Returns false if the action was rejected.
    fn execute_action(
        &mut self,
        action: &ActionValue,
        scheduler: &mut dyn ActionScheduler<M>,
    ) -> bool;

    /// Gathers one [`StepRecord`], querying observation, reward, game-over
    /// and extra-info in that order.
    fn collect_step(&mut self, model: &M) -> StepRecord {
        let observation = self.observation(model);
        let reward = self.reward(model);
        let game_over = self.game_over(model);
        let extra_info = self.extra_info(model);
        StepRecord {
            observation,
            reward,
            game_over,
            extra_info,
        }
    }
}
