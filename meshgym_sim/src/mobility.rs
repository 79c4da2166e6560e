//! Random-direction mobility inside a rectangle.
//!
//! A node picks a uniform heading in `[0, 2π)`, travels at a sampled speed
//! until it reaches the boundary, pauses for a sampled time and then picks a
//! new heading. Kinematics are integrated lazily: [`RandomDirection::advance`]
//! replays every leg and pause that ended since the last update, so the
//! trajectory does not depend on how often the update event runs.

use crate::config::{MobilityConfig, RandomVariable, Rectangle};
use crate::scenario::NodeId;
use nalgebra::Vector3;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::f64::consts::TAU;
use std::time::Duration;
use tracing::info;

/// Distances below this (1 µm) are treated as "on the boundary".
const BOUNDARY_EPSILON: f64 = 1e-6;

/// What a node is doing between two course changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phase {
    /// Travelling; reaches the boundary at `until` (never if `None`)
    Moving { until: Option<Duration> },

    /// Standing still until `until`
    Paused { until: Duration },
}

/// Kinematic state of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct MobilityState {
    /// Position [x, y, z] in meters
    pub position: Vector3<f64>,

    /// Velocity [vx, vy, vz] in m/s (zero while paused)
    pub velocity: Vector3<f64>,

    pub phase: Phase,

    /// Virtual time `position` refers to
    pub updated_at: Duration,

    /// Number of heading or pause changes so far
    pub course_changes: u64,
}

/// Random-direction-2D model shared by all nodes of a scenario.
pub struct RandomDirection {
    bounds: Rectangle,
    speed: RandomVariable,
    pause: RandomVariable,
    trace: bool,

    /// Mobility stream
    rng: ChaCha8Rng,
}

impl RandomDirection {
    pub fn new(config: &MobilityConfig, rng: ChaCha8Rng) -> Self {
        Self {
            bounds: config.bounds,
            speed: config.speed,
            pause: config.pause,
            trace: config.trace_course_changes,
            rng,
        }
    }

    pub fn bounds(&self) -> &Rectangle {
        &self.bounds
    }

    /// Places a node at `position` and starts its first leg at `now`.
    pub fn start(&mut self, id: NodeId, position: Vector3<f64>, now: Duration) -> MobilityState {
        let mut state = MobilityState {
            position: self.clamp(position),
            velocity: Vector3::zeros(),
            phase: Phase::Paused { until: now },
            updated_at: now,
            course_changes: 0,
        };
        self.begin_leg(id, &mut state, now);
        state
    }

    /// Brings `state` up to `now`, replaying every course change on the way.
    pub fn advance(&mut self, id: NodeId, state: &mut MobilityState, now: Duration) {
        if now <= state.updated_at {
            return;
        }

        loop {
            match state.phase {
                Phase::Moving { until: Some(until) } if until <= now => {
                    self.move_to(state, until);
                    self.begin_pause(id, state, until);
                }
                Phase::Paused { until } if until <= now => {
                    state.updated_at = until;
                    self.begin_leg(id, state, until);
                }
                Phase::Moving { .. } => {
                    self.move_to(state, now);
                    break;
                }
                Phase::Paused { .. } => {
                    state.updated_at = now;
                    break;
                }
            }
        }
    }

    /// Abandons the current leg or pause and heads off in a new direction.
    pub fn redirect(&mut self, id: NodeId, state: &mut MobilityState, now: Duration) {
        self.advance(id, state, now);
        self.begin_leg(id, state, now);
    }

    fn move_to(&self, state: &mut MobilityState, at: Duration) {
        let dt = at.saturating_sub(state.updated_at).as_secs_f64();
        state.position = self.clamp(state.position + state.velocity * dt);
        state.updated_at = at;
    }

    fn begin_leg(&mut self, id: NodeId, state: &mut MobilityState, now: Duration) {
        let heading = self.rng.gen_range(0.0..TAU);
        let speed = self.speed.sample(&mut self.rng);
        let mut velocity = Vector3::new(heading.cos() * speed, heading.sin() * speed, 0.0);

        // A node sitting on an edge turns back inside instead of
        // producing a zero-length leg.
        let p = state.position;
        if (p.x - self.bounds.x_max).abs() < BOUNDARY_EPSILON && velocity.x > 0.0
            || (p.x - self.bounds.x_min).abs() < BOUNDARY_EPSILON && velocity.x < 0.0
        {
            velocity.x = -velocity.x;
        }
        if (p.y - self.bounds.y_max).abs() < BOUNDARY_EPSILON && velocity.y > 0.0
            || (p.y - self.bounds.y_min).abs() < BOUNDARY_EPSILON && velocity.y < 0.0
        {
            velocity.y = -velocity.y;
        }

        let until = self
            .time_to_boundary(&p, &velocity)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .map(|travel| now.saturating_add(travel));

        state.velocity = velocity;
        state.phase = Phase::Moving { until };
        state.updated_at = now;
        self.course_change(id, state);
    }

    fn begin_pause(&mut self, id: NodeId, state: &mut MobilityState, now: Duration) {
        let pause = self.pause.sample(&mut self.rng).max(0.0);
        let until = now.saturating_add(Duration::try_from_secs_f64(pause).unwrap_or(Duration::ZERO));

        state.velocity = Vector3::zeros();
        state.phase = Phase::Paused { until };
        self.course_change(id, state);
    }

    fn time_to_boundary(&self, p: &Vector3<f64>, v: &Vector3<f64>) -> Option<f64> {
        let axis = |pos: f64, vel: f64, min: f64, max: f64| -> Option<f64> {
            if vel > 0.0 {
                Some(((max - pos) / vel).max(0.0))
            } else if vel < 0.0 {
                Some(((min - pos) / vel).max(0.0))
            } else {
                None
            }
        };

        let tx = axis(p.x, v.x, self.bounds.x_min, self.bounds.x_max);
        let ty = axis(p.y, v.y, self.bounds.y_min, self.bounds.y_max);
        match (tx, ty) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn clamp(&self, p: Vector3<f64>) -> Vector3<f64> {
        Vector3::new(
            p.x.clamp(self.bounds.x_min, self.bounds.x_max),
            p.y.clamp(self.bounds.y_min, self.bounds.y_max),
            p.z,
        )
    }

    fn course_change(&self, id: NodeId, state: &mut MobilityState) {
        state.course_changes += 1;
        if self.trace {
            let p = state.position;
            info!(
                target: "course_change",
                "CourseChange /NodeList/{}/$ns3::MobilityModel/CourseChange x={}, y={}, z={}",
                id.0,
                p.x,
                p.y,
                p.z
            );
        }
    }
}
