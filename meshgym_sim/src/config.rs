//! Scenario and session configuration.
//!
//! Every config struct has a `Default` matching the reference scenarios and a
//! `validate()` that runs before any event is scheduled. Validation failures
//! are [`ConfigError`]s; the CLI reports them and exits with status 1.

use crate::seeds::SeedStreams;
use rand::Rng;
use rand_distr::{Distribution, Exp, Uniform};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Minimum stop time accepted by the standalone ad-hoc scenario.
pub const MIN_STOP_TIME_SECS: f64 = 10.0;

/// Rejected configuration values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Use a simulation stop time >= {min} seconds (got {got})")]
    StopTimeTooShort { got: f64, min: f64 },

    #[error("Step interval must be a positive number of seconds (got {0})")]
    InvalidStepInterval(f64),

    #[error("Node count must be at least {min} (got {got})")]
    InvalidNodeCount { got: usize, min: usize },

    #[error("Invalid random variable '{0}': expected constant:V, uniform:MIN,MAX or exponential:MEAN")]
    InvalidRandomVariable(String),

    #[error("Invalid bounds: {0}")]
    InvalidBounds(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Converts validated seconds to a [`Duration`].
pub fn secs_to_duration(field: &'static str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::invalid(field, e.to_string()))
}

// ============================================================================
// RANDOM VARIABLES
// ============================================================================

/// Scalar distribution used for mobility speed and pause times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RandomVariable {
    Constant(f64),
    Uniform { min: f64, max: f64 },
    Exponential { mean: f64 },
}

impl RandomVariable {
    /// Draws one value. Constants consume no randomness.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            RandomVariable::Constant(value) => value,
            RandomVariable::Uniform { min, max } => {
                if min == max {
                    min
                } else {
                    Uniform::new_inclusive(min, max).sample(rng)
                }
            }
            RandomVariable::Exponential { mean } => match Exp::new(1.0 / mean) {
                Ok(exp) => exp.sample(rng),
                Err(_) => mean,
            },
        }
    }

    /// Checks that every draw is finite and non-negative.
    pub fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        let ok = match *self {
            RandomVariable::Constant(v) => v.is_finite() && v >= 0.0,
            RandomVariable::Uniform { min, max } => {
                min.is_finite() && max.is_finite() && min >= 0.0 && min <= max
            }
            RandomVariable::Exponential { mean } => mean.is_finite() && mean > 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(ConfigError::invalid(field, format!("{} must be finite and non-negative", self)))
        }
    }

    fn parse_ns3(s: &str) -> Option<Self> {
        // ns3::ConstantRandomVariable[Constant=2]
        let rest = s.strip_prefix("ns3::")?;
        let (kind, attrs) = rest.split_once('[')?;
        let attrs = attrs.strip_suffix(']')?;
        let get = |name: &str| -> Option<f64> {
            attrs
                .split('|')
                .filter_map(|kv| kv.split_once('='))
                .find(|(k, _)| *k == name)
                .and_then(|(_, v)| v.trim().parse().ok())
        };
        match kind {
            "ConstantRandomVariable" => Some(Self::Constant(get("Constant")?)),
            "UniformRandomVariable" => Some(Self::Uniform {
                min: get("Min").unwrap_or(0.0),
                max: get("Max").unwrap_or(1.0),
            }),
            "ExponentialRandomVariable" => Some(Self::Exponential {
                mean: get("Mean").unwrap_or(1.0),
            }),
            _ => None,
        }
    }
}

impl FromStr for RandomVariable {
    type Err = ConfigError;

    /// Accepts `constant:V`, `uniform:MIN,MAX`, `exponential:MEAN`, a bare
    /// number (constant), or the ns-3 attribute form
    /// `ns3::ConstantRandomVariable[Constant=2]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ConfigError::InvalidRandomVariable(s.to_string());
        let s = s.trim();

        if s.starts_with("ns3::") {
            return Self::parse_ns3(s).ok_or_else(err);
        }
        if let Ok(value) = s.parse::<f64>() {
            return Ok(Self::Constant(value));
        }

        let (kind, args) = s.split_once(':').ok_or_else(err)?;
        let nums: Vec<f64> = args
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| err())?;

        match (kind.to_lowercase().as_str(), nums.as_slice()) {
            ("constant", [v]) => Ok(Self::Constant(*v)),
            ("uniform", [min, max]) => Ok(Self::Uniform { min: *min, max: *max }),
            ("exponential", [mean]) => Ok(Self::Exponential { mean: *mean }),
            _ => Err(err()),
        }
    }
}

impl fmt::Display for RandomVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RandomVariable::Constant(v) => write!(f, "constant:{}", v),
            RandomVariable::Uniform { min, max } => write!(f, "uniform:{},{}", min, max),
            RandomVariable::Exponential { mean } => write!(f, "exponential:{}", mean),
        }
    }
}

// ============================================================================
// GEOMETRY
// ============================================================================

/// Axis-aligned rectangle nodes move within.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectangle {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Rectangle {
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = [self.x_min, self.x_max, self.y_min, self.y_max]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.x_min >= self.x_max || self.y_min >= self.y_max {
            return Err(ConfigError::InvalidBounds(format!(
                "{} is empty or not finite",
                self
            )));
        }
        Ok(())
    }
}

impl Default for Rectangle {
    fn default() -> Self {
        Self::new(-500.0, 500.0, -500.0, 500.0)
    }
}

impl FromStr for Rectangle {
    type Err = ConfigError;

    /// `x_min,x_max,y_min,y_max` (`|` separators are accepted too).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let nums: Vec<f64> = s
            .split([',', '|'])
            .map(|v| v.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| ConfigError::InvalidBounds(s.to_string()))?;
        match nums.as_slice() {
            [x_min, x_max, y_min, y_max] => Ok(Self::new(*x_min, *x_max, *y_min, *y_max)),
            _ => Err(ConfigError::InvalidBounds(s.to_string())),
        }
    }
}

impl fmt::Display for Rectangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x_min, self.x_max, self.y_min, self.y_max)
    }
}

/// Fill order of the initial position grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GridLayout {
    #[default]
    RowFirst,
    ColumnFirst,
}

impl FromStr for GridLayout {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "rowfirst" => Ok(GridLayout::RowFirst),
            "columnfirst" => Ok(GridLayout::ColumnFirst),
            _ => Err(ConfigError::invalid("layout", format!("unknown layout '{}'", s))),
        }
    }
}

/// Initial node placement on a regular grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridConfig {
    pub min_x: f64,
    pub min_y: f64,
    pub delta_x: f64,
    pub delta_y: f64,
    pub grid_width: u32,
    pub layout: GridLayout,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            min_x: 20.0,
            min_y: 20.0,
            delta_x: 20.0,
            delta_y: 20.0,
            grid_width: 5,
            layout: GridLayout::RowFirst,
        }
    }
}

// ============================================================================
// SCENARIO
// ============================================================================

/// Random-direction mobility parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct MobilityConfig {
    pub bounds: Rectangle,
    /// Speed in m/s
    pub speed: RandomVariable,
    /// Pause at the boundary in seconds
    pub pause: RandomVariable,
    /// Period of the kinematics update event
    pub update_interval: Duration,
    /// Log every course change
    pub trace_course_changes: bool,
}

impl Default for MobilityConfig {
    fn default() -> Self {
        Self {
            bounds: Rectangle::default(),
            speed: RandomVariable::Constant(2.0),
            pause: RandomVariable::Constant(0.2),
            update_interval: Duration::from_millis(100),
            trace_course_changes: false,
        }
    }
}

/// Routing protocol selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutingProtocol {
    /// Multi-hop shortest-path table refreshed periodically
    #[default]
    Olsr,
    /// Direct neighbors only
    None,
}

impl FromStr for RoutingProtocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "olsr" => Ok(RoutingProtocol::Olsr),
            "none" | "direct" => Ok(RoutingProtocol::None),
            _ => Err(ConfigError::invalid("routing", format!("unknown protocol '{}'", s))),
        }
    }
}

impl fmt::Display for RoutingProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingProtocol::Olsr => f.write_str("olsr"),
            RoutingProtocol::None => f.write_str("none"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutingConfig {
    pub protocol: RoutingProtocol,
    /// Link range in meters
    pub radio_range: f64,
    /// Period of the routing refresh event (OLSR HELLO interval)
    pub refresh_interval: Duration,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            protocol: RoutingProtocol::Olsr,
            radio_range: 100.0,
            refresh_interval: Duration::from_secs(2),
        }
    }
}

/// Constant-bit-rate traffic between random node pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficConfig {
    pub flows: usize,
    /// Bytes per packet
    pub packet_size: u32,
    /// Bits per second
    pub data_rate_bps: u64,
}

impl TrafficConfig {
    /// Time between two packets of one flow.
    pub fn packet_interval(&self) -> Duration {
        let bits = self.packet_size as f64 * 8.0;
        Duration::from_secs_f64(bits / self.data_rate_bps.max(1) as f64)
    }
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            flows: 1,
            packet_size: 1472,
            data_rate_bps: 100_000,
        }
    }
}

/// Everything needed to build a [`crate::Scenario`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioConfig {
    pub node_count: usize,
    pub grid: GridConfig,
    pub mobility: MobilityConfig,
    pub routing: RoutingConfig,
    pub traffic: TrafficConfig,
}

impl ScenarioConfig {
    /// Reference configuration with `node_count` nodes.
    pub fn with_nodes(node_count: usize) -> Self {
        Self {
            node_count,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_count == 0 {
            return Err(ConfigError::InvalidNodeCount {
                got: self.node_count,
                min: 1,
            });
        }
        if self.grid.grid_width == 0 {
            return Err(ConfigError::invalid("grid_width", "must be at least 1"));
        }
        self.mobility.bounds.validate()?;
        self.mobility.speed.validate("speed")?;
        self.mobility.pause.validate("pause")?;
        if self.mobility.update_interval.is_zero() {
            return Err(ConfigError::invalid("mobility_interval", "must be positive"));
        }
        if !(self.routing.radio_range.is_finite() && self.routing.radio_range > 0.0) {
            return Err(ConfigError::invalid("radio_range", "must be positive"));
        }
        if self.routing.refresh_interval.is_zero() {
            return Err(ConfigError::invalid("routing_interval", "must be positive"));
        }
        if self.traffic.flows > 0 {
            if self.node_count < 2 {
                return Err(ConfigError::InvalidNodeCount {
                    got: self.node_count,
                    min: 2,
                });
            }
            if self.traffic.packet_size == 0 || self.traffic.data_rate_bps == 0 {
                return Err(ConfigError::invalid("traffic", "packet size and data rate must be positive"));
            }
        }
        Ok(())
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            node_count: 2,
            grid: GridConfig::default(),
            mobility: MobilityConfig::default(),
            routing: RoutingConfig::default(),
            traffic: TrafficConfig::default(),
        }
    }
}

// ============================================================================
// RUN MODES
// ============================================================================

/// Environment session parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvConfig {
    /// Seconds between two steps
    pub step_interval_secs: f64,
    /// Game over after this many steps (never if `None`)
    pub max_steps: Option<u64>,
    /// Bound on the wait for one agent reply (wait forever if `None`)
    pub action_timeout: Option<Duration>,
    /// Upper bound of each observation element
    pub observation_high: u32,
}

impl EnvConfig {
    pub fn step_interval(&self) -> Result<Duration, ConfigError> {
        if !(self.step_interval_secs.is_finite() && self.step_interval_secs > 0.0) {
            return Err(ConfigError::InvalidStepInterval(self.step_interval_secs));
        }
        let interval = secs_to_duration("step_interval", self.step_interval_secs)?;
        if interval.is_zero() {
            return Err(ConfigError::InvalidStepInterval(self.step_interval_secs));
        }
        Ok(interval)
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            step_interval_secs: 0.1,
            max_steps: None,
            action_timeout: None,
            observation_high: 10,
        }
    }
}

/// Agent-driven run (reinforcement-learning environment).
#[derive(Debug, Clone, PartialEq)]
pub struct GymConfig {
    pub scenario: ScenarioConfig,
    pub env: EnvConfig,
    pub sim_time_secs: f64,
    pub seeds: SeedStreams,
}

impl GymConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scenario.validate()?;
        self.env.step_interval()?;
        self.sim_time()?;
        Ok(())
    }

    pub fn sim_time(&self) -> Result<Duration, ConfigError> {
        if !(self.sim_time_secs.is_finite() && self.sim_time_secs > 0.0) {
            return Err(ConfigError::invalid("sim_time", format!("{} is not a positive duration", self.sim_time_secs)));
        }
        secs_to_duration("sim_time", self.sim_time_secs)
    }
}

impl Default for GymConfig {
    fn default() -> Self {
        Self {
            scenario: ScenarioConfig::default(),
            env: EnvConfig::default(),
            sim_time_secs: 1.0,
            seeds: SeedStreams::default(),
        }
    }
}

/// Standalone mesh run without an agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AdhocConfig {
    pub scenario: ScenarioConfig,
    pub stop_time_secs: f64,
    pub seeds: SeedStreams,
}

impl AdhocConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stop_time()?;
        self.scenario.validate()
    }

    /// Stop time, rejected below [`MIN_STOP_TIME_SECS`].
    pub fn stop_time(&self) -> Result<Duration, ConfigError> {
        if self.stop_time_secs.is_nan() || self.stop_time_secs < MIN_STOP_TIME_SECS {
            return Err(ConfigError::StopTimeTooShort {
                got: self.stop_time_secs,
                min: MIN_STOP_TIME_SECS,
            });
        }
        secs_to_duration("stop_time", self.stop_time_secs)
    }
}

impl Default for AdhocConfig {
    fn default() -> Self {
        Self {
            scenario: ScenarioConfig::with_nodes(25),
            stop_time_secs: 20.0,
            seeds: SeedStreams::default(),
        }
    }
}
