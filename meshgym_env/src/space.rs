//! Observation/action space descriptors and the values exchanged with the agent.
//!
//! Both sides of the agent protocol agree on a [`SpaceDescriptor`] once, at
//! session start. Every value that crosses the boundary afterwards is a
//! [`SpaceValue`], and [`SpaceDescriptor::contains`] is the single place that
//! decides whether a value fits the declared shape.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of a bounded numeric vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    U32,
    I32,
    F32,
    F64,
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dtype::U32 => "uint32",
            Dtype::I32 => "int32",
            Dtype::F32 => "float32",
            Dtype::F64 => "float64",
        };
        f.write_str(name)
    }
}

/// Shape and bounds metadata for observations or actions.
///
/// Computed once per session and treated as constant afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpaceDescriptor {
    /// One choice among `n` options, `0..n`.
    Discrete { n: u32 },

    /// A vector of `shape.iter().product()` elements, each in `[low, high]`.
    Box {
        low: f64,
        high: f64,
        shape: Vec<u32>,
        dtype: Dtype,
    },
}

impl SpaceDescriptor {
    /// Creates a discrete space with `n` choices.
    pub fn discrete(n: u32) -> Self {
        Self::Discrete { n }
    }

    /// Creates a bounded box space.
    pub fn bounded(low: f64, high: f64, shape: Vec<u32>, dtype: Dtype) -> Self {
        Self::Box {
            low,
            high,
            shape,
            dtype,
        }
    }

    /// Number of scalar elements a value of this space carries.
    pub fn element_count(&self) -> usize {
        match self {
            Self::Discrete { .. } => 1,
            Self::Box { shape, .. } => shape.iter().map(|d| *d as usize).product(),
        }
    }

    /// Returns true if `value` has this space's kind, dtype, shape and bounds.
    pub fn contains(&self, value: &SpaceValue) -> bool {
        match (self, value) {
            (Self::Discrete { n }, SpaceValue::Discrete(v)) => v < n,
            (
                Self::Box {
                    low,
                    high,
                    shape,
                    dtype,
                },
                SpaceValue::Box {
                    shape: value_shape,
                    data,
                },
            ) => {
                value_shape == shape
                    && data.dtype() == *dtype
                    && data.len() == self.element_count()
                    && data.as_f64().iter().all(|x| *x >= *low && *x <= *high)
            }
            _ => false,
        }
    }

    /// Draws a uniformly random member of this space.
    ///
    /// Returns `None` for spaces with no members (`Discrete { n: 0 }` or an
    /// inverted/empty integer range) and for float boxes whose width is not
    /// finite, which have no uniform distribution.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<SpaceValue> {
        match self {
            Self::Discrete { n } => {
                if *n == 0 {
                    return None;
                }
                Some(SpaceValue::Discrete(rng.gen_range(0..*n)))
            }
            Self::Box {
                low,
                high,
                shape,
                dtype,
            } => {
                if !(low <= high) {
                    return None;
                }
                let count = self.element_count();
                let data = match dtype {
                    Dtype::U32 => {
                        let lo = low.max(0.0).ceil() as u32;
                        let hi = high.min(u32::MAX as f64).floor() as u32;
                        if lo > hi {
                            return None;
                        }
                        BoxData::U32((0..count).map(|_| rng.gen_range(lo..=hi)).collect())
                    }
                    Dtype::I32 => {
                        let lo = low.max(i32::MIN as f64).ceil() as i32;
                        let hi = high.min(i32::MAX as f64).floor() as i32;
                        if lo > hi {
                            return None;
                        }
                        BoxData::I32((0..count).map(|_| rng.gen_range(lo..=hi)).collect())
                    }
                    Dtype::F32 => {
                        let (lo, hi) = (*low as f32, *high as f32);
                        if !(hi - lo).is_finite() {
                            return None;
                        }
                        BoxData::F32((0..count).map(|_| rng.gen_range(lo..=hi)).collect())
                    }
                    Dtype::F64 => {
                        if !(high - low).is_finite() {
                            return None;
                        }
                        BoxData::F64((0..count).map(|_| rng.gen_range(*low..=*high)).collect())
                    }
                };
                Some(SpaceValue::Box {
                    shape: shape.clone(),
                    data,
                })
            }
        }
    }
}

impl fmt::Display for SpaceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discrete { n } => write!(f, "DiscreteSpace N={}", n),
            Self::Box {
                low,
                high,
                shape,
                dtype,
            } => write!(
                f,
                "BoxSpace Low: {} High: {} Shape: {:?} Dtype: {}",
                low, high, shape, dtype
            ),
        }
    }
}

/// Typed payload of a box value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "values", rename_all = "lowercase")]
pub enum BoxData {
    U32(Vec<u32>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl BoxData {
    pub fn dtype(&self) -> Dtype {
        match self {
            Self::U32(_) => Dtype::U32,
            Self::I32(_) => Dtype::I32,
            Self::F32(_) => Dtype::F32,
            Self::F64(_) => Dtype::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::U32(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widens every element to `f64` (lossless for all supported dtypes).
    pub fn as_f64(&self) -> Vec<f64> {
        match self {
            Self::U32(v) => v.iter().map(|x| *x as f64).collect(),
            Self::I32(v) => v.iter().map(|x| *x as f64).collect(),
            Self::F32(v) => v.iter().map(|x| *x as f64).collect(),
            Self::F64(v) => v.clone(),
        }
    }
}

/// A value that belongs (or claims to belong) to a [`SpaceDescriptor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceValue {
    Discrete(u32),
    Box { shape: Vec<u32>, data: BoxData },
}

impl SpaceValue {
    /// Convenience constructor for a flat `u32` vector.
    pub fn u32_vector(values: Vec<u32>) -> Self {
        Self::Box {
            shape: vec![values.len() as u32],
            data: BoxData::U32(values),
        }
    }

    /// Returns the discrete choice, if this is a discrete value.
    pub fn as_discrete(&self) -> Option<u32> {
        match self {
            Self::Discrete(v) => Some(*v),
            Self::Box { .. } => None,
        }
    }
}

impl fmt::Display for SpaceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discrete(v) => write!(f, "DiscreteValue: {}", v),
            Self::Box { shape, data } => {
                write!(f, "BoxValue Shape: {:?} Dtype: {} Data: {:?}", shape, data.dtype(), data.as_f64())
            }
        }
    }
}

/// Action submitted by the agent.
pub type ActionValue = SpaceValue;

/// Observation sent to the agent.
pub type ObservationValue = SpaceValue;
