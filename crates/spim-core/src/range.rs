//! Per-axis scan range descriptors.
//!
//! An [`AxisRangeSpec`] describes how one axis moves during an acquisition.
//! Three textual grammars are accepted, tried in this order:
//!
//! | Grammar | Meaning |
//! |---------|---------|
//! | `<start>-<end>@<speed>` | continuous sweep from `start` to `end` at `speed` |
//! | `<start>:<step>:<end>` | stepped scan, `step` apart, `end` inclusive |
//! | `<value>` | single position |
//!
//! # Example
//!
//! ```
//! use spim_core::range::AxisRangeSpec;
//!
//! let stepped: AxisRangeSpec = "10:2:20".parse().unwrap();
//! assert_eq!(stepped.step_count(), 6);
//! assert_eq!(stepped.to_string(), "10.000:2.000:20.000");
//!
//! let sweep: AxisRangeSpec = "5-25@100".parse().unwrap();
//! assert!(sweep.is_continuous());
//! assert_eq!(sweep.step_count(), AxisRangeSpec::CONTINUOUS_STEPS);
//! ```

use crate::error::SpimError;
use crate::limits::MAX_AXIS_STEPS;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Slack added before flooring the step count, so `0:0.1:0.3` yields 4 steps
/// despite `0.3 / 0.1 < 3` in binary floating point.
const STEP_EPSILON: f64 = 1e-9;

/// Scan range of a single axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AxisRangeSpec {
    start: f64,
    end: f64,
    step_or_speed: f64,
    continuous: bool,
}

impl AxisRangeSpec {
    /// Step count reported by continuous ranges.
    pub const CONTINUOUS_STEPS: i64 = -1;

    /// A single fixed position.
    pub fn single(position: f64) -> Self {
        Self {
            start: position,
            end: position,
            step_or_speed: 0.0,
            continuous: false,
        }
    }

    /// Stepped scan from `start` to `end` (inclusive) every `step`.
    pub fn stepped(start: f64, step: f64, end: f64) -> Self {
        Self {
            start,
            end,
            step_or_speed: step,
            continuous: false,
        }
    }

    /// Continuous sweep from `start` to `end` at `speed`.
    pub fn continuous(start: f64, end: f64, speed: f64) -> Self {
        Self {
            start,
            end,
            step_or_speed: speed,
            continuous: true,
        }
    }

    /// Parse a descriptor in any of the three grammars.
    pub fn parse(input: &str) -> Result<Self, SpimError> {
        let text = input.trim();
        if text.is_empty() {
            return Err(SpimError::parse(input, "empty descriptor"));
        }

        if let Some((range, speed)) = text.split_once('@') {
            let (start, end) = split_range(range)
                .ok_or_else(|| SpimError::parse(input, "expected <start>-<end>@<speed>"))?;
            return Ok(Self::continuous(
                number(input, start)?,
                number(input, end)?,
                number(input, speed)?,
            ));
        }

        if text.contains(':') {
            let parts: Vec<&str> = text.split(':').collect();
            let [start, step, end] = parts.as_slice() else {
                return Err(SpimError::parse(input, "expected <start>:<step>:<end>"));
            };
            let spec = Self::stepped(number(input, start)?, number(input, step)?, number(input, end)?);
            if spec.step_count() > MAX_AXIS_STEPS {
                return Err(SpimError::parse(
                    input,
                    format!("more than {MAX_AXIS_STEPS} steps"),
                ));
            }
            return Ok(spec);
        }

        Ok(Self::single(number(input, text)?))
    }

    /// First position.
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Last position.
    pub fn end(&self) -> f64 {
        self.end
    }

    /// Raw step (stepped) or speed (continuous).
    pub fn step_or_speed(&self) -> f64 {
        self.step_or_speed
    }

    /// True for continuous sweeps.
    pub fn is_continuous(&self) -> bool {
        self.continuous
    }

    /// Step size, or -1 for continuous sweeps.
    pub fn step_size(&self) -> f64 {
        if self.continuous {
            -1.0
        } else {
            self.step_or_speed
        }
    }

    /// Sweep speed, or 0 for stepped ranges.
    pub fn speed(&self) -> f64 {
        if self.continuous {
            self.step_or_speed
        } else {
            0.0
        }
    }

    /// Number of discrete positions visited.
    ///
    /// [`Self::CONTINUOUS_STEPS`] for continuous sweeps and 1 for a zero step.
    /// A step pointing away from `end` yields 0. Saturates at `i64::MAX` for
    /// ranges built with [`Self::stepped`] that exceed it.
    pub fn step_count(&self) -> i64 {
        if self.continuous {
            return Self::CONTINUOUS_STEPS;
        }
        if self.step_or_speed == 0.0 {
            return 1;
        }
        let intervals = ((self.end - self.start) / self.step_or_speed + STEP_EPSILON).floor();
        if intervals < 0.0 {
            0
        } else {
            // `as` saturates at i64::MAX
            (intervals as i64).saturating_add(1)
        }
    }

    /// Positions visited, in order.
    ///
    /// Continuous sweeps yield their two endpoints. At most
    /// [`MAX_AXIS_STEPS`] positions are produced.
    pub fn positions(&self) -> Vec<f64> {
        if self.continuous {
            return vec![self.start, self.end];
        }
        if self.step_or_speed == 0.0 {
            return vec![self.start];
        }
        (0..self.step_count().min(MAX_AXIS_STEPS))
            .map(|i| self.start + i as f64 * self.step_or_speed)
            .collect()
    }

    /// Shift start and end by `delta`.
    pub fn translate(&mut self, delta: f64) {
        self.start += delta;
        self.end += delta;
    }
}

/// Split `<start>-<end>` on the first `-` that is neither a leading sign nor
/// an exponent sign.
fn split_range(range: &str) -> Option<(&str, &str)> {
    let bytes = range.as_bytes();
    let at = (1..bytes.len())
        .find(|&i| bytes[i] == b'-' && !matches!(bytes[i - 1], b'e' | b'E' | b'-'))?;
    Some((&range[..at], &range[at + 1..]))
}

fn number(input: &str, component: &str) -> Result<f64, SpimError> {
    let component = component.trim();
    if component.is_empty() {
        return Err(SpimError::parse(input, "empty component"));
    }
    let value: f64 = component
        .parse()
        .map_err(|_| SpimError::parse(input, format!("'{component}' is not a number")))?;
    if !value.is_finite() {
        return Err(SpimError::parse(input, format!("'{component}' is not finite")));
    }
    Ok(value)
}

impl fmt::Display for AxisRangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.continuous {
            write!(
                f,
                "{:.3}-{:.3}@{}",
                self.start, self.end, self.step_or_speed
            )
        } else if self.step_or_speed == 0.0 {
            write!(f, "{}", self.start)
        } else {
            write!(
                f,
                "{:.3}:{:.3}:{:.3}",
                self.start, self.step_or_speed, self.end
            )
        }
    }
}

impl FromStr for AxisRangeSpec {
    type Err = SpimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AxisRangeSpec {
    type Error = SpimError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AxisRangeSpec> for String {
    fn from(spec: AxisRangeSpec) -> Self {
        spec.to_string()
    }
}
