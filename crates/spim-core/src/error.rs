//! Custom error types for the SPIM stack.
//!
//! This module defines the primary error type, `SpimError`, shared by the core,
//! hardware and calibration crates. It uses `thiserror` so every failure carries
//! a readable message and can be propagated with `?`.
//!
//! ## Error Taxonomy
//!
//! - **`Parse`**: a range descriptor matched none of the accepted grammars.
//!   Fatal to that parse, never retried.
//! - **`InvalidAxis`**: an operation was requested on a logical axis of the wrong
//!   category (e.g. a position query on a camera role). Caller bug.
//! - **`DisconnectedDevice`**: the logical axis has no resolved physical device.
//! - **`Hardware`**: device communication failed during a move or read. Aborts the
//!   current wait or scan and is surfaced to the caller.
//! - **`CalibrationInsufficientData`**: an axis fit was attempted with too few
//!   points. Recoverable; the operation is skipped.
//! - **`BeadLost`**: both bead searches failed the inclusion filter. The attempted
//!   point is not recorded.
//! - **`Cancelled`**: a wait was interrupted by shutdown.
//! - **`Config`**: persisted or application configuration could not be used.
//!
//! `SpimError` is `Clone` so a single failure can be delivered to every task
//! waiting on the same motion goal.

use crate::axis::LogicalAxis;
use thiserror::Error;

// =============================================================================
// Hardware Errors
// =============================================================================

/// Category of a device communication failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareErrorKind {
    /// The device did not answer or answered garbage.
    Communication,
    /// The device did not reach its goal in time.
    Timeout,
    /// The device reported a fault.
    Fault,
    /// The device does not implement the requested operation.
    Unsupported,
}

impl std::fmt::Display for HardwareErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            HardwareErrorKind::Communication => "communication",
            HardwareErrorKind::Timeout => "timeout",
            HardwareErrorKind::Fault => "fault",
            HardwareErrorKind::Unsupported => "unsupported",
        };
        write!(f, "{}", label)
    }
}

/// Structured device failure with the device id attached.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Device '{device}' {kind} error: {message}")]
pub struct HardwareError {
    /// Physical device id that failed.
    pub device: String,
    /// Failure category.
    pub kind: HardwareErrorKind,
    /// Driver-provided detail.
    pub message: String,
}

impl HardwareError {
    /// Create a new hardware error.
    pub fn new(
        device: impl Into<String>,
        kind: HardwareErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            device: device.into(),
            kind,
            message: message.into(),
        }
    }

    /// Wrap a driver-level `anyhow` error as a communication failure.
    ///
    /// The full context chain is kept in the message.
    pub fn communication(device: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::new(device, HardwareErrorKind::Communication, format!("{err:#}"))
    }
}

// =============================================================================
// Application Errors
// =============================================================================

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, SpimError>;

/// Primary error type for stage coordination and calibration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpimError {
    /// A range descriptor matched none of the accepted grammars.
    #[error("Unknown device value description \"{input}\": {reason}")]
    Parse {
        /// The rejected descriptor.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Operation requested on an axis of the wrong category.
    #[error("{operation} called with non-stage device {axis}")]
    InvalidAxis {
        /// Offending logical axis.
        axis: LogicalAxis,
        /// Operation name, for the message.
        operation: &'static str,
    },

    /// Operation requested on an axis with no resolved device.
    #[error("{operation} called on disconnected device {axis}")]
    DisconnectedDevice {
        /// Offending logical axis.
        axis: LogicalAxis,
        /// Operation name, for the message.
        operation: &'static str,
    },

    /// Device communication failure.
    #[error(transparent)]
    Hardware(#[from] HardwareError),

    /// Not enough calibration points for a fit.
    #[error("Axis fit needs at least {required} calibration points, have {available}")]
    CalibrationInsufficientData {
        /// Minimum number of points.
        required: usize,
        /// Points currently recorded.
        available: usize,
    },

    /// Both bead searches failed.
    #[error("Bead lost: no slice passed the inclusion filter within ±{radius} of z={center:.3}")]
    BeadLost {
        /// Predicted focal position of the last search.
        center: f64,
        /// Radius of the last search.
        radius: f64,
    },

    /// The calibration points admit no unique fit (coincident or collinear).
    #[error("Axis fit is degenerate: {0}")]
    DegenerateFit(String),

    /// An acquisition row would expand to more points than allowed.
    #[error("Acquisition plan visits {depth} positions, limit is {limit}")]
    PlanTooLarge {
        /// Positions the row describes (saturated).
        depth: usize,
        /// Largest schedule that will be expanded.
        limit: usize,
    },

    /// A wait was interrupted by shutdown.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Configuration could not be read, parsed or validated.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SpimError {
    /// Build a parse error for `input`.
    pub fn parse(input: impl Into<String>, reason: impl Into<String>) -> Self {
        SpimError::Parse {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Whether the caller can simply carry on (skip the step and keep state).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SpimError::CalibrationInsufficientData { .. }
                | SpimError::BeadLost { .. }
                | SpimError::DegenerateFit(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_error_keeps_context_chain() {
        let err = anyhow::anyhow!("port closed").context("reading position");
        let hw = HardwareError::communication("ZStage", &err);
        assert_eq!(hw.kind, HardwareErrorKind::Communication);
        assert!(hw.message.contains("reading position"));
        assert!(hw.message.contains("port closed"));

        let spim: SpimError = hw.into();
        assert!(spim.to_string().starts_with("Device 'ZStage' communication error"));
    }

    #[test]
    fn only_calibration_failures_are_recoverable() {
        assert!(SpimError::BeadLost {
            center: 0.0,
            radius: 15.0
        }
        .is_recoverable());
        assert!(SpimError::CalibrationInsufficientData {
            required: 3,
            available: 1
        }
        .is_recoverable());
        assert!(!SpimError::parse("x", "bad").is_recoverable());
        assert!(!SpimError::InvalidAxis {
            axis: LogicalAxis::Camera1,
            operation: "position"
        }
        .is_recoverable());
    }
}
