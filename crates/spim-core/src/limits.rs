//! Shared timing constants and calibration thresholds.
//!
//! This module centralizes:
//! - Polling and settle durations for stage motion
//! - Timeouts for moves and shutdown
//! - Default thresholds of the bead calibrator
//!
//! Application configuration overrides most of these; the constants are the
//! defaults it starts from.

use std::time::Duration;

// =============================================================================
// Motion Timing
// =============================================================================

/// Interval between position samples while an axis converges (50 ms).
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default maximum time a single move may take before it counts as a
/// hardware timeout (30 seconds).
pub const MOVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for graceful shutdown operations (2 seconds).
///
/// Used when stopping polling loops and device workers to allow cleanup
/// before forcing termination.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Default convergence tolerance, in device units.
pub const POSITION_TOLERANCE: f64 = 1e-3;

/// Depth of the per-device command queue.
pub const WORKER_QUEUE_DEPTH: usize = 64;

// =============================================================================
// Calibration
// =============================================================================

/// Delay after the focal axis converges before a slice is snapped (15 ms).
pub const SLICE_SETTLE: Duration = Duration::from_millis(15);

/// Delay after a rotation step converges before the bead search (250 ms).
pub const ROTATION_SETTLE: Duration = Duration::from_millis(250);

/// Default stage micrometres per camera pixel.
pub const UM_PER_PIXEL: f64 = 0.434_782_608_695_652_17;

/// Minimum integrated intensity / background for a slice to count.
pub const MIN_INTENSITY_RATIO: f64 = 0.05;

/// First bead search half-width along the focal axis.
pub const SMALL_SEARCH_RADIUS: f64 = 5.0;

/// Fallback bead search half-width along the focal axis.
pub const LARGE_SEARCH_RADIUS: f64 = 15.0;

/// Points needed before a rotation axis can be fitted.
pub const MIN_CALIBRATION_POINTS: usize = 3;

/// Rotation stage increment between calibration views.
pub const ROTATION_STEP: f64 = 1.0;

// =============================================================================
// Acquisition Planning
// =============================================================================

/// Most positions a parsed stepped range may visit on one axis.
pub const MAX_AXIS_STEPS: i64 = 1_000_000;

/// Most points [`crate::acquisition::AcquisitionRow::schedule`] will expand.
pub const MAX_SCHEDULE_POINTS: usize = 10_000_000;
