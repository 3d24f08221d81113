//! Rotation-axis calibration for SPIM rigs.
//!
//! - [`peak`]: sub-pixel bead localisation in a single frame
//! - [`geometry`]: plane and circle fits, the [`RotationAxis`]
//! - [`calibrator`]: the [`BeadCalibrator`] that tracks a bead across
//!   rotation steps and fits the axis

pub mod calibrator;
pub mod geometry;
pub mod peak;

pub use calibrator::BeadCalibrator;
pub use geometry::{CircleFit, CircleFitter, PlaneCircleFitter, RotationAxis};
pub use peak::{GaussianPeakFitter, PeakFit, PeakFitter};
