//! Core types for coordinating a light-sheet (SPIM) microscope.
//!
//! - [`axis`]: logical axis roles and the fixed-size [`axis::AxisMap`]
//! - [`range`]: per-axis scan range descriptors
//! - [`acquisition`]: the cross-axis acquisition geometry
//! - [`capabilities`]: device capability traits
//! - [`data`]: frames and regions of interest
//! - [`error`]: the shared error taxonomy
//! - [`limits`]: timing constants and calibration defaults

pub mod acquisition;
pub mod axis;
pub mod capabilities;
pub mod data;
pub mod error;
pub mod limits;
pub mod range;

pub use acquisition::AcquisitionRow;
pub use axis::{AxisMap, DeviceCategory, LogicalAxis};
pub use error::{AppResult, HardwareError, HardwareErrorKind, SpimError};
pub use range::AxisRangeSpec;
