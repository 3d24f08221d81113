//! # SPIM DAQ
//!
//! Stage coordination and rotation-axis calibration for light-sheet (SPIM)
//! microscopes. The library re-exports the workspace crates under one roof:
//!
//! - **`core`** ([`spim_core`]): axis roles, scan ranges, the acquisition
//!   row, frames, capability traits and the error taxonomy.
//! - **`hardware`** ([`spim_hardware`]): device inventory, setup
//!   configurations, the [`DeviceRegistry`] and its motion synchronizers,
//!   persisted setups, application config and mock devices.
//! - **`calibration`** ([`spim_calibration`]): bead localisation, circle
//!   fitting and the [`BeadCalibrator`].
//! - **`logging`**: tracing subscriber setup for binaries.

pub use spim_calibration as calibration;
pub use spim_core as core;
pub use spim_hardware as hardware;

pub mod logging;

pub use spim_calibration::{BeadCalibrator, RotationAxis};
pub use spim_core::{AcquisitionRow, AppResult, AxisRangeSpec, LogicalAxis, SpimError};
pub use spim_hardware::{DeviceInventory, DeviceRegistry, MoveRequest, SetupConfiguration, SpimConfig};

/// Install the default subscriber: compact output, `RUST_LOG` or `info`.
pub fn init_tracing() -> anyhow::Result<()> {
    logging::init(logging::TracingConfig::default())
}

/// Commonly used types.
pub mod prelude {
    pub use spim_calibration::{BeadCalibrator, CircleFitter, PeakFitter, RotationAxis};
    pub use spim_core::capabilities::{FrameSource, Movable, ShutterControl, SignalIo, XyStage};
    pub use spim_core::data::{Frame, Roi};
    pub use spim_core::{AcquisitionRow, AppResult, AxisMap, AxisRangeSpec, LogicalAxis, SpimError};
    pub use spim_hardware::config::{CalibrationSettings, MotionSettings, SetupStore, SpimConfig};
    pub use spim_hardware::{
        DeviceInventory, DeviceRegistry, MotionState, MotionSynchronizer, MoveRequest,
        SetupConfiguration,
    };
}
