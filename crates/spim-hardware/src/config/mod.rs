//! Application configuration and persisted setups.

pub mod loader;
pub mod store;

pub use loader::{
    CalibrationSettings, CentroidMode, ConfigLoadError, MotionSettings, SetupSettings, SpimConfig,
};
pub use store::{SetupDocument, SetupRecord, SetupStore};
