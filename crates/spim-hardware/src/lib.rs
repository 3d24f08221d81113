//! Device-side services for SPIM rigs: the loaded-device inventory, setup
//! resolution, logical stage control, motion synchronization and the
//! configuration that drives them.

pub use spim_core::capabilities;
pub mod config;
pub mod drivers;
pub mod inventory;
pub mod registry;
pub mod setup;
pub mod synchronizer;
pub mod worker;

pub use config::{SetupStore, SpimConfig};
pub use inventory::{DeviceHandle, DeviceId, DeviceInfo, DeviceInventory};
pub use registry::{DeviceRegistry, MoveRequest};
pub use setup::SetupConfiguration;
pub use synchronizer::{MotionState, MotionStatus, MotionSynchronizer, SyncSettings};
pub use worker::DeviceWorker;
