//! Device drivers.
//!
//! Only simulated hardware ships with the crate; real drivers implement the
//! capability traits in `spim_core::capabilities` and are registered in a
//! [`DeviceInventory`](crate::inventory::DeviceInventory) the same way.

pub mod mock;
