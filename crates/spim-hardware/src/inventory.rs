//! Loaded device inventory.
//!
//! The inventory is the set of physical devices the application has loaded,
//! each registered under a unique id with exactly one [`DeviceCategory`]. It
//! also records the rig's *default* devices (XY stage, focus stage, shutter,
//! camera), which drive automatic setup resolution.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut inventory = DeviceInventory::new();
//! inventory.register("ZStage", "Focus drive", DeviceHandle::Stage(Arc::new(MockStage::new())))?;
//! inventory.set_default_focus("ZStage")?;
//!
//! for id in inventory.loaded_devices(DeviceCategory::Stage) {
//!     println!("{id}");
//! }
//! ```

use anyhow::{anyhow, Result};
use spim_core::axis::DeviceCategory;
use spim_core::capabilities::{FrameSource, Movable, ShutterControl, SignalIo, XyStage};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Physical device identifier.
pub type DeviceId = String;

// =============================================================================
// Device Handles
// =============================================================================

/// A loaded device, typed by the capability its category provides.
#[derive(Clone)]
pub enum DeviceHandle {
    /// Single-axis stage
    Stage(Arc<dyn Movable>),
    /// Combined XY stage
    XyStage(Arc<dyn XyStage>),
    /// Shutter / laser
    Shutter(Arc<dyn ShutterControl>),
    /// Camera
    Camera(Arc<dyn FrameSource>),
    /// Signal line
    SignalIo(Arc<dyn SignalIo>),
}

impl DeviceHandle {
    /// Category of the wrapped device.
    pub fn category(&self) -> DeviceCategory {
        match self {
            DeviceHandle::Stage(_) => DeviceCategory::Stage,
            DeviceHandle::XyStage(_) => DeviceCategory::XyStage,
            DeviceHandle::Shutter(_) => DeviceCategory::Shutter,
            DeviceHandle::Camera(_) => DeviceCategory::Camera,
            DeviceHandle::SignalIo(_) => DeviceCategory::SignalIo,
        }
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceHandle::{:?}", self.category())
    }
}

/// Information about a loaded device (returned by list operations)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Unique identifier
    pub id: DeviceId,
    /// Human-readable name
    pub name: String,
    /// Device category
    pub category: DeviceCategory,
}

#[derive(Clone)]
struct RegisteredDevice {
    name: String,
    handle: DeviceHandle,
}

/// The rig's default devices, as configured by the device loader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultDevices {
    /// Default XY stage
    pub xy_stage: Option<DeviceId>,
    /// Default focus (Z) stage
    pub focus: Option<DeviceId>,
    /// Default shutter
    pub shutter: Option<DeviceId>,
    /// Default camera
    pub camera: Option<DeviceId>,
}

// =============================================================================
// Device Inventory
// =============================================================================

/// Central registry of loaded physical devices.
///
/// Listing operations return devices in registration order. Clones share
/// the underlying device handles.
#[derive(Clone, Default)]
pub struct DeviceInventory {
    devices: HashMap<DeviceId, RegisteredDevice>,
    order: Vec<DeviceId>,
    defaults: DefaultDevices,
}

impl DeviceInventory {
    /// Create an empty inventory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device under `id`.
    ///
    /// # Errors
    /// Returns error if the id is already registered.
    pub fn register(&mut self, id: impl Into<DeviceId>, name: impl Into<String>, handle: DeviceHandle) -> Result<()> {
        let id = id.into();
        if self.devices.contains_key(&id) {
            return Err(anyhow!("Device '{}' is already registered", id));
        }
        tracing::debug!(device = %id, category = ?handle.category(), "Registered device");
        self.devices.insert(
            id.clone(),
            RegisteredDevice {
                name: name.into(),
                handle,
            },
        );
        self.order.push(id);
        Ok(())
    }

    /// Remove a device. Defaults naming it are cleared.
    ///
    /// # Returns
    /// true if device was found and removed, false if not found
    pub fn unregister(&mut self, id: &str) -> bool {
        if self.devices.remove(id).is_none() {
            return false;
        }
        self.order.retain(|existing| existing != id);
        for slot in [
            &mut self.defaults.xy_stage,
            &mut self.defaults.focus,
            &mut self.defaults.shutter,
            &mut self.defaults.camera,
        ] {
            if slot.as_deref() == Some(id) {
                *slot = None;
            }
        }
        true
    }

    /// Check if a device is registered
    pub fn contains(&self, id: &str) -> bool {
        self.devices.contains_key(id)
    }

    /// Number of registered devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Check if the inventory is empty
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Category of a registered device
    pub fn category(&self, id: &str) -> Option<DeviceCategory> {
        self.devices.get(id).map(|d| d.handle.category())
    }

    /// Whether `id` is loaded and belongs to `category`
    pub fn is_loaded_as(&self, id: &str, category: DeviceCategory) -> bool {
        self.category(id) == Some(category)
    }

    /// Ids of all loaded devices of `category`, in registration order
    pub fn loaded_devices(&self, category: DeviceCategory) -> Vec<DeviceId> {
        self.order
            .iter()
            .filter(|id| self.is_loaded_as(id, category))
            .cloned()
            .collect()
    }

    /// List all registered devices
    pub fn list_devices(&self) -> Vec<DeviceInfo> {
        self.order
            .iter()
            .filter_map(|id| self.device_info(id))
            .collect()
    }

    /// Get device info by ID
    pub fn device_info(&self, id: &str) -> Option<DeviceInfo> {
        self.devices.get(id).map(|d| DeviceInfo {
            id: id.to_string(),
            name: d.name.clone(),
            category: d.handle.category(),
        })
    }

    // =========================================================================
    // Capability Access
    // =========================================================================

    /// Raw handle of a device
    pub fn handle(&self, id: &str) -> Option<&DeviceHandle> {
        self.devices.get(id).map(|d| &d.handle)
    }

    /// Get a device as Movable (if it is a single-axis stage)
    pub fn get_movable(&self, id: &str) -> Option<Arc<dyn Movable>> {
        match self.handle(id)? {
            DeviceHandle::Stage(stage) => Some(stage.clone()),
            _ => None,
        }
    }

    /// Get a device as XyStage
    pub fn get_xy_stage(&self, id: &str) -> Option<Arc<dyn XyStage>> {
        match self.handle(id)? {
            DeviceHandle::XyStage(stage) => Some(stage.clone()),
            _ => None,
        }
    }

    /// Get a device as ShutterControl
    pub fn get_shutter_control(&self, id: &str) -> Option<Arc<dyn ShutterControl>> {
        match self.handle(id)? {
            DeviceHandle::Shutter(shutter) => Some(shutter.clone()),
            _ => None,
        }
    }

    /// Get a device as FrameSource
    pub fn get_frame_source(&self, id: &str) -> Option<Arc<dyn FrameSource>> {
        match self.handle(id)? {
            DeviceHandle::Camera(camera) => Some(camera.clone()),
            _ => None,
        }
    }

    /// Get a device as SignalIo
    pub fn get_signal_io(&self, id: &str) -> Option<Arc<dyn SignalIo>> {
        match self.handle(id)? {
            DeviceHandle::SignalIo(io) => Some(io.clone()),
            _ => None,
        }
    }

    // =========================================================================
    // Default Devices
    // =========================================================================

    /// Current default devices
    pub fn defaults(&self) -> &DefaultDevices {
        &self.defaults
    }

    /// Default XY stage
    pub fn default_xy_stage(&self) -> Option<&str> {
        self.defaults.xy_stage.as_deref()
    }

    /// Default focus stage
    pub fn default_focus(&self) -> Option<&str> {
        self.defaults.focus.as_deref()
    }

    /// Default shutter
    pub fn default_shutter(&self) -> Option<&str> {
        self.defaults.shutter.as_deref()
    }

    /// Default camera
    pub fn default_camera(&self) -> Option<&str> {
        self.defaults.camera.as_deref()
    }

    /// Mark a loaded XY stage as the default
    pub fn set_default_xy_stage(&mut self, id: &str) -> Result<()> {
        self.check_category(id, DeviceCategory::XyStage)?;
        self.defaults.xy_stage = Some(id.to_string());
        Ok(())
    }

    /// Mark a loaded stage as the default focus device
    pub fn set_default_focus(&mut self, id: &str) -> Result<()> {
        self.check_category(id, DeviceCategory::Stage)?;
        self.defaults.focus = Some(id.to_string());
        Ok(())
    }

    /// Mark a loaded shutter as the default
    pub fn set_default_shutter(&mut self, id: &str) -> Result<()> {
        self.check_category(id, DeviceCategory::Shutter)?;
        self.defaults.shutter = Some(id.to_string());
        Ok(())
    }

    /// Mark a loaded camera as the default
    pub fn set_default_camera(&mut self, id: &str) -> Result<()> {
        self.check_category(id, DeviceCategory::Camera)?;
        self.defaults.camera = Some(id.to_string());
        Ok(())
    }

    fn check_category(&self, id: &str, expected: DeviceCategory) -> Result<()> {
        match self.category(id) {
            Some(category) if category == expected => Ok(()),
            Some(category) => Err(anyhow!(
                "Device '{}' is a {}, expected a {}",
                id,
                category.label(),
                expected.label()
            )),
            None => Err(anyhow!("Device '{}' is not loaded", id)),
        }
    }
}

impl fmt::Debug for DeviceInventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceInventory")
            .field("devices", &self.list_devices())
            .field("defaults", &self.defaults)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::mock::{MockCamera, MockShutter, MockStage, MockXyStage};

    fn inventory() -> DeviceInventory {
        let mut inventory = DeviceInventory::new();
        inventory
            .register("XY", "XY stage", DeviceHandle::XyStage(Arc::new(MockXyStage::new())))
            .unwrap();
        inventory
            .register("Z", "Focus", DeviceHandle::Stage(Arc::new(MockStage::new())))
            .unwrap();
        inventory
            .register("T", "Twister", DeviceHandle::Stage(Arc::new(MockStage::new())))
            .unwrap();
        inventory
            .register("Laser", "Laser", DeviceHandle::Shutter(Arc::new(MockShutter::new())))
            .unwrap();
        inventory
            .register("Cam", "Camera", DeviceHandle::Camera(Arc::new(MockCamera::new(64, 64))))
            .unwrap();
        inventory
    }

    #[test]
    fn lists_by_category_in_registration_order() {
        let inventory = inventory();
        assert_eq!(inventory.loaded_devices(DeviceCategory::Stage), vec!["Z", "T"]);
        assert_eq!(inventory.loaded_devices(DeviceCategory::XyStage), vec!["XY"]);
        assert!(inventory.loaded_devices(DeviceCategory::SignalIo).is_empty());
        assert_eq!(inventory.list_devices().len(), 5);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut inventory = inventory();
        let err = inventory
            .register("Z", "again", DeviceHandle::Stage(Arc::new(MockStage::new())))
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn capability_access_checks_category() {
        let inventory = inventory();
        assert!(inventory.get_movable("Z").is_some());
        assert!(inventory.get_movable("XY").is_none());
        assert!(inventory.get_xy_stage("XY").is_some());
        assert!(inventory.get_frame_source("Cam").is_some());
        assert!(inventory.get_shutter_control("missing").is_none());
    }

    #[test]
    fn defaults_must_match_category() {
        let mut inventory = inventory();
        inventory.set_default_focus("Z").unwrap();
        assert!(inventory.set_default_focus("Cam").is_err());
        assert!(inventory.set_default_camera("nope").is_err());
        assert_eq!(inventory.default_focus(), Some("Z"));

        assert!(inventory.unregister("Z"));
        assert_eq!(inventory.default_focus(), None);
        assert!(!inventory.unregister("Z"));
    }
}
