//! Logical-to-physical device mapping for one rig.
//!
//! A [`SetupConfiguration`] names the physical device that fulfils each
//! [`LogicalAxis`] role. A role is *connected* only when its device id is
//! loaded in the [`DeviceInventory`] with the category the role requires, so
//! a stale mapping (device unplugged, renamed or retyped) simply reads as
//! disconnected.

use crate::inventory::{DeviceId, DeviceInventory};
use spim_core::axis::{AxisMap, DeviceCategory, LogicalAxis};

/// Device mapping of one rig.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SetupConfiguration {
    name: String,
    auto_derived: bool,
    devices: AxisMap<DeviceId>,
}

impl SetupConfiguration {
    /// Empty mapping.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            auto_derived: false,
            devices: AxisMap::new(),
        }
    }

    /// Explicit mapping.
    pub fn with_devices(name: impl Into<String>, devices: AxisMap<DeviceId>) -> Self {
        Self {
            name: name.into(),
            auto_derived: false,
            devices,
        }
    }

    /// Mapping derived from the inventory's loaded and default devices.
    ///
    /// | Role | Default |
    /// |------|---------|
    /// | X / Y | `<xy>.X` / `<xy>.Y` companion stages, if loaded |
    /// | XY | default XY stage |
    /// | Z | default focus stage |
    /// | Theta | first stage that is neither focus nor an `.X`/`.Y` companion |
    /// | Laser1 / Laser2 | default shutter / first other shutter |
    /// | Camera1 / Camera2 | default camera / first other camera |
    /// | Synchronizer | first signal I/O device |
    pub fn from_inventory(name: impl Into<String>, inventory: &DeviceInventory) -> Self {
        let mut devices = AxisMap::new();
        for axis in LogicalAxis::ALL {
            if let Some(id) = default_device(axis, inventory) {
                devices.insert(axis, id);
            }
        }
        tracing::debug!(?devices, "Derived default setup");
        Self {
            name: name.into(),
            auto_derived: true,
            devices,
        }
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Whether the mapping came from [`SetupConfiguration::from_inventory`].
    pub fn is_auto_derived(&self) -> bool {
        self.auto_derived
    }

    /// Configured device for `axis`, connected or not.
    pub fn device(&self, axis: LogicalAxis) -> Option<&str> {
        self.devices.get(axis).map(String::as_str)
    }

    /// Assign or clear the device for `axis`. Marks the mapping explicit.
    pub fn set_device(&mut self, axis: LogicalAxis, id: Option<DeviceId>) {
        match id.filter(|id| !id.is_empty()) {
            Some(id) => {
                self.devices.insert(axis, id);
            }
            None => {
                self.devices.remove(axis);
            }
        }
        self.auto_derived = false;
    }

    /// Full mapping.
    pub fn devices(&self) -> &AxisMap<DeviceId> {
        &self.devices
    }

    /// Whether `axis` resolves to a loaded device of the right category.
    pub fn is_connected(&self, axis: LogicalAxis, inventory: &DeviceInventory) -> bool {
        self.device(axis)
            .is_some_and(|id| inventory.is_loaded_as(id, axis.category()))
    }

    /// Whether every role is connected.
    pub fn is_all_connected(&self, inventory: &DeviceInventory) -> bool {
        LogicalAxis::ALL
            .iter()
            .all(|&axis| self.is_connected(axis, inventory))
    }

    /// Connected roles and their devices.
    pub fn connected_devices(&self, inventory: &DeviceInventory) -> AxisMap<DeviceId> {
        self.devices
            .iter()
            .filter(|(axis, _)| self.is_connected(*axis, inventory))
            .map(|(axis, id)| (axis, id.clone()))
            .collect()
    }

    /// Number of spatial stage dimensions available.
    ///
    /// An XY stage counts 2 and supersedes dedicated X/Y stages; Z and Theta
    /// count 1 each.
    pub fn stage_dimension_count(&self, inventory: &DeviceInventory) -> usize {
        let connected = |axis| usize::from(self.is_connected(axis, inventory));
        let planar = if self.is_connected(LogicalAxis::Xy, inventory) {
            2
        } else {
            connected(LogicalAxis::X) + connected(LogicalAxis::Y)
        };
        planar + connected(LogicalAxis::Z) + connected(LogicalAxis::Theta)
    }

    /// At least one camera, one illumination device and two stage dimensions.
    pub fn is_minimal_microscope(&self, inventory: &DeviceInventory) -> bool {
        let any = |axes: [LogicalAxis; 2]| axes.iter().any(|&axis| self.is_connected(axis, inventory));
        any([LogicalAxis::Camera1, LogicalAxis::Camera2])
            && any([LogicalAxis::Laser1, LogicalAxis::Laser2])
            && self.stage_dimension_count(inventory) >= 2
    }

    /// A minimal microscope with four stage dimensions.
    pub fn is_basic_spim(&self, inventory: &DeviceInventory) -> bool {
        self.is_minimal_microscope(inventory) && self.stage_dimension_count(inventory) >= 4
    }
}

fn default_device(axis: LogicalAxis, inventory: &DeviceInventory) -> Option<DeviceId> {
    let companion = |suffix: &str| {
        let id = format!("{}{}", inventory.default_xy_stage()?, suffix);
        inventory
            .is_loaded_as(&id, DeviceCategory::Stage)
            .then_some(id)
    };
    let first_other = |category: DeviceCategory, default: Option<&str>| {
        inventory
            .loaded_devices(category)
            .into_iter()
            .find(|id| Some(id.as_str()) != default)
    };

    match axis {
        LogicalAxis::X => companion(".X"),
        LogicalAxis::Y => companion(".Y"),
        LogicalAxis::Xy => inventory.default_xy_stage().map(str::to_string),
        LogicalAxis::Z => inventory.default_focus().map(str::to_string),
        LogicalAxis::Theta => {
            let focus = inventory.default_focus();
            inventory
                .loaded_devices(DeviceCategory::Stage)
                .into_iter()
                .find(|id| Some(id.as_str()) != focus && !id.ends_with(".X") && !id.ends_with(".Y"))
        }
        LogicalAxis::Laser1 => inventory.default_shutter().map(str::to_string),
        LogicalAxis::Laser2 => first_other(DeviceCategory::Shutter, inventory.default_shutter()),
        LogicalAxis::Camera1 => inventory.default_camera().map(str::to_string),
        LogicalAxis::Camera2 => first_other(DeviceCategory::Camera, inventory.default_camera()),
        LogicalAxis::Synchronizer => inventory
            .loaded_devices(DeviceCategory::SignalIo)
            .into_iter()
            .next(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::mock::{ids, simulated_rig, BeadGeometry, MockStage, MockXyStage};
    use crate::inventory::DeviceHandle;
    use std::sync::Arc;

    #[tokio::test]
    async fn defaults_resolve_every_role_of_the_simulated_rig() {
        let rig = simulated_rig(BeadGeometry::default()).unwrap();
        let setup = SetupConfiguration::from_inventory("Default", &rig.inventory);

        assert!(setup.is_auto_derived());
        assert_eq!(setup.device(LogicalAxis::X), Some(ids::X_STAGE));
        assert_eq!(setup.device(LogicalAxis::Y), Some(ids::Y_STAGE));
        assert_eq!(setup.device(LogicalAxis::Xy), Some(ids::XY_STAGE));
        assert_eq!(setup.device(LogicalAxis::Z), Some(ids::Z_STAGE));
        assert_eq!(setup.device(LogicalAxis::Theta), Some(ids::TWISTER));
        assert_eq!(setup.device(LogicalAxis::Laser1), Some(ids::LASER));
        assert_eq!(setup.device(LogicalAxis::Laser2), Some(ids::LASER2));
        assert_eq!(setup.device(LogicalAxis::Camera1), Some(ids::CAMERA));
        assert_eq!(setup.device(LogicalAxis::Camera2), None);
        assert_eq!(setup.device(LogicalAxis::Synchronizer), Some(ids::SYNC));

        assert_eq!(setup.stage_dimension_count(&rig.inventory), 4);
        assert!(setup.is_basic_spim(&rig.inventory));
        assert!(!setup.is_all_connected(&rig.inventory));
    }

    #[test]
    fn xy_pair_is_never_double_counted() {
        let mut inventory = DeviceInventory::new();
        let xy = MockXyStage::new();
        inventory
            .register("XY", "xy", DeviceHandle::XyStage(Arc::new(xy.clone())))
            .unwrap();
        inventory
            .register("X", "x", DeviceHandle::Stage(Arc::new(xy.x_axis())))
            .unwrap();
        inventory
            .register("Y", "y", DeviceHandle::Stage(Arc::new(xy.y_axis())))
            .unwrap();

        let mut setup = SetupConfiguration::new("manual");
        setup.set_device(LogicalAxis::X, Some("X".into()));
        setup.set_device(LogicalAxis::Y, Some("Y".into()));
        assert_eq!(setup.stage_dimension_count(&inventory), 2);
        setup.set_device(LogicalAxis::Xy, Some("XY".into()));
        assert_eq!(setup.stage_dimension_count(&inventory), 2);
        setup.set_device(LogicalAxis::X, None);
        setup.set_device(LogicalAxis::Y, None);
        assert_eq!(setup.stage_dimension_count(&inventory), 2);
    }

    #[test]
    fn wrong_category_reads_as_disconnected() {
        let mut inventory = DeviceInventory::new();
        inventory
            .register("Z", "focus", DeviceHandle::Stage(Arc::new(MockStage::new())))
            .unwrap();

        let mut setup = SetupConfiguration::new("manual");
        setup.set_device(LogicalAxis::Camera1, Some("Z".into()));
        setup.set_device(LogicalAxis::Z, Some("Z".into()));
        setup.set_device(LogicalAxis::Theta, Some("gone".into()));

        assert!(!setup.is_connected(LogicalAxis::Camera1, &inventory));
        assert!(setup.is_connected(LogicalAxis::Z, &inventory));
        assert!(!setup.is_connected(LogicalAxis::Theta, &inventory));
        assert_eq!(setup.connected_devices(&inventory).len(), 1);
        assert!(!setup.is_minimal_microscope(&inventory));
    }

    #[test]
    fn theta_skips_focus_and_companions() {
        let mut inventory = DeviceInventory::new();
        for id in ["Focus", "Stage.X", "Stage.Y", "Rotator"] {
            inventory
                .register(id, id, DeviceHandle::Stage(Arc::new(MockStage::new())))
                .unwrap();
        }
        inventory.set_default_focus("Focus").unwrap();

        let setup = SetupConfiguration::from_inventory("auto", &inventory);
        assert_eq!(setup.device(LogicalAxis::Theta), Some("Rotator"));
        assert_eq!(setup.device(LogicalAxis::X), None);
        assert_eq!(setup.stage_dimension_count(&inventory), 2);
    }

    #[test]
    fn empty_id_clears_role() {
        let mut setup = SetupConfiguration::new("manual");
        setup.set_device(LogicalAxis::Z, Some("Z".into()));
        setup.set_device(LogicalAxis::Z, Some(String::new()));
        assert_eq!(setup.device(LogicalAxis::Z), None);
    }
}
