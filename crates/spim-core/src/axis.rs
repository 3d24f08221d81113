//! Logical axis roles and the fixed-size table keyed by them.
//!
//! A [`LogicalAxis`] is a *role* in the microscope (X stage, focus, rotation,
//! laser, camera) independent of which physical device fulfils it. Every role
//! maps to exactly one [`DeviceCategory`].
//!
//! [`AxisMap`] is a lookup table with one slot per role. It replaces
//! string-keyed maps so that adding a role forces every `match` over roles to
//! be revisited.

use crate::error::SpimError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// =============================================================================
// Device Category
// =============================================================================

/// Physical device category a logical role must be fulfilled by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCategory {
    /// Single-axis stage (translation or rotation).
    Stage,
    /// Combined two-axis XY stage.
    XyStage,
    /// Shutter / illumination switch.
    Shutter,
    /// Camera.
    Camera,
    /// Analog or digital signal I/O.
    SignalIo,
}

impl DeviceCategory {
    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stage => "Stage",
            Self::XyStage => "XY Stage",
            Self::Shutter => "Shutter",
            Self::Camera => "Camera",
            Self::SignalIo => "Signal I/O",
        }
    }
}

// =============================================================================
// Logical Axis
// =============================================================================

/// Role of a device in a SPIM setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogicalAxis {
    /// Dedicated X translation stage.
    #[serde(rename = "stage_x")]
    X,
    /// Dedicated Y translation stage.
    #[serde(rename = "stage_y")]
    Y,
    /// Combined XY translation stage.
    #[serde(rename = "stage_xy")]
    Xy,
    /// Focus / Z translation stage.
    #[serde(rename = "stage_z")]
    Z,
    /// Sample rotation stage.
    #[serde(rename = "stage_theta")]
    Theta,
    /// Primary illumination.
    #[serde(rename = "laser1")]
    Laser1,
    /// Secondary illumination.
    #[serde(rename = "laser2")]
    Laser2,
    /// Primary camera.
    #[serde(rename = "camera1")]
    Camera1,
    /// Secondary camera.
    #[serde(rename = "camera2")]
    Camera2,
    /// Hardware synchronizer.
    #[serde(rename = "synchronizer")]
    Synchronizer,
}

impl LogicalAxis {
    /// Number of roles.
    pub const COUNT: usize = 10;

    /// Every role, in declaration order.
    pub const ALL: [LogicalAxis; Self::COUNT] = [
        LogicalAxis::X,
        LogicalAxis::Y,
        LogicalAxis::Xy,
        LogicalAxis::Z,
        LogicalAxis::Theta,
        LogicalAxis::Laser1,
        LogicalAxis::Laser2,
        LogicalAxis::Camera1,
        LogicalAxis::Camera2,
        LogicalAxis::Synchronizer,
    ];

    /// Single-axis stage roles.
    pub const STAGES: [LogicalAxis; 4] = [
        LogicalAxis::X,
        LogicalAxis::Y,
        LogicalAxis::Z,
        LogicalAxis::Theta,
    ];

    /// Slot index in an [`AxisMap`].
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Device category that may fulfil this role.
    pub fn category(self) -> DeviceCategory {
        match self {
            LogicalAxis::X | LogicalAxis::Y | LogicalAxis::Z | LogicalAxis::Theta => {
                DeviceCategory::Stage
            }
            LogicalAxis::Xy => DeviceCategory::XyStage,
            LogicalAxis::Laser1 | LogicalAxis::Laser2 => DeviceCategory::Shutter,
            LogicalAxis::Camera1 | LogicalAxis::Camera2 => DeviceCategory::Camera,
            LogicalAxis::Synchronizer => DeviceCategory::SignalIo,
        }
    }

    /// Display label.
    pub fn label(self) -> &'static str {
        match self {
            LogicalAxis::X => "X Stage",
            LogicalAxis::Y => "Y Stage",
            LogicalAxis::Xy => "XY Stage",
            LogicalAxis::Z => "Z Stage",
            LogicalAxis::Theta => "Theta Stage",
            LogicalAxis::Laser1 => "Laser",
            LogicalAxis::Laser2 => "Laser (2)",
            LogicalAxis::Camera1 => "Camera",
            LogicalAxis::Camera2 => "Camera (2)",
            LogicalAxis::Synchronizer => "Synchronizer",
        }
    }

    /// Lowercase key used in persisted setup configurations.
    pub fn key(self) -> &'static str {
        match self {
            LogicalAxis::X => "stage_x",
            LogicalAxis::Y => "stage_y",
            LogicalAxis::Xy => "stage_xy",
            LogicalAxis::Z => "stage_z",
            LogicalAxis::Theta => "stage_theta",
            LogicalAxis::Laser1 => "laser1",
            LogicalAxis::Laser2 => "laser2",
            LogicalAxis::Camera1 => "camera1",
            LogicalAxis::Camera2 => "camera2",
            LogicalAxis::Synchronizer => "synchronizer",
        }
    }

    /// Inverse of [`LogicalAxis::key`].
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|axis| axis.key() == key)
    }

    /// True for the single-axis stage roles X, Y, Z and Theta.
    pub fn is_stage(self) -> bool {
        self.category() == DeviceCategory::Stage
    }

    /// True for roles that take part in a spatial translation (X, Y, Z).
    pub fn is_translation(self) -> bool {
        matches!(self, LogicalAxis::X | LogicalAxis::Y | LogicalAxis::Z)
    }
}

impl std::fmt::Display for LogicalAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for LogicalAxis {
    type Err = SpimError;

    /// Accepts persisted keys (`stage_x`) and short names (`x`, `xy`, `theta`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        if let Some(axis) = Self::from_key(&lowered) {
            return Ok(axis);
        }
        match lowered.as_str() {
            "x" => Ok(LogicalAxis::X),
            "y" => Ok(LogicalAxis::Y),
            "xy" => Ok(LogicalAxis::Xy),
            "z" => Ok(LogicalAxis::Z),
            "theta" | "t" => Ok(LogicalAxis::Theta),
            "laser" => Ok(LogicalAxis::Laser1),
            "camera" => Ok(LogicalAxis::Camera1),
            _ => Err(SpimError::parse(s, "unknown axis role")),
        }
    }
}

// =============================================================================
// AxisMap
// =============================================================================

/// Fixed-size table with one optional slot per [`LogicalAxis`].
///
/// Iteration always follows [`LogicalAxis::ALL`] order.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisMap<T> {
    slots: [Option<T>; LogicalAxis::COUNT],
}

impl<T> Default for AxisMap<T> {
    fn default() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }
}

impl<T> AxisMap<T> {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value stored for `axis`.
    pub fn get(&self, axis: LogicalAxis) -> Option<&T> {
        self.slots[axis.index()].as_ref()
    }

    /// Mutable value stored for `axis`.
    pub fn get_mut(&mut self, axis: LogicalAxis) -> Option<&mut T> {
        self.slots[axis.index()].as_mut()
    }

    /// Store `value` for `axis`, returning the previous value.
    pub fn insert(&mut self, axis: LogicalAxis, value: T) -> Option<T> {
        self.slots[axis.index()].replace(value)
    }

    /// Clear the slot for `axis`, returning its value.
    pub fn remove(&mut self, axis: LogicalAxis) -> Option<T> {
        self.slots[axis.index()].take()
    }

    /// Whether `axis` has a value.
    pub fn contains(&self, axis: LogicalAxis) -> bool {
        self.slots[axis.index()].is_some()
    }

    /// Occupied slots in role order.
    pub fn iter(&self) -> impl Iterator<Item = (LogicalAxis, &T)> + '_ {
        LogicalAxis::ALL
            .into_iter()
            .zip(self.slots.iter())
            .filter_map(|(axis, slot)| slot.as_ref().map(|value| (axis, value)))
    }

    /// Roles with a value, in role order.
    pub fn keys(&self) -> impl Iterator<Item = LogicalAxis> + '_ {
        self.iter().map(|(axis, _)| axis)
    }

    /// Values in role order.
    pub fn values(&self) -> impl Iterator<Item = &T> + '_ {
        self.slots.iter().flatten()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// True when no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

impl<T> FromIterator<(LogicalAxis, T)> for AxisMap<T> {
    fn from_iter<I: IntoIterator<Item = (LogicalAxis, T)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (axis, value) in iter {
            map.insert(axis, value);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_round_trip_for_every_role() {
        for axis in LogicalAxis::ALL {
            assert_eq!(LogicalAxis::from_key(axis.key()), Some(axis));
            assert_eq!(axis.key().parse::<LogicalAxis>().ok(), Some(axis));
        }
        assert_eq!(LogicalAxis::from_key("name"), None);
    }

    #[test]
    fn short_names_parse() {
        assert_eq!("XY".parse::<LogicalAxis>().ok(), Some(LogicalAxis::Xy));
        assert_eq!(" theta ".parse::<LogicalAxis>().ok(), Some(LogicalAxis::Theta));
        assert!("w".parse::<LogicalAxis>().is_err());
    }

    #[test]
    fn categories_match_roles() {
        assert!(LogicalAxis::STAGES.iter().all(|axis| axis.is_stage()));
        assert_eq!(LogicalAxis::Xy.category(), DeviceCategory::XyStage);
        assert!(!LogicalAxis::Xy.is_stage());
        assert_eq!(LogicalAxis::Laser2.category(), DeviceCategory::Shutter);
        assert_eq!(LogicalAxis::Synchronizer.category(), DeviceCategory::SignalIo);
        assert!(!LogicalAxis::Theta.is_translation());
    }

    #[test]
    fn axis_map_iterates_in_role_order() {
        let mut map = AxisMap::new();
        map.insert(LogicalAxis::Theta, 4);
        map.insert(LogicalAxis::X, 1);
        map.insert(LogicalAxis::Z, 3);

        let keys: Vec<_> = map.keys().collect();
        assert_eq!(keys, vec![LogicalAxis::X, LogicalAxis::Z, LogicalAxis::Theta]);
        assert_eq!(map.len(), 3);
        assert_eq!(map.remove(LogicalAxis::Z), Some(3));
        assert!(!map.contains(LogicalAxis::Z));
        assert_eq!(map.values().copied().collect::<Vec<_>>(), vec![1, 4]);
    }
}
