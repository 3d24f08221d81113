//! Persisted setup configurations.
//!
//! Setups are stored as one TOML table per setup index:
//!
//! ```toml
//! [setups.0]
//! name = "Left arm"
//! from_core = false
//! stage_xy = "XYStage"
//! stage_z = "ZStage"
//! stage_theta = "Twister"
//! laser1 = "Laser"
//! camera1 = "Camera"
//! ```
//!
//! Only connected roles are written. A setup marked `from_core = true` is
//! re-derived from the inventory's defaults on load instead of read back.

use super::loader::ConfigLoadError;
use crate::inventory::DeviceInventory;
use crate::setup::SetupConfiguration;
use anyhow::{Context, Result};
use figment::{
    providers::{Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use spim_core::axis::{AxisMap, LogicalAxis};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One persisted setup.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupRecord {
    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Re-derive the mapping from inventory defaults on load
    pub from_core: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// X stage
    pub stage_x: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Y stage
    pub stage_y: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// XY stage
    pub stage_xy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Z (focus) stage
    pub stage_z: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Rotation stage
    pub stage_theta: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// First illumination shutter
    pub laser1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Second illumination shutter
    pub laser2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// First camera
    pub camera1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Second camera
    pub camera2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Signal I/O synchronizer
    pub synchronizer: Option<String>,
}

impl SetupRecord {
    fn slot(&self, axis: LogicalAxis) -> &Option<String> {
        match axis {
            LogicalAxis::X => &self.stage_x,
            LogicalAxis::Y => &self.stage_y,
            LogicalAxis::Xy => &self.stage_xy,
            LogicalAxis::Z => &self.stage_z,
            LogicalAxis::Theta => &self.stage_theta,
            LogicalAxis::Laser1 => &self.laser1,
            LogicalAxis::Laser2 => &self.laser2,
            LogicalAxis::Camera1 => &self.camera1,
            LogicalAxis::Camera2 => &self.camera2,
            LogicalAxis::Synchronizer => &self.synchronizer,
        }
    }

    fn slot_mut(&mut self, axis: LogicalAxis) -> &mut Option<String> {
        match axis {
            LogicalAxis::X => &mut self.stage_x,
            LogicalAxis::Y => &mut self.stage_y,
            LogicalAxis::Xy => &mut self.stage_xy,
            LogicalAxis::Z => &mut self.stage_z,
            LogicalAxis::Theta => &mut self.stage_theta,
            LogicalAxis::Laser1 => &mut self.laser1,
            LogicalAxis::Laser2 => &mut self.laser2,
            LogicalAxis::Camera1 => &mut self.camera1,
            LogicalAxis::Camera2 => &mut self.camera2,
            LogicalAxis::Synchronizer => &mut self.synchronizer,
        }
    }

    /// Record of `setup`'s connected roles.
    pub fn from_setup(setup: &SetupConfiguration, inventory: &DeviceInventory) -> Self {
        let mut record = Self {
            name: Some(setup.name().to_string()),
            from_core: false,
            ..Self::default()
        };
        for (axis, id) in setup.connected_devices(inventory).iter() {
            *record.slot_mut(axis) = Some(id.clone());
        }
        record
    }

    /// Device assigned to `axis` in this record.
    pub fn device(&self, axis: LogicalAxis) -> Option<&str> {
        self.slot(axis).as_deref().filter(|id| !id.is_empty())
    }

    /// Rebuild the setup, re-deriving defaults when `from_core` is set.
    pub fn into_setup(self, default_name: &str, inventory: &DeviceInventory) -> SetupConfiguration {
        let name = self.name.clone().unwrap_or_else(|| default_name.to_string());
        if self.from_core {
            return SetupConfiguration::from_inventory(name, inventory);
        }
        let devices: AxisMap<String> = LogicalAxis::ALL
            .iter()
            .filter_map(|&axis| self.device(axis).map(|id| (axis, id.to_string())))
            .collect();
        SetupConfiguration::with_devices(name, devices)
    }
}

/// Whole persisted document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupDocument {
    /// Setups keyed by their decimal index
    pub setups: BTreeMap<String, SetupRecord>,
}

/// TOML file of saved setups.
#[derive(Debug, Clone)]
pub struct SetupStore {
    path: PathBuf,
}

impl SetupStore {
    /// Store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the raw document. A missing file is an empty document.
    pub fn read_document(&self) -> Result<SetupDocument> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "No setup store yet");
            return Ok(SetupDocument::default());
        }
        Figment::from(Toml::file(&self.path))
            .extract()
            .map_err(|err| ConfigLoadError::ParseError(err.to_string()))
            .with_context(|| format!("Failed to read setups from {}", self.path.display()))
    }

    /// Load all setups in index order.
    ///
    /// Returns an empty list when nothing is stored; the caller then keeps
    /// its current setups. Entries whose key is not an index are skipped.
    pub fn load(&self, inventory: &DeviceInventory) -> Result<Vec<SetupConfiguration>> {
        let document = self.read_document()?;
        let mut indexed: Vec<(usize, SetupRecord)> = Vec::with_capacity(document.setups.len());
        for (key, record) in document.setups {
            match key.trim().parse::<usize>() {
                Ok(index) => indexed.push((index, record)),
                Err(_) => tracing::warn!(key = %key, "Skipping setup with non-numeric key"),
            }
        }
        indexed.sort_by_key(|(index, _)| *index);

        let setups: Vec<SetupConfiguration> = indexed
            .into_iter()
            .map(|(index, record)| record.into_setup(&format!("Setup {index}"), inventory))
            .collect();
        tracing::info!(
            path = %self.path.display(),
            count = setups.len(),
            "Loaded setups"
        );
        Ok(setups)
    }

    /// Replace the stored setups with `setups`.
    pub fn save(&self, setups: &[SetupConfiguration], inventory: &DeviceInventory) -> Result<()> {
        let document = SetupDocument {
            setups: setups
                .iter()
                .enumerate()
                .map(|(index, setup)| (index.to_string(), SetupRecord::from_setup(setup, inventory)))
                .collect(),
        };
        let content = toml::to_string_pretty(&document).context("Failed to serialize setups")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write setups to {}", self.path.display()))?;

        tracing::info!(path = %self.path.display(), count = setups.len(), "Saved setups");
        Ok(())
    }
}
