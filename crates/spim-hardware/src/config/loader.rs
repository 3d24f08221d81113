//! Application configuration.
//!
//! Configuration is layered with Figment:
//! 1. Defaults from [`SpimConfig::default()`]
//! 2. An optional TOML file
//! 3. Environment variables prefixed with `SPIM_`, nested keys separated by
//!    double underscores
//!
//! # Environment Variables
//!
//! - `SPIM_MOTION__POLL_INTERVAL_MS=20` → `motion.poll_interval_ms`
//! - `SPIM_CALIBRATION__CENTROID_MODE=max_intensity` → `calibration.centroid_mode`
//! - `SPIM_SETUP__STORE_PATH=/var/lib/spim/setups.toml` → `setup.store_path`
//!
//! # Example
//!
//! ```toml
//! [motion]
//! poll_interval_ms = 50
//! tolerance = 0.001
//! move_timeout_ms = 30000
//! serialized_devices = ["Twister"]
//!
//! [calibration]
//! um_per_pixel = 0.43478260869565217
//! centroid_mode = "weighted_mean"
//! reference_direction = [0.0, 1.0, 0.0]
//! ```

use crate::synchronizer::SyncSettings;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use spim_core::limits;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Error types for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    /// File not found
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// File read error
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    /// Parse error (invalid TOML)
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Validation error
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

// =============================================================================
// Schema
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpimConfig {
    /// Motion synchronization
    pub motion: MotionSettings,
    /// Rotation-axis calibration
    pub calibration: CalibrationSettings,
    /// Persisted setups
    pub setup: SetupSettings,
}

/// Motion synchronization and device command ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionSettings {
    /// Interval between position samples while moving
    pub poll_interval_ms: u64,
    /// Maximum |position - goal| that counts as converged
    pub tolerance: f64,
    /// Maximum duration of a single move; 0 disables the timeout
    pub move_timeout_ms: u64,
    /// Devices whose commands must run strictly in order
    pub serialized_devices: Vec<String>,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: duration_ms(limits::POLL_INTERVAL),
            tolerance: limits::POSITION_TOLERANCE,
            move_timeout_ms: duration_ms(limits::MOVE_TIMEOUT),
            serialized_devices: Vec::new(),
        }
    }
}

impl MotionSettings {
    /// Synchronizer parameters for these settings.
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            tolerance: self.tolerance,
            move_timeout: (self.move_timeout_ms > 0)
                .then(|| Duration::from_millis(self.move_timeout_ms)),
        }
    }

    /// Whether commands to `device` go through a serialized worker.
    pub fn is_serialized(&self, device: &str) -> bool {
        self.serialized_devices.iter().any(|id| id == device)
    }
}

/// Which focal position a bead scan reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CentroidMode {
    /// Intensity-to-background weighted mean of the accepted slices
    #[default]
    WeightedMean,
    /// Slice with the highest intensity-to-background ratio
    MaxIntensity,
}

/// Bead scanning and axis fitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Sample-plane size of one camera pixel
    pub um_per_pixel: f64,
    /// Minimum intensity/background ratio for a slice to count
    pub min_intensity_ratio: f64,
    /// Focal half-range of the first search
    pub small_search_radius: f64,
    /// Focal half-range of the retry search
    pub large_search_radius: f64,
    /// Theta increment between calibration points
    pub rotation_step: f64,
    /// Settle delay after each focal step
    pub slice_settle_ms: u64,
    /// Settle delay after each rotation
    pub rotation_settle_ms: u64,
    /// Focal position policy
    pub centroid_mode: CentroidMode,
    /// Assumed rotation-axis direction
    pub reference_direction: [f64; 3],
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            um_per_pixel: limits::UM_PER_PIXEL,
            min_intensity_ratio: limits::MIN_INTENSITY_RATIO,
            small_search_radius: limits::SMALL_SEARCH_RADIUS,
            large_search_radius: limits::LARGE_SEARCH_RADIUS,
            rotation_step: limits::ROTATION_STEP,
            slice_settle_ms: duration_ms(limits::SLICE_SETTLE),
            rotation_settle_ms: duration_ms(limits::ROTATION_SETTLE),
            centroid_mode: CentroidMode::default(),
            reference_direction: [0.0, 1.0, 0.0],
        }
    }
}

impl CalibrationSettings {
    /// Settle delay after each focal step.
    pub fn slice_settle(&self) -> Duration {
        Duration::from_millis(self.slice_settle_ms)
    }

    /// Settle delay after each rotation.
    pub fn rotation_settle(&self) -> Duration {
        Duration::from_millis(self.rotation_settle_ms)
    }
}

/// Setup persistence.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupSettings {
    /// TOML file holding the saved setups; `None` keeps setups in memory
    pub store_path: Option<PathBuf>,
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// =============================================================================
// Loading
// =============================================================================

impl SpimConfig {
    /// Load defaults, then `path` (which must exist if given), then `SPIM_`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(SpimConfig::default()));

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigLoadError::NotFound(path.display().to_string()).into());
            }
            tracing::debug!("Loading config from: {}", path.display());
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("SPIM_").split("__"));

        let config: SpimConfig = figment
            .extract()
            .map_err(|err| ConfigLoadError::ParseError(err.to_string()))
            .context("Failed to extract configuration from Figment")?;
        config
            .validate()
            .context("Configuration validation failed")?;

        tracing::info!(
            poll_interval_ms = config.motion.poll_interval_ms,
            centroid_mode = ?config.calibration.centroid_mode,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse and validate a TOML document over the defaults.
    ///
    /// Useful for testing or embedded configurations; ignores the environment.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SpimConfig = Figment::from(Serialized::defaults(SpimConfig::default()))
            .merge(Toml::string(content))
            .extract()
            .map_err(|err| ConfigLoadError::ParseError(err.to_string()))
            .context("Failed to parse TOML content")?;
        config
            .validate()
            .context("Configuration validation failed")?;
        Ok(config)
    }

    /// Cross-field checks.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        let mut errors = Vec::new();

        let motion = &self.motion;
        if motion.poll_interval_ms == 0 {
            errors.push("motion.poll_interval_ms must be positive".to_string());
        }
        if !(motion.tolerance.is_finite() && motion.tolerance > 0.0) {
            errors.push(format!(
                "motion.tolerance must be positive, got {}",
                motion.tolerance
            ));
        }

        let calibration = &self.calibration;
        for (key, value) in [
            ("um_per_pixel", calibration.um_per_pixel),
            ("small_search_radius", calibration.small_search_radius),
            ("large_search_radius", calibration.large_search_radius),
        ] {
            if !(value.is_finite() && value > 0.0) {
                errors.push(format!("calibration.{key} must be positive, got {value}"));
            }
        }
        if calibration.large_search_radius < calibration.small_search_radius {
            errors.push(format!(
                "calibration.large_search_radius ({}) is smaller than small_search_radius ({})",
                calibration.large_search_radius, calibration.small_search_radius
            ));
        }
        if !(calibration.min_intensity_ratio.is_finite() && calibration.min_intensity_ratio >= 0.0)
        {
            errors.push(format!(
                "calibration.min_intensity_ratio must be non-negative, got {}",
                calibration.min_intensity_ratio
            ));
        }
        if !calibration.rotation_step.is_finite() || calibration.rotation_step == 0.0 {
            errors.push(format!(
                "calibration.rotation_step must be non-zero, got {}",
                calibration.rotation_step
            ));
        }
        let [x, y, z] = calibration.reference_direction;
        let norm = (x * x + y * y + z * z).sqrt();
        if !(norm.is_finite() && norm > f64::EPSILON) {
            errors.push("calibration.reference_direction must be a non-zero vector".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigLoadError::ValidationError(errors.join("\n")))
        }
    }
}
