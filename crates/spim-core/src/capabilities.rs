//! Device Capabilities
//!
//! Fine-grained capability traits the physical devices of a SPIM rig
//! implement. The registry and the calibrator only ever talk to hardware
//! through these traits, so drivers and mocks are interchangeable:
//!
//! - A single-axis stage (X, Y, focus, rotation) implements [`Movable`]
//! - A combined XY stage implements [`XyStage`]
//! - A laser or illumination switch implements [`ShutterControl`]
//! - A camera implements [`FrameSource`]
//! - A synchronizer or DAQ line implements [`SignalIo`]
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors
//! - Focuses on ONE thing
//!
//! # Example
//!
//! ```rust,ignore
//! async fn focus_to<T: Movable + ?Sized>(stage: &T, z: f64) -> Result<f64> {
//!     stage.move_abs(z).await?;
//!     stage.wait_settled().await?;
//!     stage.position().await
//! }
//! ```

use crate::data::{Frame, Roi};
use anyhow::Result;
use async_trait::async_trait;

// =============================================================================
// Motion
// =============================================================================

/// Capability: Motion Control
///
/// Single-axis stages (translation in µm, rotation in device steps).
///
/// # Contract
/// - `move_abs` and `move_rel` initiate motion and may return before completion
/// - `wait_settled` blocks until motion completes
/// - `position` returns the current position (approximate while moving)
#[async_trait]
pub trait Movable: Send + Sync {
    /// Move to absolute position
    async fn move_abs(&self, position: f64) -> Result<()>;

    /// Move relative to the current position
    ///
    /// # Default Implementation
    /// Reads the position and issues an absolute move.
    async fn move_rel(&self, distance: f64) -> Result<()> {
        let current = self.position().await?;
        self.move_abs(current + distance).await
    }

    /// Get current position
    async fn position(&self) -> Result<f64>;

    /// Wait for motion to settle
    ///
    /// # Returns
    /// - Ok(()) when settled
    /// - Err on timeout or hardware error
    async fn wait_settled(&self) -> Result<()>;

    /// Stop motion immediately
    ///
    /// # Default Implementation
    /// Returns an error indicating stop is not supported.
    async fn stop(&self) -> Result<()> {
        anyhow::bail!("Stop not supported by this device")
    }
}

/// Capability: Two-Axis Motion
///
/// Combined XY stages that move both translation axes with one command.
#[async_trait]
pub trait XyStage: Send + Sync {
    /// Move both axes to absolute positions
    async fn move_xy(&self, x: f64, y: f64) -> Result<()>;

    /// Current `(x, y)` position
    async fn position_xy(&self) -> Result<(f64, f64)>;

    /// Current X position
    async fn x(&self) -> Result<f64> {
        Ok(self.position_xy().await?.0)
    }

    /// Current Y position
    async fn y(&self) -> Result<f64> {
        Ok(self.position_xy().await?.1)
    }

    /// Wait until both axes have stopped
    async fn wait_settled(&self) -> Result<()>;

    /// Stop motion immediately
    ///
    /// # Default Implementation
    /// Returns an error indicating stop is not supported.
    async fn stop(&self) -> Result<()> {
        anyhow::bail!("Stop not supported by this device")
    }
}

// =============================================================================
// Illumination
// =============================================================================

/// Capability: Shutter Control
///
/// Lasers and other switchable light sources.
///
/// # Safety
/// CAUTION: Always verify shutter state before assuming beam is blocked.
/// Use hardware interlocks for laser safety, never rely on software alone.
#[async_trait]
pub trait ShutterControl: Send + Sync {
    /// Open the shutter (allow beam to pass)
    async fn open_shutter(&self) -> Result<()>;

    /// Close the shutter (block beam)
    async fn close_shutter(&self) -> Result<()>;

    /// Query shutter state
    async fn is_shutter_open(&self) -> Result<bool>;
}

// =============================================================================
// Imaging
// =============================================================================

/// Capability: Single Frame Acquisition
///
/// Cameras that can snap one image on demand.
///
/// # Contract
/// - `snap` returns a full-sensor frame; callers crop to [`FrameSource::roi`]
/// - `set_roi` only records the region of interest, it never resizes frames
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Acquire one frame
    async fn snap(&self) -> Result<Frame>;

    /// Sensor `(width, height)` in pixels
    fn resolution(&self) -> (u32, u32);

    /// Current region of interest
    async fn roi(&self) -> Result<Roi>;

    /// Replace the region of interest
    async fn set_roi(&self, roi: Roi) -> Result<()>;
}

// =============================================================================
// Signals
// =============================================================================

/// Capability: Signal Input/Output
///
/// Analog or digital lines used for hardware synchronization.
#[async_trait]
pub trait SignalIo: Send + Sync {
    /// Drive the output level
    async fn set_signal(&self, value: f64) -> Result<()>;

    /// Read the current level
    async fn signal(&self) -> Result<f64>;
}
