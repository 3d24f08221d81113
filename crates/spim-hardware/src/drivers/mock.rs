//! Mock hardware for tests and the simulated rig.
//!
//! - [`MockStage`]: single-axis stage with speed-limited motion, optional limits
//!   and failure injection
//! - [`MockXyStage`]: XY stage built from two [`MockStage`] axes whose handles
//!   double as the `<xy>.X` / `<xy>.Y` companion devices
//! - [`MockShutter`], [`MockSignalIo`]: trivial state holders
//! - [`MockCamera`]: renders a Gaussian bead from a shared [`BeadScene`]
//! - [`simulated_rig`]: a complete inventory with the standard device ids
//!
//! Motion is simulated against `tokio::time`, so tests running with paused
//! time converge deterministically.

use crate::inventory::{DeviceHandle, DeviceInventory};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use nalgebra::{Point3, Rotation3, Unit, Vector3};
use parking_lot::Mutex;
use spim_core::capabilities::{FrameSource, Movable, ShutterControl, SignalIo, XyStage};
use spim_core::data::{Frame, Roi};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration, Instant};

// =============================================================================
// Failure Injection
// =============================================================================

#[derive(Debug, Default)]
struct FaultState {
    /// Remaining successful calls per operation before it starts failing
    budgets: HashMap<&'static str, u32>,
    /// Calls seen per operation
    counts: HashMap<&'static str, u32>,
    /// Every operation fails while set
    communication_lost: bool,
}

/// Shared failure injection for mock devices.
///
/// Operation names used by the mocks: `"move"`, `"position"`, `"wait"`,
/// `"snap"`, `"roi"`, `"shutter"`, `"signal"`.
#[derive(Debug, Clone, Default)]
pub struct MockFaults {
    state: Arc<Mutex<FaultState>>,
}

impl MockFaults {
    /// No failures.
    pub fn none() -> Self {
        Self::default()
    }

    /// Let `operation` succeed `successes` more times, then fail.
    pub fn fail_after(&self, operation: &'static str, successes: u32) {
        let mut state = self.state.lock();
        state.budgets.insert(operation, successes);
        state.counts.insert(operation, 0);
    }

    /// Make `operation` fail from now on.
    pub fn fail_always(&self, operation: &'static str) {
        self.fail_after(operation, 0);
    }

    /// Make every operation fail until [`MockFaults::clear`].
    pub fn lose_communication(&self) {
        self.state.lock().communication_lost = true;
    }

    /// Remove all injected failures.
    pub fn clear(&self) {
        *self.state.lock() = FaultState::default();
    }

    /// Fail if an injected fault applies to `operation`.
    pub fn check(&self, device: &str, operation: &'static str) -> Result<()> {
        let mut state = self.state.lock();
        if state.communication_lost {
            return Err(anyhow!("{}: communication lost during {}", device, operation));
        }
        let Some(&budget) = state.budgets.get(operation) else {
            return Ok(());
        };
        let count = state.counts.entry(operation).or_insert(0);
        if *count >= budget {
            return Err(anyhow!("{}: injected {} failure", device, operation));
        }
        *count += 1;
        Ok(())
    }
}

// =============================================================================
// MockStage
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Motion {
    origin: f64,
    target: f64,
    started: Instant,
}

impl Motion {
    fn at_rest(position: f64) -> Self {
        Self {
            origin: position,
            target: position,
            started: Instant::now(),
        }
    }

    fn position(&self, speed: Option<f64>) -> f64 {
        let Some(speed) = speed else {
            return self.target;
        };
        let distance = self.target - self.origin;
        let travelled = speed * self.started.elapsed().as_secs_f64();
        if travelled >= distance.abs() {
            self.target
        } else {
            self.origin + distance.signum() * travelled
        }
    }

    fn remaining(&self, speed: Option<f64>) -> Duration {
        match speed {
            Some(speed) => {
                Duration::from_secs_f64((self.target - self.position(Some(speed))).abs() / speed)
            }
            None => Duration::ZERO,
        }
    }
}

/// Mock single-axis stage.
///
/// Clones share position state, so a clone handed to a [`BeadScene`] always
/// sees the same motion as the registered device.
///
/// # Example
///
/// ```rust,ignore
/// let stage = MockStage::new().with_speed(100.0).with_limits(-500.0, 500.0);
/// stage.move_abs(10.0).await?;
/// stage.wait_settled().await?;
/// assert_eq!(stage.position().await?, 10.0);
/// ```
#[derive(Debug, Clone)]
pub struct MockStage {
    name: String,
    motion: Arc<Mutex<Motion>>,
    /// Units per second; `None` moves instantly
    speed: Option<f64>,
    limits: Option<(f64, f64)>,
    faults: MockFaults,
    moves: Arc<AtomicU64>,
}

impl MockStage {
    /// Instant stage at position 0.
    pub fn new() -> Self {
        Self {
            name: "mock_stage".to_string(),
            motion: Arc::new(Mutex::new(Motion::at_rest(0.0))),
            speed: None,
            limits: None,
            faults: MockFaults::none(),
            moves: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Name used in error messages.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Start at `position`.
    pub fn with_position(self, position: f64) -> Self {
        *self.motion.lock() = Motion::at_rest(position);
        self
    }

    /// Move at `units_per_sec` instead of instantly.
    pub fn with_speed(mut self, units_per_sec: f64) -> Self {
        self.speed = (units_per_sec > 0.0).then_some(units_per_sec);
        self
    }

    /// Reject targets outside `[min, max]`.
    pub fn with_limits(mut self, min: f64, max: f64) -> Self {
        self.limits = Some((min, max));
        self
    }

    /// Share `faults` with other mocks.
    pub fn with_faults(mut self, faults: MockFaults) -> Self {
        self.faults = faults;
        self
    }

    /// Failure injection handle.
    pub fn faults(&self) -> &MockFaults {
        &self.faults
    }

    /// Position right now, without failure injection.
    pub fn current_position(&self) -> f64 {
        self.motion.lock().position(self.speed)
    }

    /// Target of the last move.
    pub fn target(&self) -> f64 {
        self.motion.lock().target
    }

    /// Number of accepted `move_abs` calls.
    pub fn move_count(&self) -> u64 {
        self.moves.load(Ordering::SeqCst)
    }

    /// Whether the stage is still travelling.
    pub fn is_moving(&self) -> bool {
        let motion = self.motion.lock();
        motion.position(self.speed) != motion.target
    }
}

impl Default for MockStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Movable for MockStage {
    async fn move_abs(&self, target: f64) -> Result<()> {
        self.faults.check(&self.name, "move")?;
        if let Some((min, max)) = self.limits {
            if target < min || target > max {
                return Err(anyhow!(
                    "{}: position {:.3} exceeds limits [{:.3}, {:.3}]",
                    self.name,
                    target,
                    min,
                    max
                ));
            }
        }

        let mut motion = self.motion.lock();
        let origin = motion.position(self.speed);
        *motion = Motion {
            origin,
            target,
            started: Instant::now(),
        };
        self.moves.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(stage = %self.name, from = origin, to = target, "MockStage: moving");
        Ok(())
    }

    async fn position(&self) -> Result<f64> {
        self.faults.check(&self.name, "position")?;
        Ok(self.current_position())
    }

    async fn wait_settled(&self) -> Result<()> {
        self.faults.check(&self.name, "wait")?;
        let remaining = self.motion.lock().remaining(self.speed);
        if !remaining.is_zero() {
            sleep(remaining).await;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let mut motion = self.motion.lock();
        *motion = Motion::at_rest(motion.position(self.speed));
        tracing::debug!(stage = %self.name, "MockStage: stopped");
        Ok(())
    }
}

// =============================================================================
// MockXyStage
// =============================================================================

/// Mock XY stage composed of two [`MockStage`] axes.
#[derive(Debug, Clone)]
pub struct MockXyStage {
    x: MockStage,
    y: MockStage,
    faults: MockFaults,
    moves: Arc<AtomicU64>,
}

impl MockXyStage {
    /// Instant XY stage at the origin.
    pub fn new() -> Self {
        Self {
            x: MockStage::new().named("mock_xy.X"),
            y: MockStage::new().named("mock_xy.Y"),
            faults: MockFaults::none(),
            moves: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Move both axes at `units_per_sec`.
    pub fn with_speed(mut self, units_per_sec: f64) -> Self {
        self.x = self.x.with_speed(units_per_sec);
        self.y = self.y.with_speed(units_per_sec);
        self
    }

    /// Start at `(x, y)`.
    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.x = self.x.with_position(x);
        self.y = self.y.with_position(y);
        self
    }

    /// X axis; usable as the `<xy>.X` companion device.
    pub fn x_axis(&self) -> MockStage {
        self.x.clone()
    }

    /// Y axis; usable as the `<xy>.Y` companion device.
    pub fn y_axis(&self) -> MockStage {
        self.y.clone()
    }

    /// Failure injection for combined XY calls.
    pub fn faults(&self) -> &MockFaults {
        &self.faults
    }

    /// Number of combined `move_xy` calls.
    pub fn move_count(&self) -> u64 {
        self.moves.load(Ordering::SeqCst)
    }
}

impl Default for MockXyStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl XyStage for MockXyStage {
    async fn move_xy(&self, x: f64, y: f64) -> Result<()> {
        self.faults.check("mock_xy", "move")?;
        self.moves.fetch_add(1, Ordering::SeqCst);
        self.x.move_abs(x).await?;
        self.y.move_abs(y).await
    }

    async fn position_xy(&self) -> Result<(f64, f64)> {
        self.faults.check("mock_xy", "position")?;
        Ok((self.x.current_position(), self.y.current_position()))
    }

    async fn wait_settled(&self) -> Result<()> {
        self.faults.check("mock_xy", "wait")?;
        self.x.wait_settled().await?;
        self.y.wait_settled().await
    }
}

// =============================================================================
// MockShutter / MockSignalIo
// =============================================================================

/// Mock shutter.
#[derive(Debug, Default)]
pub struct MockShutter {
    open: AtomicBool,
    faults: MockFaults,
}

impl MockShutter {
    /// Closed shutter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Failure injection handle.
    pub fn faults(&self) -> &MockFaults {
        &self.faults
    }
}

#[async_trait]
impl ShutterControl for MockShutter {
    async fn open_shutter(&self) -> Result<()> {
        self.faults.check("mock_shutter", "shutter")?;
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close_shutter(&self) -> Result<()> {
        self.faults.check("mock_shutter", "shutter")?;
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_shutter_open(&self) -> Result<bool> {
        self.faults.check("mock_shutter", "shutter")?;
        Ok(self.open.load(Ordering::SeqCst))
    }
}

/// Mock analog/digital signal line.
#[derive(Debug, Default)]
pub struct MockSignalIo {
    level: Mutex<f64>,
    faults: MockFaults,
}

impl MockSignalIo {
    /// Line at level 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Failure injection handle.
    pub fn faults(&self) -> &MockFaults {
        &self.faults
    }
}

#[async_trait]
impl SignalIo for MockSignalIo {
    async fn set_signal(&self, value: f64) -> Result<()> {
        self.faults.check("mock_signal", "signal")?;
        *self.level.lock() = value;
        Ok(())
    }

    async fn signal(&self) -> Result<f64> {
        self.faults.check("mock_signal", "signal")?;
        Ok(*self.level.lock())
    }
}

// =============================================================================
// Bead Scene
// =============================================================================

/// Ground truth of a simulated calibration sample.
///
/// Positions are in stage units (µm). A bead placed at `bead_at_zero` when
/// the rotation stage reads 0 orbits the line through `axis_origin` along
/// `axis_direction` by `degrees_per_step` per rotation unit.
#[derive(Debug, Clone, PartialEq)]
pub struct BeadGeometry {
    /// A point on the true rotation axis
    pub axis_origin: Point3<f64>,
    /// Direction of the true rotation axis
    pub axis_direction: Vector3<f64>,
    /// Bead position at rotation 0
    pub bead_at_zero: Point3<f64>,
    /// Rotation angle per rotation-stage unit
    pub degrees_per_step: f64,
    /// Stage micrometres per camera pixel
    pub um_per_pixel: f64,
    /// Lateral bead width (Gaussian sigma) in pixels
    pub sigma_px: f64,
    /// Axial falloff (Gaussian sigma) in stage units
    pub depth_of_field: f64,
    /// Peak intensity above background when in focus
    pub amplitude: f64,
    /// Background level
    pub background: f64,
}

impl Default for BeadGeometry {
    fn default() -> Self {
        Self {
            axis_origin: Point3::new(100.0, 0.0, 50.0),
            axis_direction: Vector3::y(),
            bead_at_zero: Point3::new(130.0, 20.0, 50.0),
            degrees_per_step: 10.0,
            um_per_pixel: spim_core::limits::UM_PER_PIXEL,
            sigma_px: 2.0,
            depth_of_field: 1.0,
            amplitude: 1000.0,
            background: 100.0,
        }
    }
}

impl BeadGeometry {
    /// Bead position when the rotation stage reads `theta`.
    pub fn bead_position(&self, theta: f64) -> Point3<f64> {
        let axis = Unit::new_normalize(self.axis_direction);
        let rotation = Rotation3::from_axis_angle(&axis, (theta * self.degrees_per_step).to_radians());
        self.axis_origin + rotation * (self.bead_at_zero - self.axis_origin)
    }
}

/// A bead imaged through stages the scene follows.
#[derive(Debug, Clone)]
pub struct BeadScene {
    geometry: BeadGeometry,
    stage_x: MockStage,
    stage_y: MockStage,
    stage_z: MockStage,
    rotation: MockStage,
}

impl BeadScene {
    /// Scene observing the given stage handles.
    pub fn new(
        geometry: BeadGeometry,
        stage_x: MockStage,
        stage_y: MockStage,
        stage_z: MockStage,
        rotation: MockStage,
    ) -> Self {
        Self {
            geometry,
            stage_x,
            stage_y,
            stage_z,
            rotation,
        }
    }

    /// Ground truth.
    pub fn geometry(&self) -> &BeadGeometry {
        &self.geometry
    }

    /// Where the bead is right now.
    pub fn bead_position(&self) -> Point3<f64> {
        self.geometry.bead_position(self.rotation.current_position())
    }

    /// Render a full-sensor frame for the current stage positions.
    pub fn render(&self, width: u32, height: u32) -> Frame {
        let g = &self.geometry;
        let bead = self.bead_position();
        let xc = f64::from(width) / 2.0 + (bead.x - self.stage_x.current_position()) / g.um_per_pixel;
        let yc = f64::from(height) / 2.0 + (bead.y - self.stage_y.current_position()) / g.um_per_pixel;
        let dz = bead.z - self.stage_z.current_position();
        let peak = g.amplitude * (-dz * dz / (2.0 * g.depth_of_field * g.depth_of_field)).exp();
        let two_sigma_sq = 2.0 * g.sigma_px * g.sigma_px;

        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for row in 0..height {
            let dy = f64::from(row) - yc;
            for col in 0..width {
                let dx = f64::from(col) - xc;
                pixels.push(g.background + peak * (-(dx * dx + dy * dy) / two_sigma_sq).exp());
            }
        }
        Frame::from_f64(width, height, pixels)
    }
}

// =============================================================================
// MockCamera
// =============================================================================

/// Mock camera.
///
/// Without a scene, frames are flat at the background level.
#[derive(Debug)]
pub struct MockCamera {
    width: u32,
    height: u32,
    roi: Mutex<Roi>,
    scene: Option<Arc<BeadScene>>,
    background: f64,
    frames: AtomicU64,
    faults: MockFaults,
}

impl MockCamera {
    /// Camera with a `width` × `height` sensor and full-frame ROI.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            roi: Mutex::new(Roi::full(width, height)),
            scene: None,
            background: 100.0,
            frames: AtomicU64::new(0),
            faults: MockFaults::none(),
        }
    }

    /// Render `scene` into every frame.
    pub fn with_scene(mut self, scene: Arc<BeadScene>) -> Self {
        self.background = scene.geometry().background;
        self.scene = Some(scene);
        self
    }

    /// Start with `roi` instead of the full frame.
    pub fn with_roi(self, roi: Roi) -> Self {
        *self.roi.lock() = roi;
        self
    }

    /// Frames snapped so far.
    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    /// Failure injection handle.
    pub fn faults(&self) -> &MockFaults {
        &self.faults
    }
}

#[async_trait]
impl FrameSource for MockCamera {
    async fn snap(&self) -> Result<Frame> {
        self.faults.check("mock_camera", "snap")?;
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(match &self.scene {
            Some(scene) => scene.render(self.width, self.height),
            None => Frame::from_f64(
                self.width,
                self.height,
                vec![self.background; self.width as usize * self.height as usize],
            ),
        })
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    async fn roi(&self) -> Result<Roi> {
        Ok(*self.roi.lock())
    }

    async fn set_roi(&self, roi: Roi) -> Result<()> {
        self.faults.check("mock_camera", "roi")?;
        if roi.width == 0 || roi.height == 0 {
            return Err(anyhow!("ROI must be non-empty"));
        }
        *self.roi.lock() = roi.clipped(self.width, self.height);
        Ok(())
    }
}

// =============================================================================
// Simulated Rig
// =============================================================================

/// Device ids used by [`simulated_rig`].
pub mod ids {
    /// Combined XY stage
    pub const XY_STAGE: &str = "XYStage";
    /// X companion of the XY stage
    pub const X_STAGE: &str = "XYStage.X";
    /// Y companion of the XY stage
    pub const Y_STAGE: &str = "XYStage.Y";
    /// Focus stage
    pub const Z_STAGE: &str = "ZStage";
    /// Rotation stage
    pub const TWISTER: &str = "Twister";
    /// Primary laser
    pub const LASER: &str = "Laser";
    /// Secondary laser
    pub const LASER2: &str = "Laser2";
    /// Camera
    pub const CAMERA: &str = "Camera";
    /// Synchronizer line
    pub const SYNC: &str = "Sync";
}

/// Simulated SPIM rig: inventory plus handles on the mock hardware.
pub struct SimulatedRig {
    /// Loaded devices with defaults set
    pub inventory: DeviceInventory,
    /// Scene rendered by the camera
    pub scene: Arc<BeadScene>,
    /// XY stage
    pub xy: MockXyStage,
    /// Focus stage
    pub z: MockStage,
    /// Rotation stage
    pub twister: MockStage,
    /// Camera
    pub camera: Arc<MockCamera>,
}

/// Build a rig whose stages start with the bead centred and in focus.
///
/// Sensor 256 × 256 with a 48 × 48 centred ROI.
pub fn simulated_rig(geometry: BeadGeometry) -> Result<SimulatedRig> {
    let start = geometry.bead_position(0.0);
    let xy = MockXyStage::new()
        .with_speed(2000.0)
        .with_position(start.x, start.y);
    let z = MockStage::new()
        .named(ids::Z_STAGE)
        .with_speed(1000.0)
        .with_position(start.z);
    let twister = MockStage::new().named(ids::TWISTER).with_speed(20.0);

    let scene = Arc::new(BeadScene::new(
        geometry,
        xy.x_axis(),
        xy.y_axis(),
        z.clone(),
        twister.clone(),
    ));
    let camera = Arc::new(
        MockCamera::new(256, 256)
            .with_scene(scene.clone())
            .with_roi(Roi::new(0, 0, 48, 48).centered_in(256, 256)),
    );

    let mut inventory = DeviceInventory::new();
    inventory.register(ids::XY_STAGE, "Mock XY stage", DeviceHandle::XyStage(Arc::new(xy.clone())))?;
    inventory.register(ids::X_STAGE, "Mock XY stage (X)", DeviceHandle::Stage(Arc::new(xy.x_axis())))?;
    inventory.register(ids::Y_STAGE, "Mock XY stage (Y)", DeviceHandle::Stage(Arc::new(xy.y_axis())))?;
    inventory.register(ids::Z_STAGE, "Mock focus drive", DeviceHandle::Stage(Arc::new(z.clone())))?;
    inventory.register(ids::TWISTER, "Mock rotation stage", DeviceHandle::Stage(Arc::new(twister.clone())))?;
    inventory.register(ids::LASER, "Mock laser", DeviceHandle::Shutter(Arc::new(MockShutter::new())))?;
    inventory.register(ids::LASER2, "Mock laser (2)", DeviceHandle::Shutter(Arc::new(MockShutter::new())))?;
    inventory.register(ids::CAMERA, "Mock camera", DeviceHandle::Camera(camera.clone()))?;
    inventory.register(ids::SYNC, "Mock synchronizer", DeviceHandle::SignalIo(Arc::new(MockSignalIo::new())))?;

    inventory.set_default_xy_stage(ids::XY_STAGE)?;
    inventory.set_default_focus(ids::Z_STAGE)?;
    inventory.set_default_shutter(ids::LASER)?;
    inventory.set_default_camera(ids::CAMERA)?;

    Ok(SimulatedRig {
        inventory,
        scene,
        xy,
        z,
        twister,
        camera,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn speed_limited_stage_takes_time() {
        let stage = MockStage::new().with_speed(10.0);
        stage.move_abs(5.0).await.unwrap();
        assert!(stage.is_moving());

        tokio::time::advance(Duration::from_millis(250)).await;
        let halfway = stage.position().await.unwrap();
        assert!((halfway - 2.5).abs() < 1e-6, "{halfway}");

        stage.wait_settled().await.unwrap();
        assert_eq!(stage.position().await.unwrap(), 5.0);
        assert!(!stage.is_moving());
    }

    #[tokio::test]
    async fn limits_reject_out_of_range_moves() {
        let stage = MockStage::new().with_limits(0.0, 10.0);
        assert!(stage.move_abs(11.0).await.is_err());
        assert_eq!(stage.move_count(), 0);
        stage.move_abs(10.0).await.unwrap();
        assert_eq!(stage.position().await.unwrap(), 10.0);
    }

    #[tokio::test]
    async fn fail_after_counts_successes() {
        let stage = MockStage::new();
        stage.faults().fail_after("position", 2);
        assert!(stage.position().await.is_ok());
        assert!(stage.position().await.is_ok());
        let err = stage.position().await.unwrap_err();
        assert!(err.to_string().contains("injected position failure"));
        stage.faults().clear();
        assert!(stage.position().await.is_ok());
    }

    #[tokio::test]
    async fn xy_companions_share_state() {
        let xy = MockXyStage::new();
        xy.move_xy(3.0, 4.0).await.unwrap();
        assert_eq!(xy.x_axis().position().await.unwrap(), 3.0);
        xy.y_axis().move_abs(-1.0).await.unwrap();
        assert_eq!(xy.position_xy().await.unwrap(), (3.0, -1.0));
        assert_eq!(xy.move_count(), 1);
    }

    #[test]
    fn bead_orbits_axis() {
        let geometry = BeadGeometry::default();
        let quarter = 90.0 / geometry.degrees_per_step;
        let p0 = geometry.bead_position(0.0);
        let p90 = geometry.bead_position(quarter);
        let radius0 = (p0 - geometry.axis_origin).xz().norm();
        let radius90 = (p90 - geometry.axis_origin).xz().norm();
        assert!((radius0 - radius90).abs() < 1e-9);
        assert!((p0.y - p90.y).abs() < 1e-9);
        assert!((p90.x - geometry.axis_origin.x).abs() < 1e-9);
    }

    #[tokio::test]
    async fn camera_renders_centred_bead() {
        let rig = simulated_rig(BeadGeometry::default()).unwrap();
        let frame = rig.camera.snap().await.unwrap();
        assert_eq!((frame.width, frame.height), (256, 256));
        let centre = frame.value(128, 128).unwrap();
        let corner = frame.value(0, 0).unwrap();
        assert!((centre - 1100.0).abs() < 1e-6);
        assert!((corner - 100.0).abs() < 1e-6);
        assert_eq!(rig.camera.roi().await.unwrap(), Roi::new(104, 104, 48, 48));
    }
}
