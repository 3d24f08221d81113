//! Logical stage control over a resolved setup.
//!
//! The [`DeviceRegistry`] binds a [`SetupConfiguration`] to the loaded
//! devices and exposes the rig in logical terms: move X, read Theta, wait
//! for Z. Each connected stage axis gets its own [`MotionSynchronizer`].
//!
//! # XY fallback
//!
//! Rigs often load only a combined XY stage. When X or Y has no dedicated
//! device but XY is connected, that axis is driven through the XY device:
//! reads use its per-axis accessors and moves re-issue the combined XY move
//! with the other axis' remembered destination. A compound move that sets
//! both X and Y issues a single combined XY move.
//!
//! # Example
//!
//! ```rust,ignore
//! let setup = SetupConfiguration::from_inventory("Default", &inventory);
//! let registry = DeviceRegistry::connect(setup, Arc::new(inventory), MotionSettings::default()).await;
//!
//! registry.move_to(MoveRequest::xyz(Vector3::new(120.0, 20.0, 50.0)).with_theta(0.0)).await?;
//! let here = registry.stage_position().await?;
//! ```

use crate::config::MotionSettings;
use crate::inventory::{DeviceId, DeviceInventory};
use crate::setup::SetupConfiguration;
use crate::synchronizer::{Commander, MotionSynchronizer, Sampler};
use crate::worker::{DeviceWorker, SerializedStage, SerializedXyStage};
use futures::future::{join_all, BoxFuture};
use nalgebra::Vector3;
use parking_lot::Mutex;
use spim_core::axis::{AxisMap, LogicalAxis};
use spim_core::capabilities::{FrameSource, Movable, ShutterControl, SignalIo, XyStage};
use spim_core::error::{AppResult, HardwareError, SpimError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Move Requests
// =============================================================================

/// Target positions for a compound stage move; `None` leaves an axis alone.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MoveRequest {
    /// X target
    pub x: Option<f64>,
    /// Y target
    pub y: Option<f64>,
    /// Z target
    pub z: Option<f64>,
    /// Theta target
    pub theta: Option<f64>,
}

impl MoveRequest {
    /// Move X, Y and Z.
    pub fn xyz(position: Vector3<f64>) -> Self {
        Self {
            x: Some(position.x),
            y: Some(position.y),
            z: Some(position.z),
            theta: None,
        }
    }

    /// Move X and Y.
    pub fn xy(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    /// Also rotate to `theta`.
    pub fn with_theta(mut self, theta: f64) -> Self {
        self.theta = Some(theta);
        self
    }

    /// Target for a stage axis.
    pub fn get(&self, axis: LogicalAxis) -> Option<f64> {
        match axis {
            LogicalAxis::X => self.x,
            LogicalAxis::Y => self.y,
            LogicalAxis::Z => self.z,
            LogicalAxis::Theta => self.theta,
            _ => None,
        }
    }

    /// Axes this request moves.
    pub fn axes(&self) -> Vec<LogicalAxis> {
        LogicalAxis::STAGES
            .into_iter()
            .filter(|&axis| self.get(axis).is_some())
            .collect()
    }
}

// =============================================================================
// Channels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Direct,
    ViaXy,
}

struct StageChannel {
    route: Route,
    sync: MotionSynchronizer,
}

struct XyChannel {
    device: DeviceId,
    stage: Arc<dyn XyStage>,
}

type Destinations = Arc<Mutex<AxisMap<f64>>>;

// =============================================================================
// DeviceRegistry
// =============================================================================

/// Logical view of one rig's devices.
pub struct DeviceRegistry {
    setup: SetupConfiguration,
    inventory: Arc<DeviceInventory>,
    settings: MotionSettings,
    stages: AxisMap<StageChannel>,
    xy: Option<XyChannel>,
    destinations: Destinations,
    workers: Vec<Arc<DeviceWorker>>,
}

impl DeviceRegistry {
    /// Bind `setup` to the loaded devices.
    ///
    /// Destinations start at the current position of each connected stage
    /// axis (0 for disconnected axes or failed reads). Devices listed in
    /// `settings.serialized_devices` get a dedicated command worker.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn connect(
        setup: SetupConfiguration,
        inventory: Arc<DeviceInventory>,
        settings: MotionSettings,
    ) -> Self {
        let sync_settings = settings.sync_settings();
        let destinations: Destinations = Arc::new(Mutex::new(AxisMap::new()));
        let mut workers: HashMap<DeviceId, Arc<DeviceWorker>> = HashMap::new();
        let mut worker_for = |id: &str| {
            settings.is_serialized(id).then(|| {
                workers
                    .entry(id.to_string())
                    .or_insert_with(|| Arc::new(DeviceWorker::spawn(id)))
                    .clone()
            })
        };

        let xy = setup
            .device(LogicalAxis::Xy)
            .filter(|_| setup.is_connected(LogicalAxis::Xy, &inventory))
            .and_then(|id| {
                let stage = inventory.get_xy_stage(id)?;
                let stage: Arc<dyn XyStage> = match worker_for(id) {
                    Some(worker) => Arc::new(SerializedXyStage::new(stage, worker)),
                    None => stage,
                };
                Some(XyChannel {
                    device: id.to_string(),
                    stage,
                })
            });

        let mut stages = AxisMap::new();
        for axis in LogicalAxis::STAGES {
            let direct = setup
                .device(axis)
                .filter(|_| setup.is_connected(axis, &inventory))
                .and_then(|id| Some((id, inventory.get_movable(id)?)));

            let channel = match (direct, &xy) {
                (Some((id, stage)), _) => {
                    let stage: Arc<dyn Movable> = match worker_for(id) {
                        Some(worker) => Arc::new(SerializedStage::new(stage, worker)),
                        None => stage,
                    };
                    Some(StageChannel {
                        route: Route::Direct,
                        sync: MotionSynchronizer::for_stage(id, stage, sync_settings),
                    })
                }
                (None, Some(xy)) if matches!(axis, LogicalAxis::X | LogicalAxis::Y) => {
                    tracing::debug!(axis = %axis, device = %xy.device, "Driving axis through XY stage");
                    Some(StageChannel {
                        route: Route::ViaXy,
                        sync: xy_synchronizer(axis, xy, destinations.clone(), sync_settings),
                    })
                }
                (None, _) => None,
            };
            if let Some(channel) = channel {
                stages.insert(axis, channel);
            }
        }
        drop(worker_for);

        for axis in LogicalAxis::STAGES {
            let position = match stages.get(axis) {
                Some(channel) => channel.sync.sample().await.unwrap_or_else(|err| {
                    tracing::warn!(axis = %axis, error = %err, "Could not read initial position");
                    0.0
                }),
                None => 0.0,
            };
            destinations.lock().insert(axis, position);
        }

        tracing::info!(
            setup = %setup.name(),
            stages = stages.len(),
            xy = xy.as_ref().map(|xy| xy.device.as_str()),
            serialized = workers.len(),
            "Device registry connected"
        );

        Self {
            setup,
            inventory,
            settings,
            stages,
            xy,
            destinations,
            workers: workers.into_values().collect(),
        }
    }

    /// The setup this registry was built from.
    pub fn setup(&self) -> &SetupConfiguration {
        &self.setup
    }

    /// Loaded devices.
    pub fn inventory(&self) -> &Arc<DeviceInventory> {
        &self.inventory
    }

    /// Motion settings in effect.
    pub fn settings(&self) -> &MotionSettings {
        &self.settings
    }

    // =========================================================================
    // Connectivity
    // =========================================================================

    /// Whether `axis` resolves to a loaded device of the right category.
    pub fn is_connected(&self, axis: LogicalAxis) -> bool {
        self.setup.is_connected(axis, &self.inventory)
    }

    /// Whether every role is connected.
    pub fn is_all_connected(&self) -> bool {
        self.setup.is_all_connected(&self.inventory)
    }

    /// See [`SetupConfiguration::stage_dimension_count`].
    pub fn stage_dimension_count(&self) -> usize {
        self.setup.stage_dimension_count(&self.inventory)
    }

    /// See [`SetupConfiguration::is_minimal_microscope`].
    pub fn is_minimal_microscope(&self) -> bool {
        self.setup.is_minimal_microscope(&self.inventory)
    }

    /// See [`SetupConfiguration::is_basic_spim`].
    pub fn is_basic_spim(&self) -> bool {
        self.setup.is_basic_spim(&self.inventory)
    }

    /// Device id of `axis`, or `""` when disconnected.
    pub fn device_id(&self, axis: LogicalAxis) -> &str {
        match self.setup.device(axis) {
            Some(id) if self.is_connected(axis) => id,
            _ => "",
        }
    }

    /// Synchronizer driving a stage axis, if it can be moved at all.
    pub fn synchronizer(&self, axis: LogicalAxis) -> Option<&MotionSynchronizer> {
        self.stages.get(axis).map(|channel| &channel.sync)
    }

    /// Whether `axis` is driven through the combined XY stage.
    pub fn uses_xy_fallback(&self, axis: LogicalAxis) -> bool {
        self.stages
            .get(axis)
            .is_some_and(|channel| channel.route == Route::ViaXy)
    }

    /// Camera fulfilling `axis` (Camera1 or Camera2).
    pub fn camera(&self, axis: LogicalAxis) -> Option<Arc<dyn FrameSource>> {
        self.inventory.get_frame_source(self.connected_id(axis)?)
    }

    /// Shutter fulfilling `axis` (Laser1 or Laser2).
    pub fn shutter(&self, axis: LogicalAxis) -> Option<Arc<dyn ShutterControl>> {
        self.inventory.get_shutter_control(self.connected_id(axis)?)
    }

    /// Synchronizer signal line.
    pub fn signal_io(&self) -> Option<Arc<dyn SignalIo>> {
        self.inventory
            .get_signal_io(self.connected_id(LogicalAxis::Synchronizer)?)
    }

    fn connected_id(&self, axis: LogicalAxis) -> Option<&str> {
        Some(self.device_id(axis)).filter(|id| !id.is_empty())
    }

    // =========================================================================
    // Stage Control
    // =========================================================================

    fn channel(&self, axis: LogicalAxis, operation: &'static str) -> AppResult<&StageChannel> {
        if !axis.is_stage() {
            return Err(SpimError::InvalidAxis { axis, operation });
        }
        self.stages
            .get(axis)
            .ok_or(SpimError::DisconnectedDevice { axis, operation })
    }

    /// Command a stage axis. Returns once the move is issued.
    ///
    /// # Errors
    /// - `InvalidAxis` for non-stage axes
    /// - `DisconnectedDevice` when neither a dedicated nor an XY device exists
    /// - `Hardware` when the move command fails
    pub async fn set_position(&self, axis: LogicalAxis, value: f64) -> AppResult<()> {
        let channel = self.channel(axis, "set_position")?;
        self.destinations.lock().insert(axis, value);
        channel.sync.request(value).await
    }

    /// Current position of a stage axis.
    pub async fn position(&self, axis: LogicalAxis) -> AppResult<f64> {
        self.channel(axis, "position")?.sync.sample().await
    }

    /// Last commanded destination of a stage axis.
    pub fn destination(&self, axis: LogicalAxis) -> AppResult<f64> {
        if !axis.is_stage() {
            return Err(SpimError::InvalidAxis {
                axis,
                operation: "destination",
            });
        }
        Ok(self.destinations.lock().get(axis).copied().unwrap_or(0.0))
    }

    /// Issue every component of `request` without waiting for any.
    pub async fn set_positions(&self, request: &MoveRequest) -> AppResult<()> {
        let mut pending = request.axes();

        if let (Some(x), Some(y), Some(xy)) = (request.x, request.y, &self.xy) {
            if self.uses_xy_fallback(LogicalAxis::X) && self.uses_xy_fallback(LogicalAxis::Y) {
                self.combined_xy_move(xy, x, y).await?;
                pending.retain(|axis| !matches!(axis, LogicalAxis::X | LogicalAxis::Y));
            }
        }

        for axis in pending {
            if let Some(value) = request.get(axis) {
                self.set_position(axis, value).await?;
            }
        }
        Ok(())
    }

    async fn combined_xy_move(&self, xy: &XyChannel, x: f64, y: f64) -> AppResult<()> {
        let (sync_x, sync_y) = match (
            self.synchronizer(LogicalAxis::X),
            self.synchronizer(LogicalAxis::Y),
        ) {
            (Some(sync_x), Some(sync_y)) => (sync_x, sync_y),
            _ => {
                return Err(SpimError::DisconnectedDevice {
                    axis: LogicalAxis::Xy,
                    operation: "set_positions",
                })
            }
        };
        {
            let mut destinations = self.destinations.lock();
            destinations.insert(LogicalAxis::X, x);
            destinations.insert(LogicalAxis::Y, y);
        }
        if sync_x.goal() == Some(x) && sync_y.goal() == Some(y) {
            return Ok(());
        }

        xy.stage.move_xy(x, y).await.map_err(|err| {
            let error = HardwareError::communication(&xy.device, &err);
            tracing::error!(device = %xy.device, x, y, error = %error, "XY move failed");
            SpimError::from(error)
        })?;
        sync_x.track(x)?;
        sync_y.track(y)
    }

    /// Issue `request` and wait for every axis it moves.
    pub async fn move_to(&self, request: MoveRequest) -> AppResult<()> {
        self.set_positions(&request).await?;
        self.wait_on(&request.axes()).await
    }

    /// Wait until the named devices are settled.
    ///
    /// Stage axes wait for their synchronizer; XY waits for the device. Other
    /// roles and disconnected axes have nothing to wait for. All waits run
    /// concurrently; the first failure is returned.
    pub async fn wait_on(&self, axes: &[LogicalAxis]) -> AppResult<()> {
        let mut waits: Vec<BoxFuture<'_, AppResult<()>>> = Vec::new();
        for &axis in axes {
            if let Some(channel) = self.stages.get(axis) {
                waits.push(Box::pin(channel.sync.wait_for()));
            } else if axis == LogicalAxis::Xy {
                if let Some(xy) = &self.xy {
                    waits.push(Box::pin(async move {
                        xy.stage.wait_settled().await.map_err(|err| {
                            SpimError::from(HardwareError::communication(&xy.device, &err))
                        })
                    }));
                }
            }
        }
        join_all(waits).await.into_iter().collect()
    }

    /// Wait until every stage is settled.
    pub async fn wait_all(&self) -> AppResult<()> {
        self.wait_on(&LogicalAxis::ALL).await
    }

    /// Current (x, y, z) position.
    pub async fn stage_position(&self) -> AppResult<Vector3<f64>> {
        Ok(Vector3::new(
            self.position(LogicalAxis::X).await?,
            self.position(LogicalAxis::Y).await?,
            self.position(LogicalAxis::Z).await?,
        ))
    }

    /// Current rotation.
    pub async fn angle(&self) -> AppResult<f64> {
        self.position(LogicalAxis::Theta).await
    }

    /// Stop all polling loops and device workers. Pending waits fail with
    /// `Cancelled`.
    pub fn shutdown(&self) {
        for (_, channel) in self.stages.iter() {
            channel.sync.shutdown();
        }
        for worker in &self.workers {
            worker.shutdown();
        }
        tracing::info!(setup = %self.setup.name(), "Device registry shut down");
    }
}

impl fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("setup", &self.setup.name())
            .field("stages", &self.stages.keys().collect::<Vec<_>>())
            .field("xy", &self.xy.as_ref().map(|xy| &xy.device))
            .finish_non_exhaustive()
    }
}

/// Synchronizer for X or Y driven through the combined XY device.
fn xy_synchronizer(
    axis: LogicalAxis,
    xy: &XyChannel,
    destinations: Destinations,
    settings: crate::synchronizer::SyncSettings,
) -> MotionSynchronizer {
    let reader = xy.stage.clone();
    let sample: Sampler = Arc::new(move || {
        let stage = reader.clone();
        Box::pin(async move {
            match axis {
                LogicalAxis::X => stage.x().await,
                _ => stage.y().await,
            }
        })
    });

    let stage = xy.stage.clone();
    let command: Commander = Arc::new(move |goal| {
        let stage = stage.clone();
        let (x, y) = {
            let destinations = destinations.lock();
            let remembered = |axis| destinations.get(axis).copied().unwrap_or(0.0);
            match axis {
                LogicalAxis::X => (goal, remembered(LogicalAxis::Y)),
                _ => (remembered(LogicalAxis::X), goal),
            }
        };
        Box::pin(async move { stage.move_xy(x, y).await })
    });

    MotionSynchronizer::new(xy.device.clone(), sample, command, settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::mock::{ids, simulated_rig, BeadGeometry, SimulatedRig};
    use spim_core::error::HardwareErrorKind;

    fn rig() -> SimulatedRig {
        simulated_rig(BeadGeometry::default()).unwrap()
    }

    async fn connect(rig: &SimulatedRig, setup: SetupConfiguration) -> DeviceRegistry {
        let inventory = Arc::new(rig.inventory.clone());
        DeviceRegistry::connect(setup, inventory, MotionSettings::default()).await
    }

    fn xy_only(rig: &SimulatedRig) -> SetupConfiguration {
        let mut setup = SetupConfiguration::from_inventory("xy only", &rig.inventory);
        setup.set_device(LogicalAxis::X, None);
        setup.set_device(LogicalAxis::Y, None);
        setup
    }

    #[tokio::test(start_paused = true)]
    async fn destinations_start_at_current_positions() {
        let rig = rig();
        let registry = connect(&rig, SetupConfiguration::from_inventory("d", &rig.inventory)).await;
        assert_eq!(registry.destination(LogicalAxis::X).unwrap(), 130.0);
        assert_eq!(registry.destination(LogicalAxis::Y).unwrap(), 20.0);
        assert_eq!(registry.destination(LogicalAxis::Z).unwrap(), 50.0);
        assert_eq!(registry.destination(LogicalAxis::Theta).unwrap(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn non_stage_axes_are_rejected() {
        let rig = rig();
        let registry = connect(&rig, SetupConfiguration::from_inventory("d", &rig.inventory)).await;

        for axis in [LogicalAxis::Laser1, LogicalAxis::Camera1, LogicalAxis::Xy] {
            assert!(matches!(
                registry.set_position(axis, 1.0).await,
                Err(SpimError::InvalidAxis { .. })
            ));
            assert!(matches!(
                registry.position(axis).await,
                Err(SpimError::InvalidAxis { .. })
            ));
            assert!(matches!(
                registry.destination(axis),
                Err(SpimError::InvalidAxis { .. })
            ));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_axis_is_reported() {
        let rig = rig();
        let mut setup = xy_only(&rig);
        setup.set_device(LogicalAxis::Xy, None);
        setup.set_device(LogicalAxis::Theta, Some("Unplugged".into()));
        let registry = connect(&rig, setup).await;

        assert!(matches!(
            registry.set_position(LogicalAxis::X, 1.0).await,
            Err(SpimError::DisconnectedDevice { axis: LogicalAxis::X, .. })
        ));
        assert!(matches!(
            registry.angle().await,
            Err(SpimError::DisconnectedDevice { axis: LogicalAxis::Theta, .. })
        ));
        assert_eq!(registry.device_id(LogicalAxis::Theta), "");
        assert_eq!(registry.device_id(LogicalAxis::Z), ids::Z_STAGE);
    }

    #[tokio::test(start_paused = true)]
    async fn x_falls_back_to_xy_with_remembered_y() {
        let rig = rig();
        let registry = connect(&rig, xy_only(&rig)).await;
        assert!(registry.uses_xy_fallback(LogicalAxis::X));
        assert!(registry.uses_xy_fallback(LogicalAxis::Y));

        registry.set_position(LogicalAxis::X, 100.0).await.unwrap();
        registry.wait_on(&[LogicalAxis::X]).await.unwrap();

        assert_eq!(registry.position(LogicalAxis::X).await.unwrap(), 100.0);
        assert_eq!(registry.position(LogicalAxis::Y).await.unwrap(), 20.0);
        assert_eq!(rig.xy.move_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn compound_move_issues_one_xy_command() {
        let rig = rig();
        let registry = connect(&rig, xy_only(&rig)).await;

        registry
            .move_to(MoveRequest::xyz(Vector3::new(90.0, -5.0, 40.0)).with_theta(3.0))
            .await
            .unwrap();

        assert_eq!(rig.xy.move_count(), 1);
        let here = registry.stage_position().await.unwrap();
        assert_eq!(here, Vector3::new(90.0, -5.0, 40.0));
        assert_eq!(registry.angle().await.unwrap(), 3.0);
        assert_eq!(registry.destination(LogicalAxis::Y).unwrap(), -5.0);

        registry
            .move_to(MoveRequest::xy(90.0, -5.0))
            .await
            .unwrap();
        assert_eq!(rig.xy.move_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dedicated_stages_take_precedence_over_xy() {
        let rig = rig();
        let registry = connect(&rig, SetupConfiguration::from_inventory("d", &rig.inventory)).await;
        assert!(!registry.uses_xy_fallback(LogicalAxis::X));

        registry
            .move_to(MoveRequest::xy(125.0, 25.0))
            .await
            .unwrap();
        assert_eq!(rig.xy.move_count(), 0);
        assert_eq!(rig.xy.x_axis().current_position(), 125.0);
        assert_eq!(registry.synchronizer(LogicalAxis::X).unwrap().device(), ids::X_STAGE);
    }

    #[tokio::test(start_paused = true)]
    async fn serialized_devices_still_move() {
        let rig = rig();
        let settings = MotionSettings {
            serialized_devices: vec![ids::TWISTER.to_string(), ids::XY_STAGE.to_string()],
            ..MotionSettings::default()
        };
        let registry = DeviceRegistry::connect(
            xy_only(&rig),
            Arc::new(rig.inventory.clone()),
            settings,
        )
        .await;

        registry
            .move_to(MoveRequest::xy(110.0, 10.0).with_theta(2.0))
            .await
            .unwrap();
        assert_eq!(registry.angle().await.unwrap(), 2.0);
        assert_eq!(registry.position(LogicalAxis::X).await.unwrap(), 110.0);
        assert_eq!(registry.workers.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hardware_failure_names_the_device() {
        let rig = rig();
        let registry = connect(&rig, SetupConfiguration::from_inventory("d", &rig.inventory)).await;
        rig.z.faults().fail_always("move");

        match registry.set_position(LogicalAxis::Z, 10.0).await {
            Err(SpimError::Hardware(err)) => {
                assert_eq!(err.device, ids::Z_STAGE);
                assert_eq!(err.kind, HardwareErrorKind::Communication);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_waits() {
        let rig = rig();
        let registry = Arc::new(
            connect(&rig, SetupConfiguration::from_inventory("d", &rig.inventory)).await,
        );
        registry.set_position(LogicalAxis::Theta, 1000.0).await.unwrap();

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.wait_all().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        registry.shutdown();

        assert!(matches!(
            waiter.await.unwrap(),
            Err(SpimError::Cancelled(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn role_accessors_resolve_connected_devices() {
        let rig = rig();
        let registry = connect(&rig, SetupConfiguration::from_inventory("d", &rig.inventory)).await;
        assert!(registry.camera(LogicalAxis::Camera1).is_some());
        assert!(registry.camera(LogicalAxis::Camera2).is_none());
        assert!(registry.shutter(LogicalAxis::Laser2).is_some());
        assert!(registry.signal_io().is_some());
        assert!(registry.is_basic_spim());
        assert_eq!(registry.stage_dimension_count(), 4);
    }
}
