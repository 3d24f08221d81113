//! Bead-based rotation-axis calibration.
//!
//! A sub-resolution bead fixed to the sample orbits the rotation axis as the
//! sample turns. [`BeadCalibrator`] follows it: after each rotation step it
//! predicts where the bead went in focus, sweeps the focal axis around that
//! guess, localises the bead in every slice with a [`PeakFitter`], and
//! records the intensity-weighted centre as a calibration point. A
//! [`CircleFitter`] through the points yields the axis origin.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut calibrator = BeadCalibrator::new(registry.clone(), config.calibration.clone())?;
//! calibrator.add_next_points(12).await?;
//! calibrator.recompute()?;
//! println!("axis through {}", calibrator.rotation_origin().unwrap());
//! ```

use crate::geometry::{CircleFit, CircleFitter, PlaneCircleFitter, RotationAxis};
use crate::peak::{GaussianPeakFitter, PeakFit, PeakFitter};
use nalgebra::{Point3, Unit, Vector3};
use spim_core::axis::LogicalAxis;
use spim_core::capabilities::FrameSource;
use spim_core::data::Roi;
use spim_core::error::{AppResult, HardwareError, SpimError};
use spim_core::limits::MIN_CALIBRATION_POINTS;
use spim_hardware::config::{CalibrationSettings, CentroidMode};
use spim_hardware::{DeviceRegistry, MoveRequest};
use std::fmt;
use std::sync::Arc;

/// Follows a bead across rotation steps and fits the rotation axis.
pub struct BeadCalibrator {
    registry: Arc<DeviceRegistry>,
    camera: Arc<dyn FrameSource>,
    camera_id: String,
    settings: CalibrationSettings,
    reference_direction: Unit<Vector3<f64>>,
    peak_fitter: Box<dyn PeakFitter>,
    circle_fitter: Box<dyn CircleFitter>,
    points: Vec<Point3<f64>>,
    axis: Option<RotationAxis>,
    last_fit: Option<CircleFit>,
}

impl BeadCalibrator {
    /// Calibrator imaging through Camera1 (or Camera2 when only that is set).
    ///
    /// # Errors
    /// - `DisconnectedDevice` when no camera role is connected
    /// - `Config` when the reference direction is the zero vector
    pub fn new(registry: Arc<DeviceRegistry>, settings: CalibrationSettings) -> AppResult<Self> {
        let (role, camera) = [LogicalAxis::Camera1, LogicalAxis::Camera2]
            .into_iter()
            .find_map(|role| registry.camera(role).map(|camera| (role, camera)))
            .ok_or(SpimError::DisconnectedDevice {
                axis: LogicalAxis::Camera1,
                operation: "calibrate",
            })?;
        let camera_id = registry.device_id(role).to_string();

        let [x, y, z] = settings.reference_direction;
        let reference_direction = Unit::try_new(Vector3::new(x, y, z), f64::EPSILON).ok_or_else(|| {
            SpimError::Config("calibration.reference_direction must be non-zero".to_string())
        })?;

        tracing::info!(camera = %camera_id, um_per_pixel = settings.um_per_pixel, "Bead calibrator ready");
        Ok(Self {
            registry,
            camera,
            camera_id,
            settings,
            reference_direction,
            peak_fitter: Box::new(GaussianPeakFitter::default()),
            circle_fitter: Box::new(PlaneCircleFitter),
            points: Vec::new(),
            axis: None,
            last_fit: None,
        })
    }

    /// Replace the bead localiser.
    pub fn with_peak_fitter(mut self, fitter: impl PeakFitter + 'static) -> Self {
        self.peak_fitter = Box::new(fitter);
        self
    }

    /// Replace the axis fitter.
    pub fn with_circle_fitter(mut self, fitter: impl CircleFitter + 'static) -> Self {
        self.circle_fitter = Box::new(fitter);
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Recorded points, oldest first.
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    /// Sample-plane size of one camera pixel.
    pub fn um_per_pixel(&self) -> f64 {
        self.settings.um_per_pixel
    }

    /// Fitted axis origin, if any.
    pub fn rotation_origin(&self) -> Option<Point3<f64>> {
        self.axis.map(|axis| axis.origin)
    }

    /// Fitted axis, if any.
    pub fn rotation_axis(&self) -> Option<RotationAxis> {
        self.axis
    }

    /// Normal of the plane the points were fitted in. Compare it with the
    /// axis direction to check the reference-direction assumption.
    pub fn fitted_normal(&self) -> Option<Unit<Vector3<f64>>> {
        self.last_fit.map(|fit| fit.normal)
    }

    /// Radius and residual of the last successful fit.
    pub fn last_fit(&self) -> Option<&CircleFit> {
        self.last_fit.as_ref()
    }

    /// Whether a pixel size is known and an axis has been fitted.
    pub fn is_calibrated(&self) -> bool {
        self.settings.um_per_pixel != 0.0 && self.axis.is_some()
    }

    // =========================================================================
    // Bead Tracking
    // =========================================================================

    /// Focal position where the next bead image is expected.
    ///
    /// Linear extrapolation from the last two points; the current focus
    /// position while fewer are recorded.
    pub async fn predict_z(&self) -> AppResult<f64> {
        match self.points.as_slice() {
            [.., older, recent] => Ok(recent.z + (recent.z - older.z)),
            _ => self.registry.position(LogicalAxis::Z).await,
        }
    }

    /// Sweep focus over `predict_z() ± delta` in unit steps and localise the
    /// bead.
    ///
    /// Returns `None` when no slice passes the intensity and in-frame
    /// filters. Focus is returned to the predicted centre either way.
    pub async fn scan_bead(&self, delta: f64) -> AppResult<Option<Point3<f64>>> {
        let base = self.predict_z().await?;
        let slices = (2.0 * delta).floor().max(0.0) as u32;
        tracing::debug!(base, delta, slices = slices + 1, "Scanning for bead");

        let mut weighted = WeightedCentre::default();
        // (ratio, commanded z) of the brightest included slice
        let mut brightest: Option<(f64, f64)> = None;

        for i in 0..=slices {
            let z = base - delta + f64::from(i);
            self.registry.set_position(LogicalAxis::Z, z).await?;
            self.registry.wait_on(&[LogicalAxis::Z]).await?;
            tokio::time::sleep(self.settings.slice_settle()).await;

            let frame = self.camera.snap().await.map_err(|err| self.camera_error(&err))?;
            let roi = self.camera.roi().await.map_err(|err| self.camera_error(&err))?;
            let crop = frame.crop(&roi);
            let fit = self.peak_fitter.fit(&crop);

            let ratio = fit.intensity_ratio();
            if ratio < self.settings.min_intensity_ratio || !fit.is_inside(crop.width, crop.height) {
                tracing::trace!(z, ratio, xc = fit.xc, yc = fit.yc, "Slice excluded");
                continue;
            }

            let stage = self.registry.stage_position().await?;
            let (x, y) = self.to_stage(&fit, &roi, frame.width, frame.height, stage.x, stage.y);
            tracing::debug!(z, ratio, x, y, "Slice included");

            weighted.add(ratio, Point3::new(x, y, stage.z));
            if brightest.map_or(true, |(best, _)| ratio > best) {
                brightest = Some((ratio, z));
            }
        }

        self.registry.set_position(LogicalAxis::Z, base).await?;
        self.registry.wait_on(&[LogicalAxis::Z]).await?;

        let centre = weighted.centre();
        Ok(match self.settings.centroid_mode {
            CentroidMode::WeightedMean => centre,
            CentroidMode::MaxIntensity => centre
                .zip(brightest)
                .map(|(point, (_, z))| Point3::new(point.x, point.y, z)),
        })
    }

    /// Locate the bead near its predicted position, centre the stage on it
    /// and record it.
    ///
    /// The point is recorded only once the stage move and the ROI re-centre
    /// have both succeeded.
    ///
    /// # Errors
    /// `BeadLost` when neither the small nor the large search finds it.
    pub async fn get_next_bead(&mut self) -> AppResult<Point3<f64>> {
        let mut found = self.scan_bead(self.settings.small_search_radius).await?;
        if found.is_none() {
            tracing::info!(radius = self.settings.large_search_radius, "Bead not in small search, widening");
            found = self.scan_bead(self.settings.large_search_radius).await?;
        }
        let Some(point) = found else {
            let center = self.predict_z().await?;
            tracing::warn!(center, radius = self.settings.large_search_radius, "Bead lost");
            return Err(SpimError::BeadLost {
                center,
                radius: self.settings.large_search_radius,
            });
        };

        self.registry.move_to(MoveRequest::xyz(point.coords)).await?;

        let roi = self.camera.roi().await.map_err(|err| self.camera_error(&err))?;
        let (width, height) = self.camera.resolution();
        self.camera
            .set_roi(roi.centered_in(width, height))
            .await
            .map_err(|err| self.camera_error(&err))?;
        self.points.push(point);

        tracing::info!(index = self.points.len() - 1, x = point.x, y = point.y, z = point.z, "Bead found");
        Ok(point)
    }

    /// Rotate one step, let the sample settle, then [`get_next_bead`](Self::get_next_bead).
    pub async fn add_next_point(&mut self) -> AppResult<Point3<f64>> {
        let theta = self.registry.angle().await? + self.settings.rotation_step;
        self.registry.set_position(LogicalAxis::Theta, theta).await?;
        self.registry.wait_on(&[LogicalAxis::Theta]).await?;
        tokio::time::sleep(self.settings.rotation_settle()).await;
        self.get_next_bead().await
    }

    /// [`add_next_point`](Self::add_next_point) up to `count` times, stopping
    /// at the first lost bead. Returns the number of points added.
    pub async fn add_next_points(&mut self, count: usize) -> AppResult<usize> {
        for added in 0..count {
            match self.add_next_point().await {
                Ok(_) => {}
                Err(SpimError::BeadLost { center, radius }) => {
                    tracing::warn!(added, center, radius, "Stopping: bead lost");
                    return Ok(added);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(count)
    }

    // =========================================================================
    // Point Editing
    // =========================================================================

    /// Replace point `index` with the current stage position. Returns false
    /// when `index` is out of range.
    pub async fn revise_selected(&mut self, index: usize) -> AppResult<bool> {
        if index >= self.points.len() {
            return Ok(false);
        }
        let here = Point3::from(self.registry.stage_position().await?);
        tracing::info!(index, x = here.x, y = here.y, z = here.z, "Point revised");
        self.points[index] = here;
        Ok(true)
    }

    /// Remove the points at `indices`; out-of-range and repeated indices are
    /// ignored. Returns how many were removed.
    pub fn remove_selected(&mut self, indices: &[usize]) -> usize {
        let mut doomed: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&i| i < self.points.len())
            .collect();
        doomed.sort_unstable();
        doomed.dedup();
        for &index in doomed.iter().rev() {
            self.points.remove(index);
        }
        doomed.len()
    }

    // =========================================================================
    // Axis Fitting
    // =========================================================================

    /// Refit the axis from the recorded points.
    ///
    /// # Errors
    /// `CalibrationInsufficientData` with two or fewer points, or the fit's
    /// own error. The previous axis is kept on failure.
    pub fn recompute(&mut self) -> AppResult<RotationAxis> {
        if self.points.len() < MIN_CALIBRATION_POINTS {
            return Err(SpimError::CalibrationInsufficientData {
                required: MIN_CALIBRATION_POINTS,
                available: self.points.len(),
            });
        }
        self.fit_axis()
    }

    /// Fit a circle through the points; the axis passes through its centre
    /// along the reference direction.
    pub fn fit_axis(&mut self) -> AppResult<RotationAxis> {
        let fit = self.circle_fitter.fit(&self.points)?;
        let axis = RotationAxis::new(fit.center, self.reference_direction);
        let tilt = fit.normal.dot(&axis.direction.into_inner()).abs().clamp(0.0, 1.0).acos().to_degrees();
        tracing::info!(
            origin = ?axis.origin,
            radius = fit.radius,
            rms = fit.rms,
            normal_tilt_deg = tilt,
            points = self.points.len(),
            "Rotation axis fitted"
        );
        self.axis = Some(axis);
        self.last_fit = Some(fit);
        Ok(axis)
    }

    /// Flip the axis direction. Returns false when nothing is fitted.
    pub fn reverse_axis(&mut self) -> bool {
        match self.axis.as_mut() {
            Some(axis) => {
                *axis = axis.reversed();
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn to_stage(
        &self,
        fit: &PeakFit,
        roi: &Roi,
        frame_width: u32,
        frame_height: u32,
        stage_x: f64,
        stage_y: f64,
    ) -> (f64, f64) {
        let um = self.settings.um_per_pixel;
        (
            stage_x + (f64::from(roi.x) + fit.xc - f64::from(frame_width) / 2.0) * um,
            stage_y + (f64::from(roi.y) + fit.yc - f64::from(frame_height) / 2.0) * um,
        )
    }

    fn camera_error(&self, err: &anyhow::Error) -> SpimError {
        let error = HardwareError::communication(&self.camera_id, err);
        tracing::error!(device = %self.camera_id, error = %error, "Camera failure during calibration");
        error.into()
    }
}

impl fmt::Debug for BeadCalibrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeadCalibrator")
            .field("camera", &self.camera_id)
            .field("settings", &self.settings)
            .field("points", &self.points)
            .field("axis", &self.axis)
            .finish_non_exhaustive()
    }
}

/// Running intensity-weighted mean of slice positions.
#[derive(Debug, Default)]
struct WeightedCentre {
    weight: f64,
    sum: Vector3<f64>,
}

impl WeightedCentre {
    fn add(&mut self, weight: f64, point: Point3<f64>) {
        self.weight += weight;
        self.sum += point.coords * weight;
    }

    fn centre(&self) -> Option<Point3<f64>> {
        (self.weight > 0.0).then(|| Point3::from(self.sum / self.weight))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use spim_core::data::Frame;
    use spim_hardware::config::MotionSettings;
    use spim_hardware::drivers::mock::{ids, simulated_rig, BeadGeometry, SimulatedRig};
    use spim_hardware::SetupConfiguration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn calibrator(rig: &SimulatedRig, settings: CalibrationSettings) -> BeadCalibrator {
        let registry = DeviceRegistry::connect(
            SetupConfiguration::from_inventory("Default", &rig.inventory),
            Arc::new(rig.inventory.clone()),
            MotionSettings::default(),
        )
        .await;
        BeadCalibrator::new(Arc::new(registry), settings).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn scan_finds_bead_in_focus() {
        let rig = simulated_rig(BeadGeometry::default()).unwrap();
        let calibrator = calibrator(&rig, CalibrationSettings::default()).await;

        let point = calibrator.scan_bead(3.0).await.unwrap().unwrap();
        let truth = rig.scene.bead_position();
        assert_relative_eq!(point.x, truth.x, epsilon = 0.05);
        assert_relative_eq!(point.y, truth.y, epsilon = 0.05);
        assert_relative_eq!(point.z, truth.z, epsilon = 0.05);
        assert_relative_eq!(rig.z.current_position(), truth.z, epsilon = 1e-3);
        assert_eq!(rig.camera.frame_count(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn max_intensity_uses_commanded_slice() {
        let rig = simulated_rig(BeadGeometry::default()).unwrap();
        let settings = CalibrationSettings {
            centroid_mode: CentroidMode::MaxIntensity,
            ..CalibrationSettings::default()
        };
        let calibrator = calibrator(&rig, settings).await;

        let point = calibrator.scan_bead(2.0).await.unwrap().unwrap();
        let truth = rig.scene.bead_position();
        assert_eq!(point.z, 50.0);
        assert_relative_eq!(point.x, truth.x, epsilon = 0.05);
        assert_relative_eq!(point.y, truth.y, epsilon = 0.05);
    }

    /// Replays fixed fits, one per snapped slice.
    struct ScriptedPeaks {
        fits: Vec<PeakFit>,
        next: AtomicUsize,
    }

    impl ScriptedPeaks {
        fn new(slices: &[(f64, f64)]) -> Self {
            let fits = slices
                .iter()
                .map(|&(xc, ratio)| PeakFit {
                    xc,
                    yc: xc / 2.0,
                    amplitude: ratio,
                    sigma: 1.0,
                    intensity: ratio,
                    background: 1.0,
                })
                .collect();
            Self {
                fits,
                next: AtomicUsize::new(0),
            }
        }
    }

    impl PeakFitter for ScriptedPeaks {
        fn fit(&self, frame: &Frame) -> PeakFit {
            let index = self.next.fetch_add(1, Ordering::SeqCst);
            self.fits
                .get(index)
                .copied()
                .unwrap_or_else(|| PeakFit::empty(frame.width, frame.height, 1.0))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn max_intensity_only_replaces_z() {
        let slices = [(10.0, 3.0), (20.0, 1.0), (30.0, 2.0)];

        let rig = simulated_rig(BeadGeometry::default()).unwrap();
        let weighted = calibrator(&rig, CalibrationSettings::default())
            .await
            .with_peak_fitter(ScriptedPeaks::new(&slices))
            .scan_bead(1.0)
            .await
            .unwrap()
            .unwrap();

        let rig = simulated_rig(BeadGeometry::default()).unwrap();
        let settings = CalibrationSettings {
            centroid_mode: CentroidMode::MaxIntensity,
            ..CalibrationSettings::default()
        };
        let brightest = calibrator(&rig, settings)
            .await
            .with_peak_fitter(ScriptedPeaks::new(&slices))
            .scan_bead(1.0)
            .await
            .unwrap()
            .unwrap();

        assert_relative_eq!(brightest.x, weighted.x, epsilon = 1e-9);
        assert_relative_eq!(brightest.y, weighted.y, epsilon = 1e-9);
        assert_eq!(brightest.z, 49.0);
        assert!(weighted.z > 49.5);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_roi_recentre_records_nothing() {
        let rig = simulated_rig(BeadGeometry::default()).unwrap();
        let mut calibrator = calibrator(&rig, CalibrationSettings::default()).await;
        rig.camera.faults().fail_always("roi");

        match calibrator.get_next_bead().await.unwrap_err() {
            SpimError::Hardware(hw) => assert_eq!(hw.device, ids::CAMERA),
            other => panic!("unexpected error {other}"),
        }
        assert!(calibrator.points().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn scan_without_bead_returns_none_and_restores_focus() {
        let rig = simulated_rig(BeadGeometry::default()).unwrap();
        let mut calibrator = calibrator(&rig, CalibrationSettings::default()).await;
        calibrator.points = vec![Point3::new(130.0, 20.0, 80.0), Point3::new(130.0, 20.0, 90.0)];

        assert_eq!(calibrator.scan_bead(5.0).await.unwrap(), None);
        assert_eq!(calibrator.points().len(), 2);
        assert_relative_eq!(rig.z.current_position(), 100.0, epsilon = 1e-3);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_bead_is_lost() {
        let rig = simulated_rig(BeadGeometry::default()).unwrap();
        let mut calibrator = calibrator(&rig, CalibrationSettings::default()).await;
        calibrator
            .registry
            .move_to(MoveRequest {
                z: Some(100.0),
                ..MoveRequest::default()
            })
            .await
            .unwrap();

        let err = calibrator.get_next_bead().await.unwrap_err();
        assert!(matches!(err, SpimError::BeadLost { radius, .. } if radius == 15.0));
        assert!(err.is_recoverable());
        assert!(calibrator.points().is_empty());
        // 11 slices, then 31
        assert_eq!(rig.camera.frame_count(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn prediction_extrapolates_last_two_points() {
        let rig = simulated_rig(BeadGeometry::default()).unwrap();
        let mut calibrator = calibrator(&rig, CalibrationSettings::default()).await;

        assert_relative_eq!(calibrator.predict_z().await.unwrap(), 50.0, epsilon = 1e-9);
        calibrator.points.push(Point3::new(0.0, 0.0, 50.0));
        assert_relative_eq!(calibrator.predict_z().await.unwrap(), 50.0, epsilon = 1e-9);
        calibrator.points.push(Point3::new(0.0, 0.0, 48.5));
        assert_relative_eq!(calibrator.predict_z().await.unwrap(), 47.0);
    }

    #[tokio::test(start_paused = true)]
    async fn recompute_needs_three_points_and_keeps_old_axis() {
        let rig = simulated_rig(BeadGeometry::default()).unwrap();
        let mut calibrator = calibrator(&rig, CalibrationSettings::default()).await;
        assert!(!calibrator.reverse_axis());

        calibrator.points = vec![
            Point3::new(130.0, 20.0, 50.0),
            Point3::new(100.0, 20.0, 20.0),
            Point3::new(70.0, 20.0, 50.0),
        ];
        let axis = calibrator.recompute().unwrap();
        assert_relative_eq!(axis.origin, Point3::new(100.0, 20.0, 50.0), epsilon = 1e-9);
        assert_relative_eq!(axis.direction.into_inner(), Vector3::y());
        assert!(calibrator.is_calibrated());

        assert_eq!(calibrator.remove_selected(&[2, 2, 7]), 1);
        assert!(matches!(
            calibrator.recompute(),
            Err(SpimError::CalibrationInsufficientData { required: 3, available: 2 })
        ));
        assert_eq!(calibrator.rotation_axis(), Some(axis));

        assert!(calibrator.reverse_axis());
        assert_relative_eq!(calibrator.rotation_axis().unwrap().direction.into_inner(), -Vector3::y());
        assert_eq!(calibrator.rotation_origin(), Some(axis.origin));
    }

    #[tokio::test(start_paused = true)]
    async fn revise_takes_current_stage_position() {
        let rig = simulated_rig(BeadGeometry::default()).unwrap();
        let mut calibrator = calibrator(&rig, CalibrationSettings::default()).await;
        calibrator.points = vec![Point3::origin(), Point3::origin()];

        assert!(calibrator.revise_selected(1).await.unwrap());
        assert!(!calibrator.revise_selected(5).await.unwrap());
        assert_relative_eq!(calibrator.points()[1], Point3::new(130.0, 20.0, 50.0), epsilon = 1e-9);
        assert_eq!(calibrator.points()[0], Point3::origin());
    }

    #[tokio::test(start_paused = true)]
    async fn camera_failure_names_the_camera() {
        let rig = simulated_rig(BeadGeometry::default()).unwrap();
        let calibrator = calibrator(&rig, CalibrationSettings::default()).await;
        rig.camera.faults().fail_always("snap");

        match calibrator.scan_bead(1.0).await.unwrap_err() {
            SpimError::Hardware(hw) => assert_eq!(hw.device, ids::CAMERA),
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn zero_reference_direction_is_rejected() {
        let rig = simulated_rig(BeadGeometry::default()).unwrap();
        let registry = DeviceRegistry::connect(
            SetupConfiguration::from_inventory("Default", &rig.inventory),
            Arc::new(rig.inventory.clone()),
            MotionSettings::default(),
        )
        .await;
        let settings = CalibrationSettings {
            reference_direction: [0.0, 0.0, 0.0],
            ..CalibrationSettings::default()
        };
        assert!(matches!(
            BeadCalibrator::new(Arc::new(registry), settings),
            Err(SpimError::Config(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn calibrator_needs_a_camera() {
        let rig = simulated_rig(BeadGeometry::default()).unwrap();
        let mut setup = SetupConfiguration::from_inventory("No camera", &rig.inventory);
        setup.set_device(LogicalAxis::Camera1, None);
        let registry = DeviceRegistry::connect(setup, Arc::new(rig.inventory.clone()), MotionSettings::default()).await;

        assert!(matches!(
            BeadCalibrator::new(Arc::new(registry), CalibrationSettings::default()),
            Err(SpimError::DisconnectedDevice { axis: LogicalAxis::Camera1, .. })
        ));
    }
}
