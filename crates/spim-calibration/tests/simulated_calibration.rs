//! End-to-end calibration against the simulated rig.
//!
//! The mock camera renders a bead orbiting a known axis; the calibrator has
//! to follow it through focus and recover that axis.
//!
//! Run with: `cargo test -p spim-calibration --test simulated_calibration`

use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use spim_calibration::BeadCalibrator;
use spim_core::capabilities::FrameSource;
use spim_core::data::Roi;
use spim_core::error::SpimError;
use spim_hardware::config::{CalibrationSettings, MotionSettings};
use spim_hardware::drivers::mock::{simulated_rig, BeadGeometry, SimulatedRig};
use spim_hardware::{DeviceRegistry, SetupConfiguration};
use std::sync::Arc;

fn fine_steps() -> BeadGeometry {
    BeadGeometry {
        degrees_per_step: 5.0,
        ..BeadGeometry::default()
    }
}

async fn connect(rig: &SimulatedRig) -> Arc<DeviceRegistry> {
    Arc::new(
        DeviceRegistry::connect(
            SetupConfiguration::from_inventory("Default", &rig.inventory),
            Arc::new(rig.inventory.clone()),
            MotionSettings::default(),
        )
        .await,
    )
}

#[tokio::test(start_paused = true)]
async fn recovers_known_axis() {
    let rig = simulated_rig(fine_steps()).unwrap();
    let registry = connect(&rig).await;
    let mut calibrator = BeadCalibrator::new(registry.clone(), CalibrationSettings::default()).unwrap();

    assert_eq!(calibrator.add_next_points(12).await.unwrap(), 12);
    assert_relative_eq!(rig.twister.current_position(), 12.0, epsilon = 1e-2);

    // Every recorded point sits where the bead actually was.
    let truth = rig.scene.geometry();
    for (i, point) in calibrator.points().iter().enumerate() {
        let expected = truth.bead_position((i + 1) as f64);
        assert_relative_eq!(*point, expected, epsilon = 0.1);
    }

    let axis = calibrator.recompute().unwrap();
    assert_relative_eq!(axis.origin.x, 100.0, epsilon = 0.5);
    assert_relative_eq!(axis.origin.z, 50.0, epsilon = 0.5);
    assert_relative_eq!(axis.direction.into_inner(), Vector3::y());
    assert!(calibrator.is_calibrated());
    assert_relative_eq!(calibrator.last_fit().unwrap().radius, 30.0, epsilon = 0.5);
    assert!(calibrator.fitted_normal().unwrap().dot(&Vector3::y()).abs() > 0.99);

    // The stage ends centred on the last bead.
    let last = *calibrator.points().last().unwrap();
    assert_relative_eq!(Point3::from(registry.stage_position().await.unwrap()), last, epsilon = 1e-2);

    registry.shutdown();
}

#[tokio::test(start_paused = true)]
async fn lost_bead_stops_the_batch() {
    let rig = simulated_rig(fine_steps()).unwrap();
    let registry = connect(&rig).await;
    let mut calibrator = BeadCalibrator::new(registry.clone(), CalibrationSettings::default()).unwrap();

    assert_eq!(calibrator.add_next_points(2).await.unwrap(), 2);

    // Take the camera's view off the bead entirely.
    rig.camera.set_roi(Roi::new(0, 0, 16, 16)).await.unwrap();
    let added = calibrator.add_next_points(3).await.unwrap();
    assert_eq!(added, 0);
    assert_eq!(calibrator.points().len(), 2);

    assert!(matches!(
        calibrator.recompute(),
        Err(SpimError::CalibrationInsufficientData { available: 2, .. })
    ));
    assert!(!calibrator.is_calibrated());
}
