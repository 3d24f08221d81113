//! Registry lifecycle integration tests.
//!
//! Exercises the full device-side path against the simulated rig:
//! resolve setups, persist them, reload them, bind a registry and move.
//!
//! Run with: `cargo test -p spim-hardware --test registry_lifecycle`

use nalgebra::Vector3;
use spim_core::axis::LogicalAxis;
use spim_core::error::SpimError;
use spim_hardware::config::{MotionSettings, SetupStore, SpimConfig};
use spim_hardware::drivers::mock::{ids, simulated_rig, BeadGeometry};
use spim_hardware::{DeviceRegistry, MotionState, MoveRequest, SetupConfiguration};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test(start_paused = true)]
async fn saved_setups_drive_the_same_devices_after_reload() {
    let rig = simulated_rig(BeadGeometry::default()).unwrap();
    let dir = TempDir::new().unwrap();
    let store = SetupStore::new(dir.path().join("setups.toml"));

    let mut manual = SetupConfiguration::from_inventory("Manual", &rig.inventory);
    manual.set_device(LogicalAxis::X, None);
    manual.set_device(LogicalAxis::Y, None);
    store
        .save(&[manual.clone()], &rig.inventory)
        .unwrap();

    let reloaded = store.load(&rig.inventory).unwrap();
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded[0].devices(), manual.devices());

    let inventory = Arc::new(rig.inventory.clone());
    let registry = DeviceRegistry::connect(
        reloaded[0].clone(),
        inventory,
        MotionSettings::default(),
    )
    .await;
    assert!(registry.uses_xy_fallback(LogicalAxis::X));

    registry
        .move_to(MoveRequest::xyz(Vector3::new(128.0, 21.0, 49.5)).with_theta(1.0))
        .await
        .unwrap();
    assert_eq!(
        registry.stage_position().await.unwrap(),
        Vector3::new(128.0, 21.0, 49.5)
    );
    assert_eq!(rig.xy.move_count(), 1);
    assert_eq!(rig.twister.current_position(), 1.0);

    registry.shutdown();
}

#[tokio::test(start_paused = true)]
async fn config_file_controls_polling_and_serialization() {
    let rig = simulated_rig(BeadGeometry::default()).unwrap();
    let config = SpimConfig::from_toml_str(
        r#"
        [motion]
        poll_interval_ms = 10
        tolerance = 0.01
        serialized_devices = ["Twister"]
        "#,
    )
    .unwrap();

    let registry = DeviceRegistry::connect(
        SetupConfiguration::from_inventory("Default", &rig.inventory),
        Arc::new(rig.inventory.clone()),
        config.motion.clone(),
    )
    .await;

    let sync = registry.synchronizer(LogicalAxis::Theta).unwrap();
    assert_eq!(sync.settings().poll_interval.as_millis(), 10);
    assert_eq!(sync.device(), ids::TWISTER);

    registry.set_position(LogicalAxis::Theta, 5.0).await.unwrap();
    registry.wait_on(&[LogicalAxis::Theta]).await.unwrap();
    assert!(matches!(
        sync.state(),
        MotionState::Converged { goal, .. } if goal == 5.0
    ));
}

#[tokio::test(start_paused = true)]
async fn lost_communication_surfaces_as_hardware_error() {
    let rig = simulated_rig(BeadGeometry::default()).unwrap();
    let registry = DeviceRegistry::connect(
        SetupConfiguration::from_inventory("Default", &rig.inventory),
        Arc::new(rig.inventory.clone()),
        MotionSettings::default(),
    )
    .await;

    registry.set_position(LogicalAxis::Z, 60.0).await.unwrap();
    rig.z.faults().lose_communication();

    let err = registry.wait_on(&[LogicalAxis::Z]).await.unwrap_err();
    match err {
        SpimError::Hardware(hw) => assert_eq!(hw.device, ids::Z_STAGE),
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(
        registry.synchronizer(LogicalAxis::Z).unwrap().state(),
        MotionState::Idle
    );
}
