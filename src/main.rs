//! CLI entry point for spim-daq
//!
//! Runs against the simulated rig, so every subcommand works without
//! hardware:
//!
//! - `plan`: parse per-axis range descriptors into an acquisition row
//! - `setup`: resolve, load or save setup configurations and report them
//! - `calibrate`: follow the simulated bead and fit the rotation axis
//!
//! # Usage
//!
//! ```bash
//! spim-daq plan x=0:10:40 z=100:2:140 theta=0:90:270 --schedule
//! spim-daq setup --store setups.toml --save
//! spim-daq calibrate --points 12 --config spim.toml
//! ```

#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use spim_daq::calibration::BeadCalibrator;
use spim_daq::core::{AcquisitionRow, LogicalAxis};
use spim_daq::hardware::config::{SetupStore, SpimConfig};
use spim_daq::hardware::drivers::mock::{simulated_rig, BeadGeometry};
use spim_daq::hardware::{DeviceInventory, DeviceRegistry, SetupConfiguration};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "spim-daq")]
#[command(about = "SPIM stage coordination and rotation-axis calibration", long_about = None)]
struct Cli {
    /// Application config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an acquisition row from AXIS=DESCRIPTOR pairs
    Plan {
        /// e.g. `z=0:2:40`, `theta=0:90:270`, `xy=10, 20`
        #[arg(required = true)]
        axes: Vec<String>,

        /// Print every position to visit
        #[arg(long)]
        schedule: bool,
    },

    /// Report setup configurations for the simulated rig
    Setup {
        /// Setup store (defaults to `setup.store_path` from the config)
        #[arg(long)]
        store: Option<PathBuf>,

        /// Write the reported setups back to the store
        #[arg(long)]
        save: bool,
    },

    /// Calibrate the rotation axis on the simulated rig
    Calibrate {
        /// Rotation steps to record
        #[arg(long, default_value = "12")]
        points: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    spim_daq::init_tracing()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Plan { axes, schedule } => plan(&axes, schedule),
        Commands::Setup { store, save } => {
            let config = SpimConfig::load(cli.config.as_deref())?;
            setup(store.or(config.setup.store_path), save)
        }
        Commands::Calibrate { points } => {
            let config = SpimConfig::load(cli.config.as_deref())?;
            calibrate(&config, points).await
        }
    }
}

fn plan(pairs: &[String], schedule: bool) -> Result<()> {
    let mut row = AcquisitionRow::new();
    for pair in pairs {
        let (axis, descriptor) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("expected AXIS=DESCRIPTOR, got '{pair}'"))?;
        let axis: LogicalAxis = axis.parse()?;
        row.set_value_set(axis, Some(descriptor))?;
    }

    for axis in row.axes() {
        if let Some(description) = row.describe(axis) {
            println!("{:<12} {description}", axis.label());
        }
    }
    if let Some(xy) = row.describe(LogicalAxis::Xy) {
        println!("{:<12} {xy}", LogicalAxis::Xy.label());
    }
    println!("depth        {}", row.depth());

    if schedule {
        for (index, point) in row.schedule()?.iter().enumerate() {
            let coords: Vec<String> = point
                .iter()
                .map(|(axis, value)| format!("{}={value}", axis.key()))
                .collect();
            println!("{index:>5}  {}", coords.join("  "));
        }
    }
    Ok(())
}

fn setup(store: Option<PathBuf>, save: bool) -> Result<()> {
    let rig = simulated_rig(BeadGeometry::default())?;
    let store = store.map(SetupStore::new);

    let mut setups = match &store {
        Some(store) => store.load(&rig.inventory)?,
        None => Vec::new(),
    };
    if setups.is_empty() {
        setups.push(SetupConfiguration::from_inventory("Default", &rig.inventory));
    }

    for setup in &setups {
        report(setup, &rig.inventory);
    }

    if save {
        let store = store.ok_or_else(|| anyhow!("--save needs --store or setup.store_path"))?;
        store.save(&setups, &rig.inventory)?;
        println!("Saved {} setup(s) to {}", setups.len(), store.path().display());
    }
    Ok(())
}

fn report(setup: &SetupConfiguration, inventory: &DeviceInventory) {
    let origin = if setup.is_auto_derived() { " (from defaults)" } else { "" };
    println!("{}{origin}", setup.name());
    for axis in LogicalAxis::ALL {
        let device = setup.device(axis).unwrap_or("-");
        let state = if setup.is_connected(axis, inventory) {
            "connected"
        } else {
            "disconnected"
        };
        println!("  {:<14} {device:<12} {state}", axis.label());
    }
    println!(
        "  stage dimensions: {}  minimal microscope: {}  basic SPIM: {}",
        setup.stage_dimension_count(inventory),
        setup.is_minimal_microscope(inventory),
        setup.is_basic_spim(inventory),
    );
}

async fn calibrate(config: &SpimConfig, points: usize) -> Result<()> {
    let rig = simulated_rig(BeadGeometry {
        degrees_per_step: 5.0,
        um_per_pixel: config.calibration.um_per_pixel,
        ..BeadGeometry::default()
    })?;
    let registry = Arc::new(
        DeviceRegistry::connect(
            SetupConfiguration::from_inventory("Default", &rig.inventory),
            Arc::new(rig.inventory.clone()),
            config.motion.clone(),
        )
        .await,
    );

    let mut calibrator = BeadCalibrator::new(registry.clone(), config.calibration.clone())?;
    let recorded = calibrator.add_next_points(points).await?;
    println!("Recorded {recorded} of {points} points");
    for (index, point) in calibrator.points().iter().enumerate() {
        println!("{index:>4}  x={:.3}  y={:.3}  z={:.3}", point.x, point.y, point.z);
    }

    let axis = calibrator
        .recompute()
        .context("Rotation axis could not be fitted")?;
    let truth = rig.scene.geometry();
    println!(
        "Axis origin ({:.3}, {:.3}, {:.3}), direction ({:.3}, {:.3}, {:.3})",
        axis.origin.x,
        axis.origin.y,
        axis.origin.z,
        axis.direction.x,
        axis.direction.y,
        axis.direction.z,
    );
    println!(
        "Simulated axis origin lies {:.3} µm off the fitted axis",
        axis.distance_to(&truth.axis_origin)
    );
    if let Some(normal) = calibrator.fitted_normal() {
        println!("Fitted plane normal ({:.3}, {:.3}, {:.3})", normal.x, normal.y, normal.z);
    }

    registry.shutdown();
    Ok(())
}
