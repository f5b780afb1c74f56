//! The sample files under `config/` must stay loadable and valid.

use fluoro_daq::config::{ScanPlanConfig, SystemConfig};
use fluoro_daq::experiment::{ScanKind, ScanType};
use fluoro_daq::hardware::{KinematicModel, MonochromatorController, Role};
use fluoro_daq::measurement::Wavelength;
use std::path::PathBuf;

fn sample(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("config")
        .join(name)
}

#[test]
fn sample_system_file_is_valid() {
    let config = SystemConfig::load_from(sample("system.yml")).unwrap();
    config.validate().unwrap();

    assert_eq!(config.log_level, "info");
    assert_eq!(config.excitation.port, "/dev/ttyACM0");
    assert!(matches!(
        config.excitation.kinematic_model().unwrap(),
        KinematicModel::Linear { .. }
    ));
    assert!(matches!(
        config.controller(Role::Emission).kinematic_model().unwrap(),
        KinematicModel::SinusoidalPhase { .. }
    ));

    let slits = config.excitation.slits.as_ref().unwrap();
    assert_eq!(slits.count, 2);
    assert_eq!(slits.min_step, -1000);
    assert!(config.emission.slits.is_none());
}

#[test]
fn sample_plan_covers_every_scan_type() {
    let specs = ScanPlanConfig::load_from(sample("scans.yml"))
        .unwrap()
        .specs()
        .unwrap();

    let types: Vec<ScanType> = specs.iter().map(|s| s.kind.scan_type()).collect();
    assert_eq!(
        types,
        vec![
            ScanType::Singular,
            ScanType::Emission,
            ScanType::Excitation,
            ScanType::Synchronous,
        ]
    );
    assert_eq!(specs[0].integration_time.as_millis(), 250.0);
    assert_eq!(specs[1].kind.len(), 111);
    assert_eq!(specs[3].resolution, 0.1);
    assert!(matches!(specs[3].kind, ScanKind::Synchronous { offset, .. } if offset == 20.0));
}

#[tokio::test]
async fn sample_system_limits() {
    let config = SystemConfig::load_from(sample("system.yml")).unwrap();
    let (port, _harness) = fluoro_daq::hardware::mock_serial::new();
    let channel = fluoro_daq::hardware::CommandChannel::new(
        Box::new(port),
        config.excitation.timings.poll_interval,
    )
    .into_shared();

    let ex = MonochromatorController::from_config(Role::Excitation, &config.excitation, channel)
        .unwrap();
    assert_eq!(
        ex.wavelength_limits(),
        (Wavelength::new(200.0), Wavelength::new(1200.0))
    );
    let (narrowest, widest) = ex.resolution_limits().unwrap();
    assert_eq!(narrowest, Wavelength::new(-1.0));
    assert_eq!(widest, Wavelength::new(10.0));
}
