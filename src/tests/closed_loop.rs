//! The controllers drive the simulated arm along whole trajectory segments.

use crate::config::{ControlConfig, ShapeConfig};
use crate::controller::{CartesianGains, ControlLaw};
use crate::driver::{ControlLoopDriver, TickOutcome, TickReport};
use crate::planner::VelocityProfile;
use crate::simulation::{simulated_backend, SimulatedArm};
use crate::tests::test_utils::seven_joint_arm;

fn short_line() -> ControlConfig {
    let mut config = ControlConfig::default();
    config.trajectory.duration = 2.0;
    config.trajectory.profile = VelocityProfile::Trapezoidal { acc_duration: 0.5 };
    config
}

/// Runs the loop until the segment finishes, returning all tick reports.
fn run(config: &ControlConfig) -> Vec<TickReport> {
    let chain = seven_joint_arm();
    let initial = config.robot.initial_joints.clone();
    let mut driver = ControlLoopDriver::from_config(chain.clone(), config, &initial)
        .expect("valid config");
    let arm = SimulatedArm::new(chain, initial, config.model.gravity, config.period())
        .expect("seven joints");
    let (mut source, mut sink, _arm) = simulated_backend(arm);

    let mut reports = Vec::new();
    for k in 0..100_000 {
        let t = k as f64 * config.period();
        match driver.tick(t, &mut source, &mut sink).expect("no control errors") {
            TickOutcome::Commanded(report) => reports.push(report),
            TickOutcome::Finished => break,
            TickOutcome::Skipped => panic!("Simulated arm always has a state"),
        }
    }
    reports
}

fn max_error(reports: &[TickReport]) -> f64 {
    reports.iter().map(|r| r.position_error.norm()).fold(0.0, f64::max)
}

#[test]
fn test_joint_space_tracks_line() {
    let reports = run(&short_line());
    assert!((999..=1001).contains(&reports.len()), "{} ticks", reports.len());
    assert!(reports.iter().all(|r| r.published));
    assert!(reports.iter().all(|r| r.ik_residual.is_some_and(|residual| residual < 1e-4)));

    let error = max_error(&reports);
    assert!(error < 0.01, "Max tracking error {} m", error);
    let last = reports.last().expect("commanded ticks");
    assert!(last.progress.s > 0.99);
}

#[test]
fn test_operational_space_tracks_line() {
    let mut config = short_line();
    config.law = ControlLaw::OperationalSpace(CartesianGains::with_damping_ratio(70.0, 35.0, 0.4, 0.5));
    let reports = run(&config);
    assert!(reports.iter().all(|r| r.ik_residual.is_none()));
    let error = max_error(&reports);
    assert!(error < 0.02, "Max tracking error {} m", error);
}

#[test]
fn test_circle_after_settling() {
    let mut config = ControlConfig::default();
    config.trajectory.duration = 2.0;
    config.trajectory.profile = VelocityProfile::Cubic;
    config.trajectory.shape = ShapeConfig::Circular { radius: 0.02 };
    config.driver.settle_time = 1.0;
    let reports = run(&config);

    // The circle starts off the current position, the settle phase moves there
    assert!(reports[0].position_error.norm() > 0.019);
    let moving: Vec<TickReport> = reports.into_iter().filter(|r| r.time > 1.0).collect();
    assert!(!moving.is_empty());
    let error = max_error(&moving);
    assert!(error < 0.01, "Max tracking error {} m", error);
}
