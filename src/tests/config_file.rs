use nalgebra::Vector3;
use std::f64::consts::FRAC_PI_4;

use crate::config::{ControlConfig, ShapeConfig};
use crate::controller::ControlLaw;
use crate::driver::FaultPolicy;
use crate::planner::VelocityProfile;

#[test]
fn test_read_control_yaml() {
    let config = ControlConfig::from_yaml_file("src/tests/data/control.yaml").expect("valid config");

    assert_eq!(config.robot.base_link, "lbr_link_0");
    assert_eq!(config.robot.tip_link, "lbr_link_ee");
    assert_eq!(config.robot.initial_joints.len(), 7);
    assert!((config.robot.initial_joints[1] - 90_f64.to_radians()).abs() < 1e-12);
    assert_eq!(config.model.gravity, Vector3::new(0.0, 0.0, -9.81));

    assert!((config.end_effector.translation.z - 0.1).abs() < 1e-12);
    assert!((config.end_effector.rotation.angle() - FRAC_PI_4).abs() < 1e-12);

    assert_eq!(config.trajectory.duration, 8.0);
    assert_eq!(config.trajectory.profile, VelocityProfile::Cubic);
    assert_eq!(config.trajectory.shape, ShapeConfig::Circular { radius: 0.05 });

    let ControlLaw::OperationalSpace(gains) = config.law else {
        panic!("Expected operational space law, got {:?}", config.law);
    };
    assert_eq!(gains.kp, 70.0);
    assert_eq!(gains.ko, 35.0);
    assert!((gains.kd_p - 2.0 * 0.4 * 70_f64.sqrt()).abs() < 1e-12);
    assert!((gains.kd_o - 2.0 * 0.5 * 35_f64.sqrt()).abs() < 1e-12);
    assert_eq!(gains.null_damping, 2.0);

    assert_eq!(config.model.ik.max_iterations, 50);
    assert_eq!(config.model.ik.tolerance, 1.0e-8);
    assert_eq!(config.rate, 1000.0);
    assert_eq!(config.driver.settle_time, 0.5);
    assert_eq!(config.driver.fault_policy, FaultPolicy::ZeroTorque);
}

#[test]
fn test_missing_config_file() {
    assert!(ControlConfig::from_yaml_file("src/tests/data/missing.yaml").is_err());
}
