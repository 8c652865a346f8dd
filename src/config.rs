//! Startup configuration of the control loop. Immutable during a run.
//!
//! Defaults reproduce the classic demonstration: a 10 s straight line with 1.5 s acceleration
//! phases from the current end-effector position to its mirror image in y, tracked by the
//! joint-space law with Kp = 70, Kd = 7 at 500 Hz.

extern crate nalgebra as na;

use na::{Isometry3, Vector3};
use crate::control_error::ControlError;
use crate::controller::{ControlLaw, JointGains};
use crate::driver::DriverSettings;
use crate::kinematic_traits::Joints;
use crate::parameter_error::ParameterError;
use crate::planner::{PathShape, TrajectoryPlanner, VelocityProfile};
use crate::robot_model::ModelSettings;

/// Path shape as configured. The end point of a line is optional and defaults to the start
/// point mirrored in y.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShapeConfig {
    Linear { end: Option<Vector3<f64>> },
    Circular { radius: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryConfig {
    pub duration: f64,
    pub profile: VelocityProfile,
    pub shape: ShapeConfig,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        TrajectoryConfig {
            duration: 10.0,
            profile: VelocityProfile::Trapezoidal { acc_duration: 1.5 },
            shape: ShapeConfig::Linear { end: None },
        }
    }
}

/// Robot description related settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RobotConfig {
    /// First link of the chain in the robot description.
    pub base_link: String,
    /// Last link of the chain in the robot description.
    pub tip_link: String,
    /// Joint positions the simulated arm starts from.
    pub initial_joints: Joints,
}

impl Default for RobotConfig {
    fn default() -> Self {
        RobotConfig {
            base_link: "lbr_link_0".to_string(),
            tip_link: "lbr_link_ee".to_string(),
            initial_joints: Joints::from_vec(vec![0.0, 1.57, -1.57, -1.2, 1.57, -1.57, -0.37]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlConfig {
    pub robot: RobotConfig,
    pub trajectory: TrajectoryConfig,
    pub law: ControlLaw,
    /// Fixed transform from the chain tip to the end-effector.
    pub end_effector: Isometry3<f64>,
    pub model: ModelSettings,
    pub driver: DriverSettings,
    /// Control loop rate, Hz.
    pub rate: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        ControlConfig {
            robot: RobotConfig::default(),
            trajectory: TrajectoryConfig::default(),
            law: ControlLaw::JointSpace(JointGains::new(70.0, 7.0)),
            end_effector: Isometry3::identity(),
            model: ModelSettings::default(),
            driver: DriverSettings::default(),
            rate: 500.0,
        }
    }
}

impl ControlConfig {
    /// Control period in seconds.
    pub fn period(&self) -> f64 {
        1.0 / self.rate
    }

    /// Checks the values no other constructor validates.
    pub fn validate(&self) -> Result<(), ParameterError> {
        if !self.rate.is_finite() || self.rate <= 0.0 {
            return Err(ParameterError::ParseError(format!("rate must be positive, got {}", self.rate)));
        }
        if !self.driver.settle_time.is_finite() || self.driver.settle_time < 0.0 {
            return Err(ParameterError::ParseError(format!(
                "settle_time must not be negative, got {}", self.driver.settle_time)));
        }
        if self.model.pinv_damping < 0.0 || self.model.ik.damping < 0.0 {
            return Err(ParameterError::ParseError("damping must not be negative".to_string()));
        }
        if self.model.ik.max_iterations == 0 {
            return Err(ParameterError::ParseError("ik max_iterations must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Trajectory segment starting at `start`.
    pub fn planner(&self, start: Vector3<f64>) -> Result<TrajectoryPlanner, ControlError> {
        let shape = match self.trajectory.shape {
            ShapeConfig::Linear { end } => PathShape::Linear {
                end: end.unwrap_or_else(|| Vector3::new(start.x, -start.y, start.z)),
            },
            ShapeConfig::Circular { radius } => PathShape::Circular { radius },
        };
        TrajectoryPlanner::new(self.trajectory.duration, self.trajectory.profile, start, shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControlConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.period(), 0.002);
        assert_eq!(config.robot.initial_joints.len(), 7);
        assert_eq!(config.law, ControlLaw::JointSpace(JointGains { kp: 70.0, kd: 7.0 }));
    }

    #[test]
    fn test_default_end_mirrors_start() {
        let config = ControlConfig::default();
        let planner = config.planner(Vector3::new(0.4, 0.2, 0.7)).expect("valid profile");
        assert_eq!(planner.end_point(), Vector3::new(0.4, -0.2, 0.7));
        assert_eq!(planner.duration(), 10.0);
    }

    #[test]
    fn test_invalid_values() {
        let mut config = ControlConfig::default();
        config.rate = 0.0;
        assert!(config.validate().is_err());

        let mut config = ControlConfig::default();
        config.driver.settle_time = -1.0;
        assert!(config.validate().is_err());

        let mut config = ControlConfig::default();
        config.trajectory.profile = VelocityProfile::Trapezoidal { acc_duration: 6.0 };
        assert!(matches!(config.planner(Vector3::zeros()), Err(ControlError::InvalidProfile(_))));
    }
}
