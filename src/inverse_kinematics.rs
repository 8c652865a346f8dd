//! Iterative inverse kinematics for chains with any number of joints.
//!
//! Levenberg-Marquardt iterations on the 6D pose error: the step is the damped least squares
//! solution, the damping is halved after every step that reduces the error and increased
//! tenfold after a rejected one. The best configuration found is always returned, whether
//! the tolerance was reached or not.

extern crate nalgebra as na;

use na::{Vector3, Vector6};
use tracing::{debug, warn};
use crate::control_error::{check_len, ControlError};
use crate::jacobian::damped_pseudo_inverse;
use crate::kinematic_traits::{Joints, Kinematics, Pose};

/// Damping above which no step can reduce the error any further.
const MAX_DAMPING: f64 = 1e8;
const MIN_DAMPING: f64 = 1e-6;

/// Parameters of the iterative solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IkSettings {
    /// Hard cap on iterations, bounds the time spent in one control tick.
    pub max_iterations: usize,
    /// Converged when the weighted error norm falls below this value.
    pub tolerance: f64,
    /// Initial Levenberg-Marquardt damping.
    pub damping: f64,
    /// Weight of the position error rows (1/m).
    pub position_weight: f64,
    /// Weight of the orientation error rows (1/rad).
    pub orientation_weight: f64,
}

impl Default for IkSettings {
    fn default() -> Self {
        IkSettings {
            max_iterations: 100,
            tolerance: 1e-6,
            damping: 1e-2,
            position_weight: 1.0,
            orientation_weight: 1.0,
        }
    }
}

/// Result of the inverse kinematics.
#[derive(Debug, Clone, PartialEq)]
pub struct IkSolution {
    /// Best joint positions found.
    pub joints: Joints,
    /// Weighted pose error norm at `joints`.
    pub residual: f64,
    /// Iterations performed.
    pub iterations: usize,
    /// True if `residual` is below the tolerance.
    pub converged: bool,
}

/// Pose error from `current` to `target`, position difference over the rotation vector
/// of R_target · R_currentᵀ, both in the base frame.
pub fn pose_error(current: &Pose, target: &Pose) -> Vector6<f64> {
    let position: Vector3<f64> = target.translation.vector - current.translation.vector;
    let orientation = (target.rotation * current.rotation.inverse()).scaled_axis();
    Vector6::new(
        position.x, position.y, position.z,
        orientation.x, orientation.y, orientation.z,
    )
}

fn weighted(error: &Vector6<f64>, settings: &IkSettings) -> Vector6<f64> {
    let mut error = *error;
    for row in 0..3 {
        error[row] *= settings.position_weight;
        error[row + 3] *= settings.orientation_weight;
    }
    error
}

/// Solves for joint positions placing the end of `robot` at `target`, starting from `seed`.
/// Fails only if the seed does not have one value per joint.
pub fn solve(
    robot: &impl Kinematics,
    seed: &Joints,
    target: &Pose,
    settings: &IkSettings,
) -> Result<IkSolution, ControlError> {
    check_len(robot.dof(), seed.len())?;

    let mut qs = seed.clone();
    let mut error = weighted(&pose_error(&robot.forward(&qs), target), settings);
    let mut residual = error.norm();
    let mut lambda = settings.damping.max(MIN_DAMPING);
    let mut iterations = 0;

    while residual >= settings.tolerance && iterations < settings.max_iterations {
        iterations += 1;

        let mut jacobian = robot.jacobian(&qs);
        jacobian.rows_mut(0, 3).scale_mut(settings.position_weight);
        jacobian.rows_mut(3, 3).scale_mut(settings.orientation_weight);

        let step = damped_pseudo_inverse(&jacobian, lambda) * error;
        let candidate = &qs + step;
        let candidate_error = weighted(&pose_error(&robot.forward(&candidate), target), settings);
        let candidate_residual = candidate_error.norm();

        if candidate_residual.is_finite() && candidate_residual < residual {
            qs = candidate;
            error = candidate_error;
            residual = candidate_residual;
            lambda = (lambda * 0.5).max(MIN_DAMPING);
        } else {
            lambda *= 10.0;
            if lambda > MAX_DAMPING {
                break;
            }
        }
    }

    let converged = residual < settings.tolerance;
    if converged {
        debug!("IK converged in {} iterations, residual {:.3e}", iterations, residual);
    } else {
        warn!("IK did not converge after {} iterations, residual {:.3e}", iterations, residual);
    }
    Ok(IkSolution { joints: qs, residual, iterations, converged })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::test_utils::{planar_two_link, seven_joint_arm};
    use na::{Isometry3, Translation3, UnitQuaternion};

    #[test]
    fn test_pose_error() {
        let current = Isometry3::from_parts(Translation3::new(1.0, 2.0, 3.0),
                                            UnitQuaternion::identity());
        let target = Isometry3::from_parts(Translation3::new(1.5, 2.0, 2.0),
                                           UnitQuaternion::from_euler_angles(0.0, 0.0, 0.3));
        let error = pose_error(&current, &target);
        assert!((error[0] - 0.5).abs() < 1e-12);
        assert!((error[2] + 1.0).abs() < 1e-12);
        assert!((error[5] - 0.3).abs() < 1e-12);
        assert!(error[3].abs() < 1e-12 && error[4].abs() < 1e-12);
        assert_eq!(pose_error(&target, &target), Vector6::zeros());
    }

    #[test]
    fn test_planar_arm_converges() {
        let robot = planar_two_link(1.0, 0.5);
        let truth = Joints::from_vec(vec![0.6, -0.9]);
        let target = robot.forward(&truth);
        let seed = Joints::from_vec(vec![0.2, -0.3]);

        let solution = solve(&robot, &seed, &target, &IkSettings::default()).expect("valid seed");
        assert!(solution.converged, "residual {}", solution.residual);
        let reached = robot.forward(&solution.joints);
        assert!((reached.translation.vector - target.translation.vector).norm() < 1e-5);
    }

    #[test]
    fn test_redundant_arm_converges() {
        let robot = seven_joint_arm();
        let truth = Joints::from_vec(vec![0.1, 1.2, -1.4, -1.1, 1.5, -1.4, -0.3]);
        let target = robot.forward(&truth);
        let seed = &truth + Joints::from_vec(vec![0.1, -0.1, 0.15, 0.1, -0.1, 0.1, 0.05]);

        let solution = solve(&robot, &seed, &target, &IkSettings::default()).expect("valid seed");
        assert!(solution.converged, "residual {}", solution.residual);
        assert!(solution.iterations <= IkSettings::default().max_iterations);
        let reached = robot.forward(&solution.joints);
        assert!((reached.translation.vector - target.translation.vector).norm() < 1e-5);
        assert!(reached.rotation.angle_to(&target.rotation) < 1e-5);
    }

    #[test]
    fn test_seed_already_at_target() {
        let robot = seven_joint_arm();
        let seed = Joints::from_vec(vec![0.0, 1.0, -1.0, -1.0, 1.0, -1.0, 0.0]);
        let target = robot.forward(&seed);
        let solution = solve(&robot, &seed, &target, &IkSettings::default()).expect("valid seed");
        assert!(solution.converged);
        assert_eq!(solution.iterations, 0);
        assert_eq!(solution.joints, seed);
    }

    #[test]
    fn test_unreachable_target_returns_best_effort() {
        let robot = planar_two_link(1.0, 0.5);
        // 3 meters away, the arm is 1.5 meters long
        let target = Isometry3::translation(3.0, 0.0, 0.0);
        let settings = IkSettings { max_iterations: 50, ..IkSettings::default() };
        let seed = Joints::from_vec(vec![0.5, 0.5]);
        let solution = solve(&robot, &seed, &target, &settings).expect("valid seed");

        assert!(!solution.converged);
        assert!(solution.residual.is_finite());
        assert!(solution.iterations <= 50);
        assert!(solution.joints.iter().all(|q| q.is_finite()));
        // Best effort is the stretched arm pointing at the target
        let reached = robot.forward(&solution.joints);
        assert!((reached.translation.x - 1.5).abs() < 5e-2);
    }

    #[test]
    fn test_wrong_seed_length() {
        let robot = seven_joint_arm();
        let result = solve(&robot, &Joints::zeros(6), &Isometry3::identity(), &IkSettings::default());
        assert_eq!(result, Err(ControlError::DimensionMismatch { expected: 7, found: 6 }));
    }
}
