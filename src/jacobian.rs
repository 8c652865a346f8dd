//! Differential kinematics: mapping between joint space and the end-effector twist
//! through the geometric Jacobian and its damped pseudo-inverse.

extern crate nalgebra as na;

use na::{DMatrix, Vector6};
use tracing::warn;
use crate::control_error::{check_len, ControlError};
use crate::kinematic_traits::{Joints, Kinematics, Twist, Wrench};

/// Struct representing the Jacobian matrix
#[derive(Debug, Clone)]
pub struct Jacobian {
    /// A 6 x N matrix representing the Jacobian
    ///
    /// The Jacobian matrix maps the joint velocities to the end-effector velocities.
    /// Each column corresponds to a joint, and each row corresponds to a degree of freedom
    /// of the end-effector (linear velocities on top, angular velocities below).
    matrix: DMatrix<f64>,

    /// Damping λ of the pseudo-inverse, keeps joint velocities bounded near singularities.
    damping: f64,
}

impl Jacobian {
    /// Constructs a new Jacobian struct by computing the Jacobian matrix for the given robot
    /// and joint configuration
    ///
    /// # Arguments
    ///
    /// * `robot` - A reference to the robot implementing the Kinematics trait
    /// * `qs` - A reference to the joint configuration
    /// * `damping` - Damping of the pseudo-inverse, 0 for the plain Moore-Penrose inverse
    pub fn new(robot: &impl Kinematics, qs: &Joints, damping: f64) -> Result<Self, ControlError> {
        check_len(robot.dof(), qs.len())?;
        Ok(Self { matrix: robot.jacobian(qs), damping })
    }

    /// Wraps already computed Jacobian that must have 6 rows.
    pub fn from_matrix(matrix: DMatrix<f64>, damping: f64) -> Result<Self, ControlError> {
        check_len(6, matrix.nrows())?;
        Ok(Self { matrix, damping })
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Number of joints (columns).
    pub fn dof(&self) -> usize {
        self.matrix.ncols()
    }

    /// Damped pseudo-inverse J⁺ (N x 6).
    pub fn pseudo_inverse(&self) -> DMatrix<f64> {
        damped_pseudo_inverse(&self.matrix, self.damping)
    }

    /// Computes the joint velocities required to achieve a desired end-effector twist
    ///
    /// # Returns
    ///
    /// Joint velocities q̇ = J⁺ · twist. Near singular configurations the damping trades
    /// tracking accuracy for bounded joint velocities.
    pub fn velocities(&self, desired_twist: &Twist) -> Joints {
        self.velocities_from_vector(&desired_twist.to_vector6())
    }

    /// Same as `velocities`, with the twist given as a 6D vector, linear over angular.
    pub fn velocities_from_vector(&self, desired_twist: &Vector6<f64>) -> Joints {
        self.pseudo_inverse() * desired_twist
    }

    /// Computes the joint torques required to achieve a desired end-effector force/torque,
    /// τ = Jᵀ · wrench.
    pub fn torques(&self, desired_wrench: &Wrench) -> Joints {
        self.torques_from_vector(&desired_wrench.to_vector6())
    }

    pub fn torques_from_vector(&self, desired_wrench: &Vector6<f64>) -> Joints {
        self.matrix.transpose() * desired_wrench
    }

    /// Null space projector I − J⁺J (N x N). Joint motions projected by it do not move
    /// the end-effector.
    pub fn null_space_projector(&self) -> DMatrix<f64> {
        let n = self.dof();
        DMatrix::identity(n, n) - self.pseudo_inverse() * &self.matrix
    }
}

/// Iteration cap of the singular value decomposition. A 6 x N Jacobian needs a few dozen.
pub const MAX_SVD_ITERATIONS: usize = 1000;

/// Damped pseudo-inverse from the singular value decomposition J = U Σ Vᵀ:
/// ```text
/// J⁺ = V · diag(σ / (σ² + λ²)) · Uᵀ
/// ```
/// With λ = 0 this is the Moore-Penrose inverse (zero singular values stay zero).
/// For λ > 0 no entry of the result exceeds 1 / (2λ).
///
/// The decomposition runs at most [`MAX_SVD_ITERATIONS`] sweeps. A matrix with non-finite
/// entries, or one that does not converge within that bound, yields the zero matrix.
pub fn damped_pseudo_inverse(matrix: &DMatrix<f64>, damping: f64) -> DMatrix<f64> {
    let (rows, cols) = matrix.shape();
    if !matrix.iter().all(|v| v.is_finite()) {
        warn!("Pseudo-inverse of a non-finite {}x{} matrix, returning zeros", rows, cols);
        return DMatrix::zeros(cols, rows);
    }
    let Some(svd) = matrix.clone().try_svd(true, true, f64::EPSILON, MAX_SVD_ITERATIONS) else {
        warn!("SVD of a {}x{} matrix did not converge, returning zeros", rows, cols);
        return DMatrix::zeros(cols, rows);
    };
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        // Both factors were requested
        return DMatrix::zeros(cols, rows);
    };
    let lambda2 = damping * damping;
    let inverted = svd.singular_values.map(|sigma| {
        let denominator = sigma * sigma + lambda2;
        if denominator > f64::EPSILON * f64::EPSILON {
            sigma / denominator
        } else {
            0.0
        }
    });
    v_t.transpose() * DMatrix::from_diagonal(&inverted) * u.transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainJoint, JointType, KinematicChain, LinkInertia};
    use crate::tests::test_utils::{planar_two_link, seven_joint_arm};
    use na::{Isometry3, Vector3};

    const EPSILON: f64 = 1e-6;

    /// Single revolute joint about z with the tip 1 meter away along x.
    /// When the joint rotates, it affects the y-position and the z-orientation of the tip.
    fn single_rotary_joint() -> KinematicChain {
        let joints = vec![
            ChainJoint::new("joint", JointType::Revolute, Isometry3::identity(),
                            Vector3::z(), LinkInertia::zero()).expect("valid joint"),
        ];
        KinematicChain::new(joints, Isometry3::translation(1.0, 0.0, 0.0)).expect("valid chain")
    }

    #[test]
    fn test_velocities_from_twist() {
        let robot = single_rotary_joint();
        let jacobian = Jacobian::new(&robot, &Joints::zeros(1), 0.0).expect("one joint");

        // Given an end effector located 1 meter away from the axis of rotation,
        // with the joint rotating at a speed of 1 radian per second, the tip velocity is
        // one meter per second. Given we start from the angle 0, it all goes to the y component.
        let twist = Twist::new(Vector3::new(0.0, 1.0, 0.0), Vector3::new(0.0, 0.0, 1.0));
        let joint_velocities = jacobian.velocities(&twist);
        assert_eq!(joint_velocities.len(), 1);
        assert!((joint_velocities[0] - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_compute_joint_torques() {
        let robot = single_rotary_joint();
        let jacobian = Jacobian::new(&robot, &Joints::zeros(1), 0.0).expect("one joint");

        // For a single joint robot, the torque about its axis is what we need to put
        let wrench = Wrench::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 1.234));
        let joint_torques = jacobian.torques(&wrench);
        assert_eq!(joint_torques[0], 1.234);

        // 1 N along y at 1 m lever is 1 Nm about z
        let push = Wrench::linear(Vector3::new(0.0, 1.0, 0.0));
        assert!((jacobian.torques(&push)[0] - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_pseudo_inverse_is_left_inverse_for_full_column_rank() {
        let robot = planar_two_link(1.0, 0.5);
        let qs = Joints::from_vec(vec![0.3, 0.9]);
        let jacobian = Jacobian::new(&robot, &qs, 0.0).expect("two joints");
        let product = jacobian.pseudo_inverse() * jacobian.matrix();
        assert!((product - DMatrix::<f64>::identity(2, 2)).amax() < 1e-9);

        // Joint velocity is recovered from the twist it produces
        let qds = Joints::from_vec(vec![0.4, -0.7]);
        let twist = jacobian.matrix() * &qds;
        let recovered = jacobian.velocities_from_vector(&Vector6::from_column_slice(twist.as_slice()));
        assert!((recovered - qds).amax() < 1e-9);
    }

    #[test]
    fn test_damped_inverse_bounded_at_singularity() {
        // Stretched planar arm, no joint moves the tip radially
        let robot = planar_two_link(1.0, 0.5);
        let damping = 0.05;
        let jacobian = Jacobian::new(&robot, &Joints::zeros(2), damping).expect("two joints");
        let pinv = jacobian.pseudo_inverse();
        assert!(pinv.iter().all(|v| v.is_finite()));
        assert!(pinv.amax() <= 1.0 / (2.0 * damping) + EPSILON);

        // Radial motion is not reachable, joint velocities stay bounded
        let qds = jacobian.velocities(&Twist::linear(Vector3::new(1.0, 0.0, 0.0)));
        assert!(qds.amax() <= 1.0 / (2.0 * damping) + EPSILON);
    }

    #[test]
    fn test_non_finite_matrix_gives_zero_inverse() {
        let robot = seven_joint_arm();
        let mut matrix = robot.jacobian(&Joints::from_vec(vec![0.0, 1.57, 0.0, -1.0, 0.0, 0.5, 0.0]));
        matrix[(1, 2)] = f64::NAN;
        let pinv = damped_pseudo_inverse(&matrix, 1e-3);
        assert_eq!(pinv.shape(), (7, 6));
        assert!(pinv.iter().all(|&v| v == 0.0));

        matrix[(1, 2)] = f64::INFINITY;
        let jacobian = Jacobian::from_matrix(matrix, 1e-3).expect("6 rows");
        let qds = jacobian.velocities(&Twist::linear(Vector3::new(0.0, 0.1, 0.0)));
        assert_eq!(qds, Joints::zeros(7));
    }

    #[test]
    fn test_null_space_projector_redundant_arm() {
        let robot = seven_joint_arm();
        let qs = Joints::from_vec(vec![0.2, 0.7, -0.4, -1.2, 0.3, 0.8, 0.1]);
        let jacobian = Jacobian::new(&robot, &qs, 0.0).expect("seven joints");
        let projector = jacobian.null_space_projector();
        let motion = projector * Joints::from_vec(vec![1.0, -0.5, 0.3, 0.8, -0.2, 0.6, 0.4]);
        assert!(motion.norm() > 1e-3, "Redundant arm must have a null space");
        assert!((jacobian.matrix() * motion).amax() < 1e-9);
    }

    #[test]
    fn test_dimension_checks() {
        let robot = seven_joint_arm();
        assert_eq!(Jacobian::new(&robot, &Joints::zeros(6), 0.0).err(),
                   Some(ControlError::DimensionMismatch { expected: 7, found: 6 }));
        assert!(Jacobian::from_matrix(DMatrix::zeros(5, 7), 0.0).is_err());
        assert!(Jacobian::from_matrix(DMatrix::zeros(6, 7), 0.0).is_ok());
    }
}
