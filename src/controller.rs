//! Model-based inverse dynamics control laws.
//!
//! Both laws compute a desired joint acceleration and feed it through the rigid-body model,
//! τ = M(q)·q̈ + C(q, q̇) + G(q). They are stateless: the same model state, target and gains
//! always give the same torques.

extern crate nalgebra as na;

use na::{DMatrix, Vector6};
use crate::control_error::{check_len, ControlError};
use crate::inverse_kinematics::{pose_error, IkSolution};
use crate::jacobian::Jacobian;
use crate::kinematic_traits::{CartesianTarget, Joints, JointTarget};
use crate::robot_model::KinematicChainModel;

/// Proportional and derivative gains applied to every joint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointGains {
    pub kp: f64,
    pub kd: f64,
}

impl JointGains {
    pub fn new(kp: f64, kd: f64) -> Self {
        JointGains { kp, kd }
    }

    /// kd = 2·√kp
    pub fn critically_damped(kp: f64) -> Self {
        JointGains { kp, kd: 2.0 * kp.sqrt() }
    }
}

/// Gains of the operational space law, translation and orientation separately.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CartesianGains {
    /// Position stiffness.
    pub kp: f64,
    /// Orientation stiffness.
    pub ko: f64,
    /// Position damping.
    pub kd_p: f64,
    /// Orientation damping.
    pub kd_o: f64,
    /// Damping of joint motion in the null space of the Jacobian.
    pub null_damping: f64,
}

impl CartesianGains {
    /// Damping from the damping ratios, kd = 2·ζ·√k.
    pub fn with_damping_ratio(kp: f64, ko: f64, zeta_p: f64, zeta_o: f64) -> Self {
        CartesianGains {
            kp,
            ko,
            kd_p: 2.0 * zeta_p * kp.sqrt(),
            kd_o: 2.0 * zeta_o * ko.sqrt(),
            null_damping: 1.0,
        }
    }

    pub fn critically_damped(kp: f64, ko: f64) -> Self {
        Self::with_damping_ratio(kp, ko, 1.0, 1.0)
    }

    pub fn with_null_damping(mut self, null_damping: f64) -> Self {
        self.null_damping = null_damping;
        self
    }

    fn stiffness(&self) -> Vector6<f64> {
        Vector6::new(self.kp, self.kp, self.kp, self.ko, self.ko, self.ko)
    }

    fn damping(&self) -> Vector6<f64> {
        Vector6::new(self.kd_p, self.kd_p, self.kd_p, self.kd_o, self.kd_o, self.kd_o)
    }
}

/// Control law, chosen once at configuration time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlLaw {
    /// Track joint targets obtained from inverse kinematics.
    JointSpace(JointGains),
    /// Track the Cartesian target directly.
    OperationalSpace(CartesianGains),
}

/// Torques of one control step, with the IK result when the law needed one.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlOutput {
    pub torques: Joints,
    pub ik: Option<IkSolution>,
}

/// Joint-space inverse dynamics:
/// ```text
/// a = q̈_d + Kd·(q̇_d − q̇) + Kp·(q_d − q)
/// τ = M·a + C + G
/// ```
pub fn joint_space_torques(
    model: &KinematicChainModel,
    target: &JointTarget,
    gains: &JointGains,
) -> Result<Joints, ControlError> {
    let n = model.dof();
    check_len(n, target.positions.len())?;
    check_len(n, target.velocities.len())?;
    check_len(n, target.accelerations.len())?;
    let state = model.state().ok_or(ControlError::ModelNotReady)?;

    let accelerations = &target.accelerations
        + (&target.velocities - &state.velocities) * gains.kd
        + (&target.positions - &state.positions) * gains.kp;

    Ok(model.mass_matrix()? * accelerations + model.coriolis_term()? + model.gravity_term()?)
}

/// Operational space inverse dynamics:
/// ```text
/// ẍ = ẍ_d + Kd·(ẋ_d − J·q̇) + Kp·e
/// q̈ = J⁺·(ẍ − J̇·q̇) − (I − J⁺·J)·k_null·q̇
/// τ = M·q̈ + C + G
/// ```
/// where e stacks the position error over the rotation vector of R_d·Rᵀ.
pub fn operational_space_torques(
    model: &KinematicChainModel,
    target: &CartesianTarget,
    gains: &CartesianGains,
) -> Result<Joints, ControlError> {
    let state = model.state().ok_or(ControlError::ModelNotReady)?;
    let pose = model.end_effector_pose()?;
    let jacobian = Jacobian::from_matrix(model.jacobian()?, model.settings().pinv_damping)?;

    let error = pose_error(&pose, &target.pose);
    let twist = jacobian.matrix() * &state.velocities;
    let twist_error = target.twist.to_vector6() - Vector6::from_column_slice(twist.as_slice());
    let accel = target.accel.to_vector6()
        + gains.damping().component_mul(&twist_error)
        + gains.stiffness().component_mul(&error);

    let pinv = jacobian.pseudo_inverse();
    let null_space = DMatrix::identity(model.dof(), model.dof()) - &pinv * jacobian.matrix();
    let accelerations = &pinv * (accel - model.jacobian_dot_qdot()?)
        - null_space * &state.velocities * gains.null_damping;

    Ok(model.mass_matrix()? * accelerations + model.coriolis_term()? + model.gravity_term()?)
}

/// Maps the Cartesian target to joint space for the joint-space law: positions by inverse
/// kinematics seeded at the current joints, q̇_d = J⁺·ẋ_d and q̈_d = J⁺·(ẍ_d − J̇·q̇).
pub fn joint_target_from_cartesian(
    model: &KinematicChainModel,
    target: &CartesianTarget,
) -> Result<(JointTarget, IkSolution), ControlError> {
    let state = model.state().ok_or(ControlError::ModelNotReady)?;
    let ik = model.inverse_kinematics(&state.positions, &target.pose)?;
    let jacobian = model.jacobian()?;
    let velocities = model.desired_joint_velocity(&target.twist, &jacobian)?;

    let pinv = Jacobian::from_matrix(jacobian, model.settings().pinv_damping)?.pseudo_inverse();
    let accelerations = pinv * (target.accel.to_vector6() - model.jacobian_dot_qdot()?);

    let joint_target = JointTarget {
        positions: ik.joints.clone(),
        velocities,
        accelerations,
    };
    Ok((joint_target, ik))
}

/// Applies the configured control law.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionController {
    law: ControlLaw,
}

impl MotionController {
    pub fn new(law: ControlLaw) -> Self {
        MotionController { law }
    }

    pub fn law(&self) -> &ControlLaw {
        &self.law
    }

    /// Torques tracking the Cartesian target. The joint-space law goes through
    /// [`joint_target_from_cartesian`] first and reports the IK result.
    pub fn compute_torques(
        &self,
        model: &KinematicChainModel,
        target: &CartesianTarget,
    ) -> Result<ControlOutput, ControlError> {
        match &self.law {
            ControlLaw::JointSpace(gains) => {
                let (joint_target, ik) = joint_target_from_cartesian(model, target)?;
                let torques = joint_space_torques(model, &joint_target, gains)?;
                Ok(ControlOutput { torques, ik: Some(ik) })
            }
            ControlLaw::OperationalSpace(gains) => {
                let torques = operational_space_torques(model, target, gains)?;
                Ok(ControlOutput { torques, ik: None })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics;
    use crate::kinematic_traits::Twist;
    use crate::robot_model::ModelSettings;
    use crate::tests::test_utils::{initial_configuration, seven_joint_arm};
    use na::Vector3;

    const EPSILON: f64 = 1e-9;

    fn model_at(qs: &Joints, qds: &Joints, pinv_damping: f64) -> KinematicChainModel {
        let settings = ModelSettings { pinv_damping, ..ModelSettings::default() };
        let mut model = KinematicChainModel::new(seven_joint_arm(), settings);
        model.update(qs, qds).expect("seven joints");
        model
    }

    #[test]
    fn test_gain_helpers() {
        let gains = CartesianGains::with_damping_ratio(70.0, 35.0, 0.4, 0.5);
        assert!((gains.kd_p - 2.0 * 0.4 * 70.0_f64.sqrt()).abs() < EPSILON);
        assert!((gains.kd_o - 2.0 * 0.5 * 35.0_f64.sqrt()).abs() < EPSILON);
        let critical = CartesianGains::critically_damped(100.0, 25.0);
        assert!((critical.kd_p - 20.0).abs() < EPSILON);
        assert!((critical.kd_o - 10.0).abs() < EPSILON);
        assert_eq!(JointGains::critically_damped(49.0).kd, 14.0);
        assert_eq!(critical.null_damping, 1.0);
        let damped = critical.with_null_damping(2.5);
        assert_eq!(damped.null_damping, 2.5);
        assert_eq!(damped.kd_p, critical.kd_p);
    }

    #[test]
    fn test_joint_law_at_target_is_gravity_compensation() {
        let qs = initial_configuration();
        let model = model_at(&qs, &Joints::zeros(7), 1e-3);
        let target = JointTarget::at_rest(qs.clone());
        let torques = joint_space_torques(&model, &target, &JointGains::new(70.0, 7.0)).expect("ready");
        let gravity = model.gravity_term().expect("ready");
        assert!((torques - gravity).amax() < EPSILON);
    }

    #[test]
    fn test_joint_law_matches_inverse_dynamics() {
        let qs = initial_configuration();
        let qds = Joints::from_vec(vec![0.1, -0.2, 0.05, 0.3, -0.1, 0.2, 0.0]);
        let model = model_at(&qs, &qds, 1e-3);
        let gains = JointGains::new(70.0, 7.0);
        let target = JointTarget {
            positions: &qs + Joints::from_element(7, 0.01),
            velocities: Joints::zeros(7),
            accelerations: Joints::from_element(7, 0.5),
        };
        let torques = joint_space_torques(&model, &target, &gains).expect("ready");

        let accelerations = &target.accelerations - &qds * gains.kd + Joints::from_element(7, 0.01 * gains.kp);
        let expected = dynamics::inverse_dynamics(model.chain(), &qs, &qds, &accelerations,
                                                  &model.settings().gravity);
        assert!((torques - expected).amax() < 1e-8);
    }

    #[test]
    fn test_joint_law_errors() {
        let fresh = KinematicChainModel::new(seven_joint_arm(), ModelSettings::default());
        let target = JointTarget::at_rest(Joints::zeros(7));
        assert_eq!(joint_space_torques(&fresh, &target, &JointGains::new(1.0, 1.0)),
                   Err(ControlError::ModelNotReady));

        let model = model_at(&initial_configuration(), &Joints::zeros(7), 1e-3);
        let short = JointTarget::at_rest(Joints::zeros(5));
        assert_eq!(joint_space_torques(&model, &short, &JointGains::new(1.0, 1.0)),
                   Err(ControlError::DimensionMismatch { expected: 7, found: 5 }));
    }

    #[test]
    fn test_operational_law_at_rest_is_gravity_compensation() {
        let model = model_at(&initial_configuration(), &Joints::zeros(7), 1e-3);
        let target = CartesianTarget::at_rest(model.end_effector_pose().expect("ready"));
        let gains = CartesianGains::with_damping_ratio(70.0, 35.0, 0.4, 0.5);
        let torques = operational_space_torques(&model, &target, &gains).expect("ready");
        let gravity = model.gravity_term().expect("ready");
        assert!((torques - gravity).amax() < 1e-8);
    }

    #[test]
    fn test_operational_law_realizes_desired_acceleration() {
        let qs = initial_configuration();
        let qds = Joints::from_vec(vec![0.1, -0.1, 0.2, 0.1, -0.2, 0.1, 0.3]);
        let model = model_at(&qs, &qds, 0.0);

        // No pose or twist error, so the commanded end-effector acceleration is the feed-forward
        let twist = model.end_effector_twist().expect("ready");
        let accel = Twist::new(Vector3::new(0.2, -0.1, 0.3), Vector3::new(0.0, 0.1, -0.2));
        let target = CartesianTarget {
            pose: model.end_effector_pose().expect("ready"),
            twist,
            accel,
        };
        let gains = CartesianGains::critically_damped(70.0, 35.0);
        let torques = operational_space_torques(&model, &target, &gains).expect("ready");

        // Simulated response of the arm to these torques
        let qdds = dynamics::forward_dynamics(model.chain(), &qs, &qds, &torques, &model.settings().gravity)
            .expect("positive definite");
        let realized = model.jacobian().expect("ready") * qdds
            + Joints::from_column_slice(model.jacobian_dot_qdot().expect("ready").as_slice());
        let expected = accel.to_vector6();
        for row in 0..6 {
            assert!((realized[row] - expected[row]).abs() < 1e-6,
                    "row {}: realized {} expected {}", row, realized[row], expected[row]);
        }
    }

    #[test]
    fn test_joint_target_from_cartesian() {
        let qs = initial_configuration();
        let model = model_at(&qs, &Joints::zeros(7), 1e-4);
        let pose = model.end_effector_pose().expect("ready");
        let target = CartesianTarget {
            pose: pose * na::Isometry3::translation(0.0, 0.01, 0.0),
            twist: Twist::linear(Vector3::new(0.0, 0.05, 0.0)),
            accel: Twist::zero(),
        };
        let (joint_target, ik) = joint_target_from_cartesian(&model, &target).expect("ready");
        assert!(ik.converged);
        assert_eq!(joint_target.positions, ik.joints);

        // Desired joint velocities reproduce the desired twist
        let twist = model.jacobian().expect("ready") * &joint_target.velocities;
        assert!((twist[1] - 0.05).abs() < 1e-4);
        assert!(twist[0].abs() < 1e-4 && twist[2].abs() < 1e-4);
        // At rest with zero desired acceleration
        assert!(joint_target.accelerations.amax() < EPSILON);
    }

    #[test]
    fn test_controller_dispatch_is_deterministic() {
        let qs = initial_configuration();
        let model = model_at(&qs, &Joints::zeros(7), 1e-3);
        let target = CartesianTarget::at_rest(model.end_effector_pose().expect("ready"));

        let joint = MotionController::new(ControlLaw::JointSpace(JointGains::new(70.0, 7.0)));
        let first = joint.compute_torques(&model, &target).expect("ready");
        let second = joint.compute_torques(&model, &target).expect("ready");
        assert_eq!(first, second);
        assert!(first.ik.is_some());

        let cartesian = MotionController::new(ControlLaw::OperationalSpace(
            CartesianGains::critically_damped(70.0, 35.0)));
        let output = cartesian.compute_torques(&model, &target).expect("ready");
        assert!(output.ik.is_none());
        assert_eq!(output.torques.len(), 7);
    }
}
