//! Kinematic and dynamic model of the manipulator at its current joint state.
//!
//! The model owns the chain, the end-effector attached after the chain tip and the latest
//! joint state. Every state dependent query is recomputed on each call from that state, and
//! fails with [`ControlError::ModelNotReady`] until the first successful [`KinematicChainModel::update`].
//!
//! ```
//! use nalgebra::{Isometry3, Vector3};
//! use rs_chain_control::chain::{ChainJoint, JointType, KinematicChain, LinkInertia};
//! use rs_chain_control::control_error::ControlError;
//! use rs_chain_control::kinematic_traits::Joints;
//! use rs_chain_control::robot_model::{KinematicChainModel, ModelSettings};
//!
//! let link = LinkInertia::new(1.0, Vector3::new(0.25, 0.0, 0.0), nalgebra::Matrix3::identity() * 0.01);
//! let joints = vec![
//!     ChainJoint::new("shoulder", JointType::Revolute, Isometry3::identity(), Vector3::z(), link).unwrap(),
//! ];
//! let chain = KinematicChain::new(joints, Isometry3::translation(0.5, 0.0, 0.0)).unwrap();
//! let mut model = KinematicChainModel::new(chain, ModelSettings::default());
//!
//! assert_eq!(model.end_effector_pose().err(), Some(ControlError::ModelNotReady));
//!
//! model.update(&Joints::from_vec(vec![0.0]), &Joints::from_vec(vec![0.0])).unwrap();
//! let pose = model.end_effector_pose().unwrap();
//! assert!((pose.translation.x - 0.5).abs() < 1e-12);
//! ```

extern crate nalgebra as na;

use std::sync::Arc;
use na::{DMatrix, Isometry3, Vector3, Vector6};
use tracing::warn;

use crate::chain::KinematicChain;
use crate::control_error::{check_len, ControlError};
use crate::dynamics::{self, STANDARD_GRAVITY};
use crate::inverse_kinematics::{self, IkSettings, IkSolution};
use crate::jacobian::Jacobian;
use crate::kinematic_traits::{Joints, Kinematics, Pose, Twist};
use crate::tool::Tool;
use crate::utils::{format_joints, is_valid};

/// Joint positions and velocities, both of length N.
#[derive(Debug, Clone, PartialEq)]
pub struct RobotState {
    pub positions: Joints,
    pub velocities: Joints,
}

/// Configuration-time constants of the model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelSettings {
    pub ik: IkSettings,
    /// Damping λ of the pseudo-inverse used for desired joint velocities.
    pub pinv_damping: f64,
    /// Gravity acceleration in the base frame.
    pub gravity: Vector3<f64>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        ModelSettings {
            ik: IkSettings::default(),
            pinv_damping: 1e-3,
            gravity: STANDARD_GRAVITY,
        }
    }
}

pub struct KinematicChainModel {
    chain: Arc<KinematicChain>,
    end_effector: Tool,
    state: Option<RobotState>,
    settings: ModelSettings,
}

impl KinematicChainModel {
    /// Creates the model with the identity end-effector and no state.
    pub fn new(chain: KinematicChain, settings: ModelSettings) -> Self {
        let chain = Arc::new(chain);
        let end_effector = Tool {
            robot: chain.clone(),
            tool: Isometry3::identity(),
        };
        KinematicChainModel { chain, end_effector, state: None, settings }
    }

    /// Number of actuated joints.
    pub fn dof(&self) -> usize {
        self.chain.dof()
    }

    pub fn chain(&self) -> &KinematicChain {
        &self.chain
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn state(&self) -> Option<&RobotState> {
        self.state.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_some()
    }

    /// Replaces the joint state. Both vectors are validated before anything is written,
    /// so on error the previous state stays. A state with NaN or infinite entries is
    /// rejected with [`ControlError::NonFiniteState`].
    pub fn update(&mut self, positions: &Joints, velocities: &Joints) -> Result<(), ControlError> {
        let n = self.dof();
        check_len(n, positions.len())?;
        check_len(n, velocities.len())?;
        if !is_valid(positions) || !is_valid(velocities) {
            warn!("Non-finite joint state rejected: q = {:?}, q̇ = {:?}",
                positions.as_slice(), velocities.as_slice());
            return Err(ControlError::NonFiniteState);
        }
        if !self.chain.within_limits(positions) {
            warn!("Joint positions outside limits: {}", format_joints(positions));
        }
        self.state = Some(RobotState {
            positions: positions.clone(),
            velocities: velocities.clone(),
        });
        Ok(())
    }

    /// Attaches the fixed end-effector transform after the chain tip, replacing any previous one.
    pub fn attach_end_effector(&mut self, offset: Isometry3<f64>) {
        self.end_effector.tool = offset;
    }

    pub fn end_effector_offset(&self) -> &Isometry3<f64> {
        &self.end_effector.tool
    }

    /// The chain with the end-effector attached.
    pub fn kinematics(&self) -> &Tool {
        &self.end_effector
    }

    fn ready(&self) -> Result<&RobotState, ControlError> {
        self.state.as_ref().ok_or(ControlError::ModelNotReady)
    }

    /// Pose of the end-effector in the base frame at the current state.
    pub fn end_effector_pose(&self) -> Result<Pose, ControlError> {
        let state = self.ready()?;
        Ok(self.end_effector.forward(&state.positions))
    }

    /// End-effector twist J·q̇ at the current state.
    pub fn end_effector_twist(&self) -> Result<Twist, ControlError> {
        let state = self.ready()?;
        let twist = self.end_effector.jacobian(&state.positions) * &state.velocities;
        Ok(Twist::new(
            Vector3::new(twist[0], twist[1], twist[2]),
            Vector3::new(twist[3], twist[4], twist[5]),
        ))
    }

    /// 6 x N geometric Jacobian at the end-effector, base frame, linear rows over angular.
    pub fn jacobian(&self) -> Result<DMatrix<f64>, ControlError> {
        let state = self.ready()?;
        Ok(self.end_effector.jacobian(&state.positions))
    }

    /// J̇·q̇, the end-effector acceleration caused by joint velocities alone.
    pub fn jacobian_dot_qdot(&self) -> Result<Vector6<f64>, ControlError> {
        let state = self.ready()?;
        Ok(self.end_effector.bias_acceleration(&state.positions, &state.velocities))
    }

    /// Joint positions placing the end-effector at `target`, iterating from `seed`.
    /// Non-convergence is reported in the solution, not as an error.
    pub fn inverse_kinematics(&self, seed: &Joints, target: &Pose) -> Result<IkSolution, ControlError> {
        inverse_kinematics::solve(&self.end_effector, seed, target, &self.settings.ik)
    }

    /// Desired joint velocities q̇ = J⁺ · twist with the damped pseudo-inverse.
    pub fn desired_joint_velocity(&self, twist: &Twist, jacobian: &DMatrix<f64>) -> Result<Joints, ControlError> {
        check_len(self.dof(), jacobian.ncols())?;
        let jacobian = Jacobian::from_matrix(jacobian.clone(), self.settings.pinv_damping)?;
        Ok(jacobian.velocities(twist))
    }

    /// Joint-space mass matrix M(q), symmetric positive definite.
    pub fn mass_matrix(&self) -> Result<DMatrix<f64>, ControlError> {
        let state = self.ready()?;
        Ok(dynamics::mass_matrix(&self.chain, &state.positions))
    }

    /// Coriolis and centrifugal torques C(q, q̇).
    pub fn coriolis_term(&self) -> Result<Joints, ControlError> {
        let state = self.ready()?;
        Ok(dynamics::coriolis(&self.chain, &state.positions, &state.velocities))
    }

    /// Gravity torques G(q).
    pub fn gravity_term(&self) -> Result<Joints, ControlError> {
        let state = self.ready()?;
        Ok(dynamics::gravity(&self.chain, &state.positions, &self.settings.gravity))
    }
}
