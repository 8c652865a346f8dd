//! Provides the fixed end-effector (tool) for the chain.
//! The Tool takes arbitrary implementation of Kinematics and is such implementation itself,
//! planning and controlling for the tool center point (TCP) rather than the chain tip:
//! ```
//! use std::sync::Arc;
//! use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
//! use rs_chain_control::chain::{ChainJoint, JointType, KinematicChain, LinkInertia};
//! use rs_chain_control::kinematic_traits::{Joints, Kinematics, Pose};
//! use rs_chain_control::tool::Tool;
//!
//! let joints = vec![
//!     ChainJoint::new("joint1", JointType::Revolute, Isometry3::identity(),
//!                     Vector3::z(), LinkInertia::zero()).unwrap(),
//! ];
//! let chain = KinematicChain::new(joints, Isometry3::translation(0.5, 0.0, 0.0)).unwrap();
//!
//! // Tool extends 0.1 meter further along x, envisioning something like a pointer
//! let pointer = Tool {
//!   robot: Arc::new(chain),
//!   tool: Isometry3::from_parts(Translation3::new(0.1, 0.0, 0.0), UnitQuaternion::identity()),
//! };
//!
//! let tcp_pose: Pose = pointer.forward(&Joints::from_vec(vec![0.0]));
//! assert!((tcp_pose.translation.x - 0.6).abs() < 1e-12);
//! ```

extern crate nalgebra as na;

use std::sync::Arc;
use na::{DMatrix, Isometry3, Matrix3, Vector3, Vector6};
use crate::kinematic_traits::{Joints, Kinematics, Pose};

/// Defines the fixed tool that can be attached to the last link of the chain.
/// The tool moves with the robot, providing additional translation and, if needed,
/// rotation.
#[derive(Clone)]
pub struct Tool {
    pub robot: Arc<dyn Kinematics>,  // The robot

    /// Transformation from the robot's tip to the tool's TCP.
    pub tool: Isometry3<f64>,
}

impl Tool {
    /// Vector from the chain tip to the TCP, in the base frame.
    fn lever(&self, tip: &Pose) -> Vector3<f64> {
        tip.rotation * self.tool.translation.vector
    }
}

/// Cross product matrix, skew(a)·b = a × b
fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v.z, v.y,
        v.z, 0.0, -v.x,
        -v.y, v.x, 0.0,
    )
}

impl Kinematics for Tool {
    fn dof(&self) -> usize {
        self.robot.dof()
    }

    fn forward(&self, qs: &Joints) -> Pose {
        // Calculate the pose of the tip using the robot's kinematics
        let tip = self.robot.forward(qs);
        tip * self.tool
    }

    fn jacobian(&self, qs: &Joints) -> DMatrix<f64> {
        let r = self.lever(&self.robot.forward(qs));
        let mut jacobian = self.robot.jacobian(qs);
        // v_tcp = v_tip + ω × r = v_tip − skew(r)·ω
        let shift = -skew(&r) * jacobian.rows(3, 3);
        let mut linear = jacobian.rows_mut(0, 3);
        linear += shift;
        jacobian
    }

    fn bias_acceleration(&self, qs: &Joints, qds: &Joints) -> Vector6<f64> {
        let r = self.lever(&self.robot.forward(qs));
        let omega: Vector3<f64> = (self.robot.jacobian(qs).rows(3, 3) * qds).fixed_rows::<3>(0).into();
        let tip = self.robot.bias_acceleration(qs, qds);
        let alpha = Vector3::new(tip[3], tip[4], tip[5]);
        let linear = Vector3::new(tip[0], tip[1], tip[2])
            + alpha.cross(&r) + omega.cross(&omega.cross(&r));
        Vector6::new(linear.x, linear.y, linear.z, alpha.x, alpha.y, alpha.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::test_utils::{finite_difference_jacobian, seven_joint_arm};
    use na::{Translation3, UnitQuaternion};

    fn tool_on_arm() -> Tool {
        Tool {
            robot: Arc::new(seven_joint_arm()),
            tool: Isometry3::from_parts(
                Translation3::new(0.02, -0.03, 0.15),
                UnitQuaternion::from_euler_angles(0.2, -0.1, 0.3),
            ),
        }
    }

    #[test]
    fn test_tool_forward() {
        let tool = tool_on_arm();
        let qs = Joints::from_vec(vec![0.1, 0.4, -0.2, -1.0, 0.3, 0.6, 0.2]);
        let expected = tool.robot.forward(&qs) * tool.tool;
        let actual = tool.forward(&qs);
        assert!((expected.translation.vector - actual.translation.vector).norm() < 1e-12);
        assert!(expected.rotation.angle_to(&actual.rotation) < 1e-12);
    }

    #[test]
    fn test_tool_jacobian_matches_finite_differences() {
        let tool = tool_on_arm();
        let qs = Joints::from_vec(vec![0.3, 0.5, -0.1, -1.4, 0.2, 0.9, -0.6]);
        let analytic = tool.jacobian(&qs);
        let numeric = finite_difference_jacobian(&tool, &qs, 1e-7);
        assert!((analytic - numeric).amax() < 1e-5);
    }

    #[test]
    fn test_tool_bias_acceleration_matches_finite_differences() {
        let tool = tool_on_arm();
        let qs = Joints::from_vec(vec![0.2, 0.6, -0.3, -1.0, 0.4, 0.7, 0.1]);
        let qds = Joints::from_vec(vec![0.5, -0.3, 0.2, 0.4, -0.6, 0.3, 0.8]);
        let h = 1e-6;
        let ahead = tool.jacobian(&(&qs + &qds * h)) * &qds;
        let behind = tool.jacobian(&(&qs - &qds * h)) * &qds;
        let numeric = (ahead - behind) / (2.0 * h);
        let analytic = tool.bias_acceleration(&qs, &qds);
        for row in 0..6 {
            assert!((analytic[row] - numeric[row]).abs() < 1e-5,
                    "row {}: analytic {} numeric {}", row, analytic[row], numeric[row]);
        }
    }
}
