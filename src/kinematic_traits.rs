//! Value types shared by the model, planner and controller, and the `Kinematics` trait.

extern crate nalgebra as na;

use na::{DMatrix, DVector, Isometry3, Vector3, Vector6};

/// Pose is used for the pose of the end-effector. It contains both Cartesian position
/// and rotation quaternion.
/// ```
/// extern crate nalgebra as na;
/// use na::{Isometry3, Translation3, UnitQuaternion};
///
/// type Pose = Isometry3<f64>;
///
/// let translation = Translation3::new(0.4, 0.0, 0.6);
/// let rotation = UnitQuaternion::identity();
/// let pose = Pose::from_parts(translation, rotation);
/// ```
pub type Pose = Isometry3<f64>;

/// Joint-space vector (positions, velocities, accelerations or torques). Its length is always
/// the number of actuated joints of the chain it belongs to.
pub type Joints = DVector<f64>;

/// Linear and angular velocity of a frame, both expressed in the base frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Twist {
    pub linear: Vector3<f64>,
    pub angular: Vector3<f64>,
}

/// Linear and angular acceleration, same layout as the twist.
pub type Accel = Twist;

/// Force and torque acting at the end-effector, same layout as the twist.
pub type Wrench = Twist;

impl Twist {
    pub fn new(linear: Vector3<f64>, angular: Vector3<f64>) -> Self {
        Twist { linear, angular }
    }

    pub fn zero() -> Self {
        Twist { linear: Vector3::zeros(), angular: Vector3::zeros() }
    }

    /// Linear part only, angular part zero.
    pub fn linear(linear: Vector3<f64>) -> Self {
        Twist { linear, angular: Vector3::zeros() }
    }

    /// Stacks linear over angular.
    pub fn to_vector6(&self) -> Vector6<f64> {
        Vector6::new(
            self.linear.x, self.linear.y, self.linear.z,
            self.angular.x, self.angular.y, self.angular.z,
        )
    }

    pub fn from_vector6(v: &Vector6<f64>) -> Self {
        Twist {
            linear: Vector3::new(v[0], v[1], v[2]),
            angular: Vector3::new(v[3], v[4], v[5]),
        }
    }
}

/// Desired joint positions, velocities and accelerations for one control tick.
#[derive(Debug, Clone, PartialEq)]
pub struct JointTarget {
    pub positions: Joints,
    pub velocities: Joints,
    pub accelerations: Joints,
}

impl JointTarget {
    /// Target to hold the given position at rest.
    pub fn at_rest(positions: Joints) -> Self {
        let n = positions.len();
        JointTarget {
            positions,
            velocities: Joints::zeros(n),
            accelerations: Joints::zeros(n),
        }
    }
}

/// Desired end-effector pose, twist and acceleration for one control tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CartesianTarget {
    pub pose: Pose,
    pub twist: Twist,
    pub accel: Accel,
}

impl CartesianTarget {
    pub fn at_rest(pose: Pose) -> Self {
        CartesianTarget { pose, twist: Twist::zero(), accel: Twist::zero() }
    }
}

/// Kinematic model of a serial manipulator with an arbitrary number of joints.
///
/// Joint vectors passed to these methods must have exactly [`Kinematics::dof`] entries.
/// The methods do not return errors and implementations may panic otherwise; callers with
/// untrusted input check the length first, as the robot model does.
pub trait Kinematics {
    /// Number of actuated joints.
    fn dof(&self) -> usize;

    /// Forward kinematics, the pose of the end of the chain in the base frame.
    fn forward(&self, qs: &Joints) -> Pose;

    /// Geometric Jacobian (6 x dof), linear rows stacked over angular rows. The reference
    /// point is the end of the chain, all columns are expressed in the base frame.
    fn jacobian(&self, qs: &Joints) -> DMatrix<f64>;

    /// The product of the Jacobian time derivative and the joint velocities, J̇·q̇. This is the
    /// classical acceleration (linear over angular) of the end of the chain when no joint
    /// accelerates.
    fn bias_acceleration(&self, qs: &Joints, qds: &Joints) -> Vector6<f64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twist_vector_layout() {
        let twist = Twist::new(Vector3::new(1.0, 2.0, 3.0), Vector3::new(4.0, 5.0, 6.0));
        let v = twist.to_vector6();
        assert_eq!(v, Vector6::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0));
        assert_eq!(Twist::from_vector6(&v), twist);
    }

    #[test]
    fn test_joint_target_at_rest() {
        let target = JointTarget::at_rest(Joints::from_vec(vec![0.1, 0.2, 0.3]));
        assert_eq!(target.velocities.len(), 3);
        assert!(target.velocities.iter().all(|&v| v == 0.0));
        assert!(target.accelerations.iter().all(|&a| a == 0.0));
    }
}
