//! Serial kinematic chain of a fixed-base manipulator.
//!
//! The chain is an ordered list of actuated joints from the base to the last moving link,
//! followed by the fixed tip transform. Every joint carries the fixed transform from the
//! previous link frame to its own frame (`origin`), the joint axis in its own frame and the
//! inertial parameters of the link it moves. Links attached through fixed joints are merged
//! into their moving parent when the chain is assembled (see `urdf.rs`).
//!
//! All joint-space quantities are `Joints` vectors of length [`KinematicChain::dof`], which
//! never changes after construction.

extern crate nalgebra as na;

use na::{DMatrix, Isometry3, Matrix3, Point3, Translation3, Unit, UnitQuaternion, Vector3, Vector6};
use crate::kinematic_traits::{Joints, Kinematics, Pose};
use crate::parameter_error::ParameterError;

/// How the joint moves the child link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointType {
    /// Rotation about the joint axis (radians).
    Revolute,
    /// Translation along the joint axis (meters).
    Prismatic,
}

/// Lower and upper position limit of the joint (radians or meters).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointLimits {
    pub lower: f64,
    pub upper: f64,
}

impl JointLimits {
    pub fn contains(&self, q: f64) -> bool {
        q >= self.lower && q <= self.upper
    }
}

/// Inertial parameters of a rigid link, expressed in the link frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkInertia {
    /// Mass in kilograms.
    pub mass: f64,
    /// Centre of mass.
    pub com: Vector3<f64>,
    /// Rotational inertia about the centre of mass, kg·m².
    pub inertia: Matrix3<f64>,
}

impl LinkInertia {
    pub fn new(mass: f64, com: Vector3<f64>, inertia: Matrix3<f64>) -> Self {
        LinkInertia { mass, com, inertia }
    }

    /// Massless link.
    pub fn zero() -> Self {
        LinkInertia { mass: 0.0, com: Vector3::zeros(), inertia: Matrix3::zeros() }
    }

    /// Expresses this inertia in the frame where `frame` is the pose of this link's frame.
    pub fn transformed(&self, frame: &Isometry3<f64>) -> LinkInertia {
        let rotation = frame.rotation.to_rotation_matrix();
        let r = rotation.matrix();
        LinkInertia {
            mass: self.mass,
            com: frame.transform_point(&Point3::from(self.com)).coords,
            inertia: r * self.inertia * r.transpose(),
        }
    }

    /// Combines two bodies rigidly attached to each other. Both must be expressed in the same
    /// frame. The result is about the combined centre of mass (parallel axis theorem).
    pub fn merged(&self, other: &LinkInertia) -> LinkInertia {
        let mass = self.mass + other.mass;
        if mass <= 0.0 {
            return LinkInertia {
                mass: 0.0,
                com: Vector3::zeros(),
                inertia: self.inertia + other.inertia,
            };
        }
        let com = (self.com * self.mass + other.com * other.mass) / mass;
        let shifted = |body: &LinkInertia| {
            let d = body.com - com;
            body.inertia + (Matrix3::identity() * d.norm_squared() - d * d.transpose()) * body.mass
        };
        LinkInertia { mass, com, inertia: shifted(self) + shifted(other) }
    }
}

/// A single actuated joint together with the link it moves.
#[derive(Debug, Clone)]
pub struct ChainJoint {
    pub name: String,
    pub joint_type: JointType,
    /// Fixed transform from the previous link frame to this joint frame.
    pub origin: Isometry3<f64>,
    /// Joint axis in the joint frame.
    pub axis: Unit<Vector3<f64>>,
    /// Position limits, None for continuous joints.
    pub limits: Option<JointLimits>,
    /// Inertia of the child link in the joint frame.
    pub link: LinkInertia,
}

impl ChainJoint {
    /// Creates the joint, failing if the axis cannot be normalized.
    pub fn new(
        name: &str,
        joint_type: JointType,
        origin: Isometry3<f64>,
        axis: Vector3<f64>,
        link: LinkInertia,
    ) -> Result<Self, ParameterError> {
        let axis = Unit::try_new(axis, 1e-12).ok_or_else(|| {
            ParameterError::ChainConfigurationError(format!("Joint {} has zero length axis", name))
        })?;
        Ok(ChainJoint {
            name: name.to_string(),
            joint_type,
            origin,
            axis,
            limits: None,
            link,
        })
    }

    pub fn with_limits(mut self, lower: f64, upper: f64) -> Self {
        self.limits = Some(JointLimits { lower, upper });
        self
    }

    /// Motion of the joint frame for the given joint position.
    fn motion(&self, q: f64) -> Isometry3<f64> {
        match self.joint_type {
            JointType::Revolute => Isometry3::from_parts(
                Translation3::identity(),
                UnitQuaternion::from_axis_angle(&self.axis, q),
            ),
            JointType::Prismatic => Isometry3::from_parts(
                Translation3::from(self.axis.into_inner() * q),
                UnitQuaternion::identity(),
            ),
        }
    }
}

/// Ordered chain of actuated joints from the base to the tip.
#[derive(Debug, Clone)]
pub struct KinematicChain {
    joints: Vec<ChainJoint>,

    /// Fixed transform from the last link frame to the tip of the chain.
    tip: Isometry3<f64>,
}

/// Motion state of one link, all vectors in the base frame.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LinkMotion {
    /// Link frame after the joint motion.
    pub frame: Isometry3<f64>,
    /// Joint axis.
    pub axis: Vector3<f64>,
    pub omega: Vector3<f64>,
    pub alpha: Vector3<f64>,
    /// Classical acceleration of the link frame origin.
    pub accel: Vector3<f64>,
}

impl KinematicChain {
    pub fn new(joints: Vec<ChainJoint>, tip: Isometry3<f64>) -> Result<Self, ParameterError> {
        if joints.is_empty() {
            return Err(ParameterError::ChainConfigurationError(
                "Chain has no actuated joints".to_string()));
        }
        Ok(KinematicChain { joints, tip })
    }

    pub fn joints(&self) -> &[ChainJoint] {
        &self.joints
    }

    pub fn tip(&self) -> &Isometry3<f64> {
        &self.tip
    }

    pub fn joint_names(&self) -> Vec<&str> {
        self.joints.iter().map(|j| j.name.as_str()).collect()
    }

    /// Checks joint positions against the limits. Joints without limits always pass.
    pub fn within_limits(&self, qs: &Joints) -> bool {
        self.joints.iter().zip(qs.iter())
            .all(|(joint, &q)| joint.limits.map_or(true, |l| l.contains(q)))
    }

    /// Link frames after the joint motion, one per joint.
    ///
    /// # Panics
    /// If `qs` does not have [`Kinematics::dof`] entries.
    pub fn link_frames(&self, qs: &Joints) -> Vec<Isometry3<f64>> {
        assert_joint_count(self.dof(), qs, "positions");
        let mut frame = Isometry3::identity();
        self.joints.iter().zip(qs.iter())
            .map(|(joint, &q)| {
                frame = frame * joint.origin * joint.motion(q);
                frame
            })
            .collect()
    }

    /// Forward recursion of link velocities and accelerations. The base is accelerated by
    /// `base_accel`, which is how gravity enters the inverse dynamics.
    pub(crate) fn propagate(
        &self,
        qs: &Joints,
        qds: &Joints,
        qdds: &Joints,
        base_accel: &Vector3<f64>,
    ) -> Vec<LinkMotion> {
        let n = self.dof();
        assert_joint_count(n, qs, "positions");
        assert_joint_count(n, qds, "velocities");
        assert_joint_count(n, qdds, "accelerations");
        let mut omega = Vector3::zeros();
        let mut alpha = Vector3::zeros();
        let mut accel = *base_accel;
        let mut previous = Vector3::zeros();
        let mut frame = Isometry3::identity();
        let mut motions = Vec::with_capacity(self.joints.len());

        for (i, joint) in self.joints.iter().enumerate() {
            frame = frame * joint.origin * joint.motion(qs[i]);
            let position = frame.translation.vector;
            let axis = frame.rotation * joint.axis.into_inner();
            let r = position - previous;

            // Point of the parent link that coincides with this frame origin
            accel += alpha.cross(&r) + omega.cross(&omega.cross(&r));

            match joint.joint_type {
                JointType::Revolute => {
                    let spin = axis * qds[i];
                    alpha += axis * qdds[i] + omega.cross(&spin);
                    omega += spin;
                }
                JointType::Prismatic => {
                    accel += axis * qdds[i] + omega.cross(&(axis * qds[i])) * 2.0;
                }
            }

            motions.push(LinkMotion { frame, axis, omega, alpha, accel });
            previous = position;
        }
        motions
    }
}

fn assert_joint_count(dof: usize, values: &Joints, what: &str) {
    assert_eq!(values.len(), dof, "Chain of {} joints called with {} joint {}", dof, values.len(), what);
}

impl Kinematics for KinematicChain {
    fn dof(&self) -> usize {
        self.joints.len()
    }

    fn forward(&self, qs: &Joints) -> Pose {
        let frames = self.link_frames(qs);
        frames[frames.len() - 1] * self.tip
    }

    fn jacobian(&self, qs: &Joints) -> DMatrix<f64> {
        let n = self.dof();
        let frames = self.link_frames(qs);
        let end = (frames[n - 1] * self.tip).translation.vector;
        let mut jacobian = DMatrix::zeros(6, n);

        for (i, (joint, frame)) in self.joints.iter().zip(frames.iter()).enumerate() {
            let axis = frame.rotation * joint.axis.into_inner();
            let (linear, angular) = match joint.joint_type {
                JointType::Revolute => (axis.cross(&(end - frame.translation.vector)), axis),
                JointType::Prismatic => (axis, Vector3::zeros()),
            };
            jacobian.fixed_view_mut::<3, 1>(0, i).copy_from(&linear);
            jacobian.fixed_view_mut::<3, 1>(3, i).copy_from(&angular);
        }
        jacobian
    }

    fn bias_acceleration(&self, qs: &Joints, qds: &Joints) -> Vector6<f64> {
        let n = self.dof();
        let motions = self.propagate(qs, qds, &Joints::zeros(n), &Vector3::zeros());
        let last = &motions[n - 1];
        let r = (last.frame * self.tip).translation.vector - last.frame.translation.vector;
        let linear = last.accel + last.alpha.cross(&r) + last.omega.cross(&last.omega.cross(&r));
        Vector6::new(
            linear.x, linear.y, linear.z,
            last.alpha.x, last.alpha.y, last.alpha.z,
        )
    }
}
