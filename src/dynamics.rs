//! Rigid-body inverse dynamics of the serial chain (recursive Newton-Euler).
//!
//! The equation of motion of the chain is
//! ```text
//! τ = M(q)·q̈ + C(q, q̇) + G(q)
//! ```
//! All three terms are evaluated with the same recursion: the mass matrix column by column
//! with unit accelerations, the Coriolis/centrifugal vector with velocities only and the
//! gravity vector with the base accelerated against gravity.
//!
//! Joint vectors must have one entry per joint of the chain, these functions panic otherwise.
//! [`crate::robot_model::KinematicChainModel`] validates lengths before calling them.

extern crate nalgebra as na;

use na::{DMatrix, Vector3};
use crate::chain::{JointType, KinematicChain};
use crate::kinematic_traits::{Joints, Kinematics};

/// Standard gravity acting along -z of the base frame.
pub const STANDARD_GRAVITY: Vector3<f64> = Vector3::new(0.0, 0.0, -9.81);

/// Joint torques (forces for prismatic joints) required to produce accelerations `qdds`
/// at positions `qs` and velocities `qds` under `gravity`.
pub fn inverse_dynamics(
    chain: &KinematicChain,
    qs: &Joints,
    qds: &Joints,
    qdds: &Joints,
    gravity: &Vector3<f64>,
) -> Joints {
    let n = chain.dof();
    let motions = chain.propagate(qs, qds, qdds, &(-gravity));
    let mut torques = Joints::zeros(n);

    let mut force_next = Vector3::zeros();
    let mut moment_next = Vector3::zeros();
    let mut origin_next = Vector3::zeros();

    for i in (0..n).rev() {
        let joint = &chain.joints()[i];
        let motion = &motions[i];
        let link = joint.link.transformed(&motion.frame);
        let origin = motion.frame.translation.vector;
        let r_com = link.com - origin;

        let com_accel = motion.accel
            + motion.alpha.cross(&r_com)
            + motion.omega.cross(&motion.omega.cross(&r_com));
        let force = com_accel * link.mass;
        let moment = link.inertia * motion.alpha
            + motion.omega.cross(&(link.inertia * motion.omega));

        // Wrench transmitted through joint i, moments about its frame origin
        let f = force + force_next;
        let m = moment + r_com.cross(&force) + moment_next
            + (origin_next - origin).cross(&force_next);

        torques[i] = match joint.joint_type {
            JointType::Revolute => motion.axis.dot(&m),
            JointType::Prismatic => motion.axis.dot(&f),
        };

        force_next = f;
        moment_next = m;
        origin_next = origin;
    }
    torques
}

/// Joint-space mass matrix M(q), symmetric.
pub fn mass_matrix(chain: &KinematicChain, qs: &Joints) -> DMatrix<f64> {
    let n = chain.dof();
    let zero = Joints::zeros(n);
    let mut mass = DMatrix::zeros(n, n);
    for j in 0..n {
        let mut unit = Joints::zeros(n);
        unit[j] = 1.0;
        let column = inverse_dynamics(chain, qs, &zero, &unit, &Vector3::zeros());
        mass.set_column(j, &column);
    }
    // Remove round-off asymmetry
    (&mass + mass.transpose()) * 0.5
}

/// Coriolis and centrifugal torques C(q, q̇).
pub fn coriolis(chain: &KinematicChain, qs: &Joints, qds: &Joints) -> Joints {
    let zero = Joints::zeros(chain.dof());
    inverse_dynamics(chain, qs, qds, &zero, &Vector3::zeros())
}

/// Gravity torques G(q).
pub fn gravity(chain: &KinematicChain, qs: &Joints, gravity: &Vector3<f64>) -> Joints {
    let zero = Joints::zeros(chain.dof());
    inverse_dynamics(chain, qs, &zero, &zero, gravity)
}

/// Forward dynamics, q̈ = M⁻¹(τ − C − G). Returns None if the mass matrix is not positive
/// definite.
pub fn forward_dynamics(
    chain: &KinematicChain,
    qs: &Joints,
    qds: &Joints,
    torques: &Joints,
    gravity_vector: &Vector3<f64>,
) -> Option<Joints> {
    let bias = inverse_dynamics(chain, qs, qds, &Joints::zeros(chain.dof()), gravity_vector);
    let cholesky = mass_matrix(chain, qs).cholesky()?;
    Some(cholesky.solve(&(torques - bias)))
}
