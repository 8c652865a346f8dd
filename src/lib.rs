//! Model-based torque control of fixed-base serial manipulators
//!
//! The crate takes a serial kinematic chain (usually read from URDF), keeps its kinematic and
//! dynamic model at the latest measured joint state, generates a time-parameterized Cartesian
//! path for the end-effector and computes the joint torques that make the arm follow it.
//!
//! # Features
//!
//! - Kinematic chain of revolute and prismatic joints with link inertias. Fixed joints in the
//!   robot description are folded into the neighbouring moving links.
//! - Forward kinematics, geometric Jacobian and J̇·q̇ at the end-effector, optionally with a
//!   fixed end-effector transform past the chain tip.
//! - Recursive Newton-Euler inverse dynamics, from which the mass matrix, Coriolis and gravity
//!   torques are derived.
//! - Damped least squares inverse kinematics, seeded from the current joint state.
//! - Straight line and circular Cartesian paths with trapezoidal or cubic time scaling.
//! - Two control laws: inverse dynamics in joint space (Kp, Kd) tracking the inverse kinematics
//!   of the trajectory, and operational space control with separate position and orientation gains.
//! - Fixed-rate control loop driver, transport independent, with a simulated arm as reference
//!   backend.
//! - Reading the chain from URDF and the control configuration from YAML (feature
//!   `allow_filesystem`, on by default).
//!
//! ## Example
//!
//! ```
//! use nalgebra::{Isometry3, Matrix3, Vector3};
//! use rs_chain_control::chain::{ChainJoint, JointType, KinematicChain, LinkInertia};
//! use rs_chain_control::config::ControlConfig;
//! use rs_chain_control::controller::{ControlLaw, JointGains};
//! use rs_chain_control::driver::{ControlLoopDriver, TickOutcome};
//! use rs_chain_control::kinematic_traits::Joints;
//! use rs_chain_control::planner::VelocityProfile;
//! use rs_chain_control::simulation::{simulated_backend, SimulatedArm};
//!
//! // Arm of two links swinging in the vertical plane
//! let link = LinkInertia::new(1.0, Vector3::new(0.25, 0.0, 0.0), Matrix3::identity() * 0.005);
//! let joints = vec![
//!     ChainJoint::new("shoulder", JointType::Revolute, Isometry3::identity(), Vector3::y(), link).unwrap(),
//!     ChainJoint::new("elbow", JointType::Revolute, Isometry3::translation(0.5, 0.0, 0.0),
//!                     Vector3::y(), link).unwrap(),
//! ];
//! let chain = KinematicChain::new(joints, Isometry3::translation(0.5, 0.0, 0.0)).unwrap();
//!
//! // The default line ends at the start mirrored in y, for this arm the start itself.
//! // The controller then holds the arm against gravity.
//! let mut config = ControlConfig::default();
//! config.trajectory.duration = 0.5;
//! config.trajectory.profile = VelocityProfile::Cubic;
//! config.law = ControlLaw::JointSpace(JointGains::new(100.0, 20.0));
//! let initial = Joints::from_vec(vec![0.3, 0.6]);
//!
//! let mut driver = ControlLoopDriver::from_config(chain.clone(), &config, &initial).unwrap();
//! let arm = SimulatedArm::new(chain, initial.clone(), config.model.gravity, config.period()).unwrap();
//! let (mut source, mut sink, arm) = simulated_backend(arm);
//!
//! let mut ticks = 0;
//! while let TickOutcome::Commanded(_) = driver.tick(ticks as f64 * config.period(), &mut source, &mut sink).unwrap() {
//!     ticks += 1;
//! }
//! assert!(ticks > 200);
//! assert!((arm.borrow().positions() - initial).amax() < 1e-3);
//! ```

pub mod kinematic_traits;

pub mod control_error;
pub mod parameter_error;

pub mod chain;

pub mod dynamics;

pub mod tool;

pub mod jacobian;

pub mod inverse_kinematics;

pub mod robot_model;

pub mod planner;

pub mod controller;

pub mod driver;

pub mod simulation;

pub mod config;

#[cfg(feature = "allow_filesystem")]
pub mod config_from_file;

#[cfg(feature = "allow_filesystem")]
pub mod urdf;

#[path = "utils/utils.rs"]
pub mod utils;

#[cfg(test)]
mod tests;
