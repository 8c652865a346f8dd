//! In-process simulated arm, the reference backend for the control loop.
//!
//! The arm integrates the forward dynamics q̈ = M⁻¹(τ − C − G) with semi-implicit Euler, one
//! fixed step for every published torque command. [`simulated_backend`] splits it into a
//! state source and a command sink sharing the same arm, as a real transport would.

extern crate nalgebra as na;

use std::cell::RefCell;
use std::rc::Rc;
use anyhow::Result;
use na::Vector3;
use tracing::warn;

use crate::chain::KinematicChain;
use crate::control_error::{check_len, ControlError};
use crate::driver::{CommandSink, JointStateSample, StateSource};
use crate::dynamics;
use crate::kinematic_traits::{Joints, Kinematics};

pub struct SimulatedArm {
    chain: KinematicChain,
    positions: Joints,
    velocities: Joints,
    gravity: Vector3<f64>,
    /// Integration step, seconds.
    dt: f64,
    /// Viscous friction coefficient of every joint, Nm·s/rad.
    friction: f64,
    time: f64,
}

impl SimulatedArm {
    /// Arm at rest at `initial` joint positions.
    pub fn new(
        chain: KinematicChain,
        initial: Joints,
        gravity: Vector3<f64>,
        dt: f64,
    ) -> Result<Self, ControlError> {
        check_len(chain.dof(), initial.len())?;
        let n = initial.len();
        Ok(SimulatedArm {
            chain,
            positions: initial,
            velocities: Joints::zeros(n),
            gravity,
            dt,
            friction: 0.0,
            time: 0.0,
        })
    }

    pub fn with_friction(mut self, friction: f64) -> Self {
        self.friction = friction;
        self
    }

    pub fn chain(&self) -> &KinematicChain {
        &self.chain
    }

    pub fn positions(&self) -> &Joints {
        &self.positions
    }

    pub fn velocities(&self) -> &Joints {
        &self.velocities
    }

    /// Simulated time, advanced by every step.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn state(&self) -> JointStateSample {
        JointStateSample {
            positions: self.positions.clone(),
            velocities: self.velocities.clone(),
        }
    }

    /// Applies `torques` for one integration step.
    pub fn step(&mut self, torques: &Joints) -> Result<(), ControlError> {
        check_len(self.chain.dof(), torques.len())?;
        let applied = torques - &self.velocities * self.friction;
        let accelerations = dynamics::forward_dynamics(
            &self.chain, &self.positions, &self.velocities, &applied, &self.gravity)
            .unwrap_or_else(|| {
                warn!("Mass matrix not positive definite at {:?}", self.positions.as_slice());
                Joints::zeros(self.chain.dof())
            });
        self.velocities += accelerations * self.dt;
        self.positions += &self.velocities * self.dt;
        self.time += self.dt;
        Ok(())
    }
}

/// Reads the state of the shared simulated arm.
pub struct SimulatedStateSource {
    arm: Rc<RefCell<SimulatedArm>>,
}

/// Steps the shared simulated arm with every published command.
pub struct SimulatedCommandSink {
    arm: Rc<RefCell<SimulatedArm>>,
}

impl StateSource for SimulatedStateSource {
    fn latest(&mut self) -> Option<JointStateSample> {
        Some(self.arm.borrow().state())
    }
}

impl CommandSink for SimulatedCommandSink {
    fn publish(&mut self, torques: &Joints) -> Result<()> {
        self.arm.borrow_mut().step(torques)?;
        Ok(())
    }
}

/// Source and sink backed by the same arm. The returned handle gives access to the arm for
/// inspection.
pub fn simulated_backend(
    arm: SimulatedArm,
) -> (SimulatedStateSource, SimulatedCommandSink, Rc<RefCell<SimulatedArm>>) {
    let arm = Rc::new(RefCell::new(arm));
    (
        SimulatedStateSource { arm: arm.clone() },
        SimulatedCommandSink { arm: arm.clone() },
        arm,
    )
}
