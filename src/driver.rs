//! Fixed-rate control loop: one synchronous tick takes the latest joint state, samples the
//! trajectory, computes the torques and publishes them.
//!
//! The transport is abstracted by [`StateSource`] and [`CommandSink`]. Scheduling (when to
//! call [`ControlLoopDriver::tick`]) belongs to the host, see `main.rs` for a simple one.

extern crate nalgebra as na;

use anyhow::Result;
use na::{UnitQuaternion, Vector3};
use tracing::{debug, info, warn};

use crate::chain::KinematicChain;
use crate::config::ControlConfig;
use crate::control_error::{check_len, ControlError};
use crate::controller::MotionController;
use crate::kinematic_traits::{Joints, Kinematics};
use crate::planner::{PathProgress, TrajectoryPlanner};
use crate::robot_model::KinematicChainModel;

/// Joint positions and velocities as delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct JointStateSample {
    pub positions: Joints,
    pub velocities: Joints,
}

/// Delivers the most recent joint state without blocking.
pub trait StateSource {
    /// Latest sample not yet consumed, None if nothing new arrived since the last call.
    fn latest(&mut self) -> Option<JointStateSample>;
}

/// Accepts one torque vector per tick without blocking.
pub trait CommandSink {
    fn publish(&mut self, torques: &Joints) -> Result<()>;
}

/// What to command when a tick is aborted by a control error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPolicy {
    /// Repeat the last successfully computed torques (zero if none yet).
    HoldLast,
    /// Command zero torque on all joints.
    ZeroTorque,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverSettings {
    /// Seconds to hold the start of the trajectory before moving.
    pub settle_time: f64,
    pub fault_policy: FaultPolicy,
}

impl Default for DriverSettings {
    fn default() -> Self {
        DriverSettings { settle_time: 0.0, fault_policy: FaultPolicy::HoldLast }
    }
}

/// Monitoring data of one commanded tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Time since the start of the loop.
    pub time: f64,
    pub torques: Joints,
    /// Desired minus actual end-effector position.
    pub position_error: Vector3<f64>,
    pub progress: PathProgress,
    /// Residual of the inverse kinematics, for the joint-space law only.
    pub ik_residual: Option<f64>,
    /// False if the sink refused the command.
    pub published: bool,
}

impl TickReport {
    /// Position error in centimeters, as usually plotted.
    pub fn position_error_cm(&self) -> Vector3<f64> {
        self.position_error * 100.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No joint state has ever been received, nothing was commanded.
    Skipped,
    /// Torques were computed and handed to the sink.
    Commanded(TickReport),
    /// The segment is complete, nothing was commanded.
    Finished,
}

pub struct ControlLoopDriver {
    model: KinematicChainModel,
    planner: TrajectoryPlanner,
    controller: MotionController,
    settings: DriverSettings,

    /// End-effector orientation captured at the first ready tick, held along the segment.
    orientation: Option<UnitQuaternion<f64>>,
    last_torques: Option<Joints>,
    finished: bool,
}

impl ControlLoopDriver {
    pub fn new(
        model: KinematicChainModel,
        planner: TrajectoryPlanner,
        controller: MotionController,
        settings: DriverSettings,
    ) -> Self {
        ControlLoopDriver {
            model,
            planner,
            controller,
            settings,
            orientation: None,
            last_torques: None,
            finished: false,
        }
    }

    /// Assembles the driver as configured. The trajectory starts at the end-effector position
    /// for joint positions `joints`, usually the first measured state.
    pub fn from_config(
        chain: KinematicChain,
        config: &ControlConfig,
        joints: &Joints,
    ) -> Result<Self, ControlError> {
        check_len(chain.dof(), joints.len())?;
        let mut model = KinematicChainModel::new(chain, config.model);
        model.attach_end_effector(config.end_effector);
        let start = model.kinematics().forward(joints).translation.vector;
        let planner = config.planner(start)?;
        info!("Trajectory from {:?} over {} s", start.as_slice(), planner.duration());
        Ok(ControlLoopDriver::new(model, planner, MotionController::new(config.law), config.driver))
    }

    pub fn model(&self) -> &KinematicChainModel {
        &self.model
    }

    pub fn planner(&self) -> &TrajectoryPlanner {
        &self.planner
    }

    pub fn controller(&self) -> &MotionController {
        &self.controller
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    /// Time at which the current segment ends, settle time included.
    pub fn end_time(&self) -> f64 {
        self.settings.settle_time + self.planner.duration()
    }

    /// Replaces the trajectory segment. The orientation to hold is captured again at the next
    /// ready tick, and the time of the next tick counts from the start of the new segment.
    pub fn replan(&mut self, planner: TrajectoryPlanner) {
        info!("New trajectory segment of {} s", planner.duration());
        self.planner = planner;
        self.orientation = None;
        self.finished = false;
    }

    /// Runs one control tick at time `t` since the start of the segment.
    ///
    /// On a control error the fault policy is applied to the sink and the error returned.
    /// A failing sink is only logged: the transport owns retries.
    pub fn tick(
        &mut self,
        t: f64,
        source: &mut impl StateSource,
        sink: &mut impl CommandSink,
    ) -> Result<TickOutcome, ControlError> {
        match self.control(t, source) {
            Ok(Some((torques, report))) => {
                let published = match sink.publish(&torques) {
                    Ok(()) => true,
                    Err(err) => {
                        warn!("Failed to publish torques at t = {:.3}: {:#}", t, err);
                        false
                    }
                };
                self.last_torques = Some(torques);
                Ok(TickOutcome::Commanded(TickReport { published, ..report }))
            }
            Ok(None) if self.finished => Ok(TickOutcome::Finished),
            Ok(None) => Ok(TickOutcome::Skipped),
            Err(err) => {
                warn!("Tick at t = {:.3} aborted: {}", t, err);
                self.apply_fault_policy(sink);
                Err(err)
            }
        }
    }

    /// Torques and report for this tick, None if skipped or finished.
    fn control(
        &mut self,
        t: f64,
        source: &mut impl StateSource,
    ) -> Result<Option<(Joints, TickReport)>, ControlError> {
        if let Some(sample) = source.latest() {
            self.model.update(&sample.positions, &sample.velocities)?;
        } else if !self.model.is_ready() {
            debug!("No joint state yet at t = {:.3}, skipping", t);
            return Ok(None);
        }

        if t >= self.end_time() {
            if !self.finished {
                info!("Trajectory terminated at t = {:.3}", t);
                self.finished = true;
            }
            return Ok(None);
        }

        let pose = self.model.end_effector_pose()?;
        let orientation = *self.orientation.get_or_insert(pose.rotation);

        let sample = if t <= self.settings.settle_time {
            self.planner.sample(0.0).at_rest()
        } else {
            self.planner.sample(t - self.settings.settle_time)
        };
        let target = sample.cartesian_target(orientation);
        let output = self.controller.compute_torques(&self.model, &target)?;

        let report = TickReport {
            time: t,
            torques: output.torques.clone(),
            position_error: sample.position - pose.translation.vector,
            progress: sample.progress,
            ik_residual: output.ik.map(|ik| ik.residual),
            published: false,
        };
        debug!("t = {:.3}, s = {:.4}, error = {:.5} m", t, sample.progress.s, report.position_error.norm());
        Ok(Some((output.torques, report)))
    }

    fn apply_fault_policy(&mut self, sink: &mut impl CommandSink) {
        let n = self.model.dof();
        let torques = match self.settings.fault_policy {
            FaultPolicy::HoldLast => self.last_torques.clone().unwrap_or_else(|| Joints::zeros(n)),
            FaultPolicy::ZeroTorque => Joints::zeros(n),
        };
        if let Err(err) = sink.publish(&torques) {
            warn!("Failed to publish fault torques: {:#}", err);
        }
    }
}
