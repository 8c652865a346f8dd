//! Single segment Cartesian trajectory: a path shape traversed with a velocity profile.
//!
//! The profile gives the path progress s(t) ∈ [0, 1] and its derivatives, the shape maps
//! progress to position, and velocity and acceleration follow from the chain rule:
//! ```text
//! p(t) = f(s(t)),   v = f'(s)·ṡ,   a = f''(s)·ṡ² + f'(s)·s̈
//! ```
//! The planner is immutable after construction and `sample` is a pure function of time.
//!
//! ```
//! use nalgebra::Vector3;
//! use rs_chain_control::planner::TrajectoryPlanner;
//!
//! let start = Vector3::new(0.4, 0.2, 0.6);
//! let end = Vector3::new(0.4, -0.2, 0.6);
//! let planner = TrajectoryPlanner::linear(10.0, 1.5, start, end).unwrap();
//!
//! let halfway = planner.sample(5.0);
//! assert!((halfway.progress.s - 0.5).abs() < 1e-12);
//! assert!(halfway.position.y.abs() < 1e-12);
//! ```

extern crate nalgebra as na;

use std::f64::consts::PI;
use na::{UnitQuaternion, Vector3};
use crate::control_error::ControlError;
use crate::kinematic_traits::{CartesianTarget, Pose, Twist};

/// How the path progress evolves in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VelocityProfile {
    /// Constant acceleration for `acc_duration`, cruise, then constant deceleration for
    /// `acc_duration`. Requires 0 < acc_duration ≤ T/2.
    Trapezoidal { acc_duration: f64 },
    /// s = 3τ² − 2τ³ with τ = t/T, zero velocity at both ends.
    Cubic,
}

/// Geometric path, parametrized by s ∈ [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathShape {
    /// Straight line from the start to `end`.
    Linear { end: Vector3<f64> },
    /// Full circle of `radius` centred at the start point, in the plane parallel to y-z.
    /// At s = 0 the path is at (x₀, y₀ − r, z₀).
    Circular { radius: f64 },
}

/// Path progress and its time derivatives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathProgress {
    pub s: f64,
    pub s_dot: f64,
    pub s_ddot: f64,
}

/// Desired position, velocity and acceleration at some time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectorySample {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub acceleration: Vector3<f64>,
    pub progress: PathProgress,
}

impl TrajectorySample {
    /// Cartesian target with the given orientation held, zero angular velocity and acceleration.
    pub fn cartesian_target(&self, orientation: UnitQuaternion<f64>) -> CartesianTarget {
        CartesianTarget {
            pose: Pose::from_parts(self.position.into(), orientation),
            twist: Twist::linear(self.velocity),
            accel: Twist::linear(self.acceleration),
        }
    }

    /// Same position with zero velocity and acceleration.
    pub fn at_rest(&self) -> TrajectorySample {
        TrajectorySample {
            position: self.position,
            velocity: Vector3::zeros(),
            acceleration: Vector3::zeros(),
            progress: PathProgress { s: self.progress.s, s_dot: 0.0, s_ddot: 0.0 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryPlanner {
    duration: f64,
    profile: VelocityProfile,
    start: Vector3<f64>,
    shape: PathShape,
}

fn invalid(message: String) -> ControlError {
    ControlError::InvalidProfile(message)
}

impl TrajectoryPlanner {
    /// Validates all parameters, returning `InvalidProfile` if the duration is not positive and
    /// finite, the acceleration phase is outside (0, T/2], the radius is negative or any point is
    /// not finite.
    pub fn new(
        duration: f64,
        profile: VelocityProfile,
        start: Vector3<f64>,
        shape: PathShape,
    ) -> Result<Self, ControlError> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(invalid(format!("duration must be positive, got {}", duration)));
        }
        if let VelocityProfile::Trapezoidal { acc_duration } = profile {
            if !acc_duration.is_finite() || acc_duration <= 0.0 || acc_duration > duration / 2.0 {
                return Err(invalid(format!(
                    "acceleration duration {} is outside (0, {}]", acc_duration, duration / 2.0)));
            }
        }
        if !start.iter().all(|v| v.is_finite()) {
            return Err(invalid(format!("start point {:?} is not finite", start.as_slice())));
        }
        match shape {
            PathShape::Linear { end } if !end.iter().all(|v| v.is_finite()) => {
                return Err(invalid(format!("end point {:?} is not finite", end.as_slice())));
            }
            PathShape::Circular { radius } if !radius.is_finite() || radius < 0.0 => {
                return Err(invalid(format!("radius must be non-negative, got {}", radius)));
            }
            _ => {}
        }
        Ok(TrajectoryPlanner { duration, profile, start, shape })
    }

    /// Straight line from `start` to `end` with the trapezoidal profile.
    pub fn linear(
        duration: f64,
        acc_duration: f64,
        start: Vector3<f64>,
        end: Vector3<f64>,
    ) -> Result<Self, ControlError> {
        Self::new(duration, VelocityProfile::Trapezoidal { acc_duration }, start, PathShape::Linear { end })
    }

    /// Circle about `start` with the trapezoidal profile.
    pub fn circular(
        duration: f64,
        acc_duration: f64,
        start: Vector3<f64>,
        radius: f64,
    ) -> Result<Self, ControlError> {
        Self::new(duration, VelocityProfile::Trapezoidal { acc_duration }, start, PathShape::Circular { radius })
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn profile(&self) -> &VelocityProfile {
        &self.profile
    }

    pub fn shape(&self) -> &PathShape {
        &self.shape
    }

    pub fn start(&self) -> &Vector3<f64> {
        &self.start
    }

    /// Path progress at time t, t clamped to [0, T].
    pub fn progress(&self, t: f64) -> PathProgress {
        let total = self.duration;
        if t >= total {
            return PathProgress { s: 1.0, s_dot: 0.0, s_ddot: 0.0 };
        }
        let t = t.max(0.0);
        match self.profile {
            VelocityProfile::Trapezoidal { acc_duration } => {
                let acc = 1.0 / (acc_duration * (total - acc_duration));
                if t <= acc_duration {
                    PathProgress { s: 0.5 * acc * t * t, s_dot: acc * t, s_ddot: acc }
                } else if t <= total - acc_duration {
                    PathProgress {
                        s: acc * acc_duration * (t - acc_duration / 2.0),
                        s_dot: acc * acc_duration,
                        s_ddot: 0.0,
                    }
                } else {
                    let remaining = total - t;
                    PathProgress {
                        s: 1.0 - 0.5 * acc * remaining * remaining,
                        s_dot: acc * remaining,
                        s_ddot: -acc,
                    }
                }
            }
            VelocityProfile::Cubic => {
                let tau = t / total;
                PathProgress {
                    s: tau * tau * (3.0 - 2.0 * tau),
                    s_dot: 6.0 * tau * (1.0 - tau) / total,
                    s_ddot: (6.0 - 12.0 * tau) / (total * total),
                }
            }
        }
    }

    /// Desired position, velocity and acceleration at time `t`. Times before the start are
    /// evaluated at 0, times after the end give the end point at rest.
    pub fn sample(&self, t: f64) -> TrajectorySample {
        let progress = self.progress(t);
        let PathProgress { s, s_dot, s_ddot } = progress;
        match self.shape {
            PathShape::Linear { end } => {
                let delta = end - self.start;
                TrajectorySample {
                    position: self.start + delta * s,
                    velocity: delta * s_dot,
                    acceleration: delta * s_ddot,
                    progress,
                }
            }
            PathShape::Circular { radius } => {
                let theta = 2.0 * PI * s;
                let theta_dot = 2.0 * PI * s_dot;
                let theta_ddot = 2.0 * PI * s_ddot;
                let (sin, cos) = theta.sin_cos();
                TrajectorySample {
                    position: Vector3::new(
                        self.start.x,
                        self.start.y - radius * cos,
                        self.start.z - radius * sin,
                    ),
                    velocity: Vector3::new(
                        0.0,
                        radius * sin * theta_dot,
                        -radius * cos * theta_dot,
                    ),
                    acceleration: Vector3::new(
                        0.0,
                        radius * (cos * theta_dot * theta_dot + sin * theta_ddot),
                        radius * (sin * theta_dot * theta_dot - cos * theta_ddot),
                    ),
                    progress,
                }
            }
        }
    }

    /// Position at the end of the segment.
    pub fn end_point(&self) -> Vector3<f64> {
        self.sample(self.duration).position
    }
}
