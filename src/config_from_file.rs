//! Reads the control configuration from YAML (optional, feature `allow_filesystem`).

extern crate nalgebra as na;

use std::path::Path;
use na::{Isometry3, Translation3, UnitQuaternion, Vector3};
use regex::Regex;
use yaml_rust2::{Yaml, YamlLoader};

use crate::config::{ControlConfig, RobotConfig, ShapeConfig, TrajectoryConfig};
use crate::controller::{CartesianGains, ControlLaw, JointGains};
use crate::driver::{DriverSettings, FaultPolicy};
use crate::inverse_kinematics::IkSettings;
use crate::kinematic_traits::Joints;
use crate::parameter_error::ParameterError;
use crate::planner::VelocityProfile;
use crate::robot_model::ModelSettings;

impl ControlConfig {
    /// Read the control configuration from YAML file. YAML file like this is supported:
    /// ```yaml
    /// robot:
    ///   base_link: lbr_link_0
    ///   tip_link: lbr_link_ee
    ///   initial_joints: [0.0, deg(90), deg(-90), -1.2, 1.57, -1.57, -0.37]
    ///   gravity: [0.0, 0.0, -9.81]
    /// end_effector:
    ///   xyz: [0.0, 0.0, 0.1]
    ///   rpy: [0.0, 0.0, 0.0]
    /// trajectory:
    ///   duration: 10.0
    ///   profile: trapezoidal  # or cubic
    ///   acc_duration: 1.5
    ///   shape: linear         # or circular, with radius
    ///   end: [0.5, -0.2, 0.6] # optional, start mirrored in y otherwise
    /// control:
    ///   law: joint_space      # or operational_space with kp, ko, zeta_p, zeta_o
    ///   kp: 70
    ///   kd: 7
    ///   pinv_damping: 0.001
    /// ik:
    ///   max_iterations: 100
    ///   tolerance: 1.0e-6
    /// loop:
    ///   rate: 500
    ///   settle_time: 0.0
    ///   fault_policy: hold_last  # or zero_torque
    /// ```
    /// All sections and values are optional, defaults are those of `ControlConfig::default()`.
    /// Angles may be given in degrees as deg(angle).
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ParameterError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Same as `from_yaml_file`, from the YAML text.
    pub fn from_yaml(contents: &str) -> Result<Self, ParameterError> {
        let docs = YamlLoader::load_from_str(contents)
            .map_err(|e| ParameterError::ParseError(e.to_string()))?;
        let reader = Reader::new()?;
        let defaults = ControlConfig::default();
        let Some(doc) = docs.first() else {
            return Ok(defaults);
        };

        let robot = section(doc, "robot");
        let end_effector = section(doc, "end_effector");
        let trajectory = section(doc, "trajectory");
        let control = section(doc, "control");
        let ik = section(doc, "ik");
        let timing = section(doc, "loop");

        let robot_config = RobotConfig {
            base_link: reader.string(robot, "base_link")?.unwrap_or(defaults.robot.base_link),
            tip_link: reader.string(robot, "tip_link")?.unwrap_or(defaults.robot.tip_link),
            initial_joints: reader.numbers(robot, "initial_joints")?
                .map(Joints::from_vec)
                .unwrap_or(defaults.robot.initial_joints),
        };

        let end_effector = Isometry3::from_parts(
            Translation3::from(reader.vector3(end_effector, "xyz")?.unwrap_or_else(Vector3::zeros)),
            reader.vector3(end_effector, "rpy")?
                .map(|rpy| UnitQuaternion::from_euler_angles(rpy.x, rpy.y, rpy.z))
                .unwrap_or_else(UnitQuaternion::identity),
        );

        let trajectory_config = reader.trajectory(trajectory, &defaults.trajectory)?;
        let law = reader.law(control)?;

        let ik_defaults = IkSettings::default();
        let model = ModelSettings {
            ik: IkSettings {
                max_iterations: reader.number(ik, "max_iterations")?
                    .map(|v| v as usize)
                    .unwrap_or(ik_defaults.max_iterations),
                tolerance: reader.number(ik, "tolerance")?.unwrap_or(ik_defaults.tolerance),
                damping: reader.number(ik, "damping")?.unwrap_or(ik_defaults.damping),
                position_weight: reader.number(ik, "position_weight")?
                    .unwrap_or(ik_defaults.position_weight),
                orientation_weight: reader.number(ik, "orientation_weight")?
                    .unwrap_or(ik_defaults.orientation_weight),
            },
            pinv_damping: reader.number(control, "pinv_damping")?.unwrap_or(defaults.model.pinv_damping),
            gravity: reader.vector3(robot, "gravity")?.unwrap_or(defaults.model.gravity),
        };

        let fault_policy = match reader.string(timing, "fault_policy")?.as_deref() {
            None => defaults.driver.fault_policy,
            Some("hold_last") => FaultPolicy::HoldLast,
            Some("zero_torque") => FaultPolicy::ZeroTorque,
            Some(other) => return Err(ParameterError::ParseError(
                format!("Unknown fault_policy '{}', expected hold_last or zero_torque", other))),
        };
        let driver = DriverSettings {
            settle_time: reader.number(timing, "settle_time")?.unwrap_or(defaults.driver.settle_time),
            fault_policy,
        };

        let config = ControlConfig {
            robot: robot_config,
            trajectory: trajectory_config,
            law,
            end_effector,
            model,
            driver,
            rate: reader.number(timing, "rate")?.unwrap_or(defaults.rate),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Named mapping of the document, None if absent.
fn section<'a>(doc: &'a Yaml, key: &str) -> Option<&'a Yaml> {
    let node = &doc[key];
    if node.is_badvalue() || node.is_null() { None } else { Some(node) }
}

struct Reader {
    degrees: Regex,
}

impl Reader {
    fn new() -> Result<Self, ParameterError> {
        let degrees = Regex::new(r"^\s*deg\(\s*([-+]?[0-9]*\.?[0-9]+([eE][-+]?[0-9]+)?)\s*\)\s*$")
            .map_err(|e| ParameterError::ParseError(e.to_string()))?;
        Ok(Reader { degrees })
    }

    fn value<'a>(&self, node: Option<&'a Yaml>, key: &str) -> Option<&'a Yaml> {
        node.and_then(|node| section(node, key))
    }

    /// Parses a scalar: real, integer or deg(angle) converted to radians.
    fn scalar(&self, value: &Yaml, key: &str) -> Result<f64, ParameterError> {
        match value {
            Yaml::Real(_) => value.as_f64()
                .ok_or_else(|| ParameterError::ParseError(format!("Invalid number for {}", key))),
            Yaml::Integer(v) => Ok(*v as f64),
            Yaml::String(text) => {
                let captures = self.degrees.captures(text).ok_or_else(|| {
                    ParameterError::WrongAngle(format!("{}: {}", key, text))
                })?;
                captures[1].parse::<f64>()
                    .map(f64::to_radians)
                    .map_err(|e| ParameterError::WrongAngle(format!("{}: {}", key, e)))
            }
            _ => Err(ParameterError::ParseError(format!("{} must be a number", key))),
        }
    }

    fn number(&self, node: Option<&Yaml>, key: &str) -> Result<Option<f64>, ParameterError> {
        self.value(node, key).map(|value| self.scalar(value, key)).transpose()
    }

    fn string(&self, node: Option<&Yaml>, key: &str) -> Result<Option<String>, ParameterError> {
        match self.value(node, key) {
            None => Ok(None),
            Some(value) => value.as_str()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| ParameterError::ParseError(format!("{} must be a string", key))),
        }
    }

    fn numbers(&self, node: Option<&Yaml>, key: &str) -> Result<Option<Vec<f64>>, ParameterError> {
        match self.value(node, key) {
            None => Ok(None),
            Some(value) => {
                let items = value.as_vec()
                    .ok_or_else(|| ParameterError::ParseError(format!("{} must be a list", key)))?;
                items.iter()
                    .map(|item| self.scalar(item, key))
                    .collect::<Result<Vec<f64>, _>>()
                    .map(Some)
            }
        }
    }

    fn vector3(&self, node: Option<&Yaml>, key: &str) -> Result<Option<Vector3<f64>>, ParameterError> {
        match self.numbers(node, key)? {
            None => Ok(None),
            Some(values) if values.len() == 3 => Ok(Some(Vector3::new(values[0], values[1], values[2]))),
            Some(values) => Err(ParameterError::InvalidLength { expected: 3, found: values.len() }),
        }
    }

    fn trajectory(&self, node: Option<&Yaml>, defaults: &TrajectoryConfig) -> Result<TrajectoryConfig, ParameterError> {
        let profile = match self.string(node, "profile")?.as_deref() {
            None | Some("trapezoidal") => {
                let default_acc = match defaults.profile {
                    VelocityProfile::Trapezoidal { acc_duration } => acc_duration,
                    VelocityProfile::Cubic => 1.5,
                };
                VelocityProfile::Trapezoidal {
                    acc_duration: self.number(node, "acc_duration")?.unwrap_or(default_acc),
                }
            }
            Some("cubic") => VelocityProfile::Cubic,
            Some(other) => return Err(ParameterError::ParseError(
                format!("Unknown profile '{}', expected trapezoidal or cubic", other))),
        };

        let shape = match self.string(node, "shape")?.as_deref() {
            None | Some("linear") => ShapeConfig::Linear { end: self.vector3(node, "end")? },
            Some("circular") => ShapeConfig::Circular {
                radius: self.number(node, "radius")?
                    .ok_or_else(|| ParameterError::MissingField("trajectory.radius".to_string()))?,
            },
            Some(other) => return Err(ParameterError::ParseError(
                format!("Unknown shape '{}', expected linear or circular", other))),
        };

        Ok(TrajectoryConfig {
            duration: self.number(node, "duration")?.unwrap_or(defaults.duration),
            profile,
            shape,
        })
    }

    fn law(&self, node: Option<&Yaml>) -> Result<ControlLaw, ParameterError> {
        match self.string(node, "law")?.as_deref() {
            None | Some("joint_space") => {
                let kp = self.number(node, "kp")?.unwrap_or(70.0);
                let kd = self.number(node, "kd")?.unwrap_or(7.0);
                Ok(ControlLaw::JointSpace(JointGains::new(kp, kd)))
            }
            Some("operational_space") => {
                let kp = self.number(node, "kp")?.unwrap_or(70.0);
                let ko = self.number(node, "ko")?.unwrap_or(35.0);
                let zeta_p = self.number(node, "zeta_p")?.unwrap_or(0.4);
                let zeta_o = self.number(node, "zeta_o")?.unwrap_or(0.5);
                let mut gains = CartesianGains::with_damping_ratio(kp, ko, zeta_p, zeta_o);
                if let Some(kd_p) = self.number(node, "kd_p")? {
                    gains.kd_p = kd_p;
                }
                if let Some(kd_o) = self.number(node, "kd_o")? {
                    gains.kd_o = kd_o;
                }
                if let Some(null_damping) = self.number(node, "null_damping")? {
                    gains = gains.with_null_damping(null_damping);
                }
                Ok(ControlLaw::OperationalSpace(gains))
            }
            Some(other) => Err(ParameterError::ParseError(
                format!("Unknown control law '{}', expected joint_space or operational_space", other))),
        }
    }
}
