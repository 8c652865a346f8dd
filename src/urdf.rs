//! Builds the kinematic chain from URDF (optional)
//!
//! Only the joints on the path from the base link to the tip link are used. Other joints only
//! need a name, a parent and a child, so floating objects or grippers elsewhere in the
//! description do not prevent loading. Fixed joints on
//! that path are folded into the neighbouring actuated joints: their transform goes into the
//! next joint origin (or the chain tip), and the inertia of the links they carry is merged
//! into the last moving link. Links above the first actuated joint do not move and their
//! inertia is ignored.

extern crate nalgebra as na;
extern crate sxd_document;

use std::collections::HashMap;
use std::fs::read_to_string;
use std::path::Path;
use na::{Isometry3, Matrix3, Translation3, UnitQuaternion, Vector3};
use regex::Regex;
use sxd_document::{dom, parser};
use tracing::debug;

use crate::chain::{ChainJoint, JointType, KinematicChain, LinkInertia};
use crate::parameter_error::ParameterError;

/// Reads the chain between `base_link` and `tip_link` from URDF file. XACRO files may also work
/// if they do not use macros on the chain path, except angles written as `${radians(value)}`.
///
/// # Example
/// ```
/// use rs_chain_control::kinematic_traits::Kinematics;
/// let chain = rs_chain_control::urdf::from_urdf_file(
///     "src/tests/data/lbr_arm.urdf", "lbr_link_0", "lbr_link_ee").expect("valid URDF");
/// assert_eq!(chain.dof(), 7);
/// ```
pub fn from_urdf_file<P: AsRef<Path>>(
    path: P,
    base_link: &str,
    tip_link: &str,
) -> Result<KinematicChain, ParameterError> {
    let xml_content = read_to_string(path)?;
    from_urdf(&xml_content, base_link, tip_link)
}

/// Same as `from_urdf_file` but takes the URDF content.
///
/// # Errors
/// - `XmlProcessingError` if the content is not well-formed XML or has no root element.
/// - `MissingField` if a joint lacks parent or child, or a joint on the path lacks required limits.
/// - `WrongAngle` / `ParseError` for unreadable numbers on the path or in link inertia.
/// - `ChainConfigurationError` if the links are not connected, a joint on the path has
///   unsupported type or there is no actuated joint between them.
pub fn from_urdf(xml_content: &str, base_link: &str, tip_link: &str) -> Result<KinematicChain, ParameterError> {
    let package = parser::parse(xml_content)
        .map_err(|e| ParameterError::XmlProcessingError(format!("Failed to parse XML: {}", e)))?;
    let document = package.as_document();
    let root_element = document.root().children().into_iter()
        .find_map(|e| e.element())
        .ok_or_else(|| ParameterError::XmlProcessingError("No root element found".to_string()))?;

    let reader = UrdfReader::new()?;
    let mut links = HashMap::new();
    let mut joints = Vec::new();
    reader.collect(root_element, &mut links, &mut joints)?;

    let path = joint_path(&joints, base_link, tip_link)?;
    debug!("URDF chain {} -> {}: {:?}", base_link, tip_link,
        path.iter().map(|j| j.name.as_str()).collect::<Vec<_>>());
    let path = path.into_iter()
        .map(|j| reader.joint(j))
        .collect::<Result<Vec<_>, _>>()?;
    assemble(&path, &links)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum UrdfJointType {
    Revolute,
    Continuous,
    Prismatic,
    Fixed,
}

/// Joint as found in the document, only its place in the link tree is read.
struct JointElement<'d> {
    name: String,
    parent: String,
    child: String,
    element: dom::Element<'d>,
}

impl<'d> JointElement<'d> {
    fn new(element: dom::Element<'d>) -> Result<Self, ParameterError> {
        let name = required(element, "name", "joint")?;
        let link_of = |tag: &str| {
            find_child(element, tag)
                .and_then(|e| e.attribute_value("link").map(str::to_string))
                .ok_or_else(|| ParameterError::MissingField(format!("{} of joint {}", tag, name)))
        };
        let parent = link_of("parent")?;
        let child = link_of("child")?;
        Ok(JointElement { name, parent, child, element })
    }
}

#[derive(Debug, Clone)]
struct UrdfJoint {
    name: String,
    joint_type: UrdfJointType,
    child: String,
    origin: Isometry3<f64>,
    axis: Vector3<f64>,
    limits: Option<(f64, f64)>,
}

struct UrdfReader {
    radians: Regex,
}

impl UrdfReader {
    fn new() -> Result<Self, ParameterError> {
        // ${radians(<number>)} format that is common in xacro
        let radians = Regex::new(r"^\$\{radians\((-?\d+(\.\d+)?)\)\}$")
            .map_err(|_| ParameterError::ParseError("Invalid regex pattern".to_string()))?;
        Ok(UrdfReader { radians })
    }

    /// Walks the document collecting links (with their inertia) and joints.
    fn collect<'d>(
        &self,
        element: dom::Element<'d>,
        links: &mut HashMap<String, LinkInertia>,
        joints: &mut Vec<JointElement<'d>>,
    ) -> Result<(), ParameterError> {
        for child in element.children().into_iter().filter_map(|e| e.element()) {
            match child.name().local_part() {
                "link" => {
                    let name = required(child, "name", "link")?;
                    let inertia = match find_child(child, "inertial") {
                        Some(inertial) => self.inertial(inertial, &name)?,
                        None => LinkInertia::zero(),
                    };
                    links.insert(name, inertia);
                }
                "joint" => joints.push(JointElement::new(child)?),
                // Joint references there are not joints
                "transmission" | "gazebo" => {}
                _ => self.collect(child, links, joints)?,
            }
        }
        Ok(())
    }

    /// Reads type, origin, axis and limits of a joint on the chain path.
    fn joint(&self, joint: &JointElement) -> Result<UrdfJoint, ParameterError> {
        let (element, name) = (joint.element, joint.name.clone());
        let joint_type = match required(element, "type", &name)?.as_str() {
            "revolute" => UrdfJointType::Revolute,
            "continuous" => UrdfJointType::Continuous,
            "prismatic" => UrdfJointType::Prismatic,
            "fixed" => UrdfJointType::Fixed,
            other => return Err(ParameterError::ChainConfigurationError(
                format!("Joint {} has unsupported type {}", name, other))),
        };
        let origin = find_child(element, "origin")
            .map(|e| self.origin(e))
            .transpose()?
            .unwrap_or_else(Isometry3::identity);
        // URDF default axis
        let axis = find_child(element, "axis")
            .and_then(|e| e.attribute_value("xyz"))
            .map(|xyz| self.triple(xyz))
            .transpose()?
            .unwrap_or_else(Vector3::x);

        let limits = match joint_type {
            UrdfJointType::Revolute | UrdfJointType::Prismatic => {
                let limit = find_child(element, "limit")
                    .ok_or_else(|| ParameterError::MissingField(format!("limit of joint {}", name)))?;
                Some(self.limits(limit, &name)?)
            }
            _ => None,
        };

        Ok(UrdfJoint { name, joint_type, child: joint.child.clone(), origin, axis, limits })
    }

    fn inertial(&self, element: dom::Element, link: &str) -> Result<LinkInertia, ParameterError> {
        let origin = find_child(element, "origin")
            .map(|e| self.origin(e))
            .transpose()?
            .unwrap_or_else(Isometry3::identity);
        let mass = find_child(element, "mass")
            .and_then(|e| e.attribute_value("value"))
            .ok_or_else(|| ParameterError::MissingField(format!("mass of link {}", link)))?;
        let mass = parse_number(mass)?;

        let inertia = match find_child(element, "inertia") {
            Some(inertia) => {
                let component = |name: &str| -> Result<f64, ParameterError> {
                    inertia.attribute_value(name).map_or(Ok(0.0), parse_number)
                };
                let (ixx, ixy, ixz) = (component("ixx")?, component("ixy")?, component("ixz")?);
                let (iyy, iyz, izz) = (component("iyy")?, component("iyz")?, component("izz")?);
                Matrix3::new(
                    ixx, ixy, ixz,
                    ixy, iyy, iyz,
                    ixz, iyz, izz,
                )
            }
            None => Matrix3::zeros(),
        };

        Ok(LinkInertia::new(mass, Vector3::zeros(), inertia).transformed(&origin))
    }

    fn origin(&self, element: dom::Element) -> Result<Isometry3<f64>, ParameterError> {
        let xyz = element.attribute_value("xyz")
            .map(|v| self.triple(v))
            .transpose()?
            .unwrap_or_else(Vector3::zeros);
        let rpy = element.attribute_value("rpy")
            .map(|v| self.triple(v))
            .transpose()?
            .unwrap_or_else(Vector3::zeros);
        Ok(Isometry3::from_parts(
            Translation3::from(xyz),
            UnitQuaternion::from_euler_angles(rpy.x, rpy.y, rpy.z),
        ))
    }

    fn limits(&self, element: dom::Element, joint: &str) -> Result<(f64, f64), ParameterError> {
        let bound = |name: &str| -> Result<f64, ParameterError> {
            let value = element.attribute_value(name).ok_or_else(|| {
                ParameterError::MissingField(format!("{} limit of joint {}", name, joint))
            })?;
            self.parse_angle(value)
        };
        Ok((bound("lower")?, bound("upper")?))
    }

    fn triple(&self, value: &str) -> Result<Vector3<f64>, ParameterError> {
        let values: Vec<f64> = value.split_whitespace()
            .map(|v| self.parse_angle(v))
            .collect::<Result<_, _>>()?;
        if values.len() != 3 {
            return Err(ParameterError::InvalidLength { expected: 3, found: values.len() });
        }
        Ok(Vector3::new(values[0], values[1], values[2]))
    }

    fn parse_angle(&self, attr_value: &str) -> Result<f64, ParameterError> {
        if let Some(caps) = self.radians.captures(attr_value) {
            let degrees: f64 = caps[1].parse()
                .map_err(|_| ParameterError::WrongAngle(attr_value.to_string()))?;
            Ok(degrees.to_radians())
        } else {
            // Plain number in radians
            attr_value.parse()
                .map_err(|_| ParameterError::WrongAngle(attr_value.to_string()))
        }
    }
}

fn parse_number(value: &str) -> Result<f64, ParameterError> {
    value.trim().parse()
        .map_err(|_| ParameterError::ParseError(format!("Not a number: {}", value)))
}

fn find_child<'d>(element: dom::Element<'d>, tag: &str) -> Option<dom::Element<'d>> {
    element.children().into_iter()
        .filter_map(|e| e.element())
        .find(|e| e.name().local_part() == tag)
}

fn required(element: dom::Element, attribute: &str, owner: &str) -> Result<String, ParameterError> {
    element.attribute_value(attribute)
        .map(str::to_string)
        .ok_or_else(|| ParameterError::MissingField(format!("{} of {}", attribute, owner)))
}

/// Joints from the base link to the tip link, in this order.
fn joint_path<'a, 'd>(
    joints: &'a [JointElement<'d>],
    base_link: &str,
    tip_link: &str,
) -> Result<Vec<&'a JointElement<'d>>, ParameterError> {
    let by_child: HashMap<&str, &JointElement> = joints.iter()
        .map(|j| (j.child.as_str(), j))
        .collect();

    let mut path = Vec::new();
    let mut link = tip_link;
    while link != base_link {
        let joint = by_child.get(link).ok_or_else(|| {
            ParameterError::ChainConfigurationError(
                format!("Link {} is not connected to the base link {}", link, base_link))
        })?;
        if path.len() > joints.len() {
            return Err(ParameterError::ChainConfigurationError("Joint loop detected".to_string()));
        }
        path.push(*joint);
        link = joint.parent.as_str();
    }
    path.reverse();
    Ok(path)
}

fn assemble(path: &[UrdfJoint], links: &HashMap<String, LinkInertia>) -> Result<KinematicChain, ParameterError> {
    let mut chain_joints: Vec<ChainJoint> = Vec::new();
    // Transform from the last moving link frame accumulated over fixed joints
    let mut pending = Isometry3::identity();

    for joint in path {
        let link = links.get(&joint.child).copied().unwrap_or_else(LinkInertia::zero);
        let joint_type = match joint.joint_type {
            UrdfJointType::Fixed => {
                pending = pending * joint.origin;
                if let Some(last) = chain_joints.last_mut() {
                    last.link = last.link.merged(&link.transformed(&pending));
                }
                continue;
            }
            UrdfJointType::Revolute | UrdfJointType::Continuous => JointType::Revolute,
            UrdfJointType::Prismatic => JointType::Prismatic,
        };
        let mut chain_joint = ChainJoint::new(&joint.name, joint_type, pending * joint.origin, joint.axis, link)?;
        if let Some((lower, upper)) = joint.limits {
            chain_joint = chain_joint.with_limits(lower, upper);
        }
        chain_joints.push(chain_joint);
        pending = Isometry3::identity();
    }

    KinematicChain::new(chain_joints, pending)
}
