//! Helper functions

use crate::kinematic_traits::{Joints, Pose};

/// Checks if all joint values are finite
pub fn is_valid(qs: &Joints) -> bool {
    qs.iter().all(|&q| q.is_finite())
}

/// Allows to specify joint values in degrees (converts to radians)
pub fn joints_from_degrees(degrees: &[f64]) -> Joints {
    Joints::from_iterator(degrees.len(), degrees.iter().map(|d| d.to_radians()))
}

/// Joint values as degrees, for logging.
pub fn format_joints(joints: &Joints) -> String {
    let row: Vec<String> = joints.iter()
        .map(|q| format!("{:5.2}", q.to_degrees()))
        .collect();
    format!("[{}]", row.join(" "))
}

pub fn format_pose(isometry: &Pose) -> String {
    let translation = isometry.translation.vector;
    let rotation = isometry.rotation;
    format!(
        "x: {:.5}, y: {:.5}, z: {:.5},  quat: {:.5},{:.5},{:.5},{:.5}",
        translation.x, translation.y, translation.z, rotation.i, rotation.j, rotation.k, rotation.w
    )
}

/// Panics with both poses printed if they differ more than the given tolerances.
pub fn assert_pose_eq(ta: &Pose, tb: &Pose, distance_tolerance: f64, angular_tolerance: f64) {
    let translation_distance = (ta.translation.vector - tb.translation.vector).norm();
    let angular_distance = ta.rotation.angle_to(&tb.rotation);

    if translation_distance > distance_tolerance {
        panic!("Poses have too different translations:\n{}\n{}", format_pose(ta), format_pose(tb));
    }
    if angular_distance > angular_tolerance {
        panic!("Poses have too different angles:\n{}\n{}", format_pose(ta), format_pose(tb));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_is_valid_with_all_finite() {
        let qs = Joints::from_vec(vec![0.0, 1.0, -1.0, 0.5, -0.5, PI, 0.1]);
        assert!(is_valid(&qs));
    }

    #[test]
    fn test_is_valid_with_nan() {
        let qs = Joints::from_vec(vec![0.0, f64::NAN, 1.0]);
        assert!(!is_valid(&qs));
    }

    #[test]
    fn test_is_valid_with_infinity() {
        let qs = Joints::from_vec(vec![f64::INFINITY, 1.0]);
        assert!(!is_valid(&qs));
    }

    #[test]
    fn test_degrees() {
        let qs = joints_from_degrees(&[90.0, -180.0]);
        assert!((qs[0] - PI / 2.0).abs() < 1e-12);
        assert!((qs[1] + PI).abs() < 1e-12);
        assert_eq!(format_joints(&qs), "[90.00 -180.00]");
    }
}
