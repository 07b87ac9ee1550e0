//! Axis-convention change between detection space and consumer space.
//!
//! Detection space follows the computer-vision camera convention
//! (x right, y down, z forward). Consumer space follows the graphics
//! convention (x right, y up, z backward). The two differ by a 180° rotation
//! about x, applied by left-multiplication. The map is its own inverse.

use nalgebra::{Matrix3, Matrix4, Rotation3, Vector3};

use crate::RawPose;

/// `diag(1, -1, -1)`: flips y and z, keeps x.
#[inline]
pub fn axis_flip() -> Matrix3<f64> {
    Matrix3::from_diagonal(&Vector3::new(1.0, -1.0, -1.0))
}

/// Homogeneous form of [`axis_flip`].
#[inline]
pub fn axis_flip_homogeneous() -> Matrix4<f64> {
    axis_flip().to_homogeneous()
}

/// Re-express a detection-space transform in consumer space.
#[inline]
pub fn detection_to_consumer(m: &Matrix4<f64>) -> Matrix4<f64> {
    axis_flip_homogeneous() * m
}

/// Inverse of [`detection_to_consumer`] (the same map).
#[inline]
pub fn consumer_to_detection(m: &Matrix4<f64>) -> Matrix4<f64> {
    axis_flip_homogeneous() * m
}

/// Apply the change of basis to a raw pose. The result stays a proper rotation.
pub fn pose_to_consumer(pose: &RawPose) -> RawPose {
    let flip = axis_flip();
    RawPose {
        marker_id: pose.marker_id,
        rotation: Rotation3::from_matrix_unchecked(flip * pose.rotation.matrix()),
        translation: flip * pose.translation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_pose() -> RawPose {
        RawPose::new(
            3,
            Rotation3::from_euler_angles(0.4, -0.3, 1.1),
            Vector3::new(0.05, -0.02, 0.6),
        )
    }

    #[test]
    fn conversion_is_an_involution() {
        let m = sample_pose().to_homogeneous();
        let back = consumer_to_detection(&detection_to_consumer(&m));
        assert_relative_eq!(back, m, epsilon = 1e-12);
    }

    #[test]
    fn flip_is_orthogonal_rotation() {
        let f = axis_flip();
        assert_relative_eq!(f * f.transpose(), Matrix3::identity(), epsilon = 1e-15);
        assert_relative_eq!(f.determinant(), 1.0, epsilon = 1e-15);
    }

    #[test]
    fn converted_pose_matches_matrix_form() {
        let pose = sample_pose();
        let converted = pose_to_consumer(&pose);
        assert_relative_eq!(
            converted.to_homogeneous(),
            detection_to_consumer(&pose.to_homogeneous()),
            epsilon = 1e-12
        );
        // A marker in front of the camera lands on the negative z axis.
        assert!(converted.translation.z < 0.0);
        assert_relative_eq!(converted.rotation.matrix().determinant(), 1.0, epsilon = 1e-12);
    }
}
