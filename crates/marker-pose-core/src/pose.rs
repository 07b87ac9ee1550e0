//! Marker pose types shared by the estimator, the filters and consumers.

use nalgebra::{Isometry3, Matrix3, Matrix4, Rotation3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Unfiltered camera-to-marker transform for one marker in one frame.
///
/// Maps marker-frame points into the camera frame: `p_cam = R * p_marker + t`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawPose {
    pub marker_id: u32,
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

impl RawPose {
    pub fn new(marker_id: u32, rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            marker_id,
            rotation,
            translation,
        }
    }

    /// Build from a raw 3x3 block; the block is re-orthonormalized.
    pub fn from_matrix(marker_id: u32, rotation: &Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self::new(
            marker_id,
            Rotation3::from_matrix(rotation),
            translation,
        )
    }

    pub fn quaternion(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_rotation_matrix(&self.rotation)
    }

    pub fn to_homogeneous(&self) -> Matrix4<f64> {
        let mut m = self.rotation.to_homogeneous();
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }
}

/// Smoothed marker transform handed to consumers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilteredPose {
    pub marker_id: u32,
    /// Homogeneous transform: orthonormal rotation block, translation column,
    /// last row `(0, 0, 0, 1)`.
    pub transform: Matrix4<f64>,
}

impl FilteredPose {
    pub fn from_parts(
        marker_id: u32,
        rotation: UnitQuaternion<f64>,
        translation: Vector3<f64>,
    ) -> Self {
        let iso = Isometry3::from_parts(Translation3::from(translation), rotation);
        Self {
            marker_id,
            transform: iso.to_homogeneous(),
        }
    }

    pub fn rotation(&self) -> Matrix3<f64> {
        self.transform.fixed_view::<3, 3>(0, 0).into_owned()
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.transform.fixed_view::<3, 1>(0, 3).into_owned()
    }

    /// Column-major `f32` layout used by most rendering engines.
    pub fn to_cols_array(&self) -> [f32; 16] {
        let mut out = [0.0f32; 16];
        for (dst, src) in out.iter_mut().zip(self.transform.iter()) {
            *dst = *src as f32;
        }
        out
    }
}
