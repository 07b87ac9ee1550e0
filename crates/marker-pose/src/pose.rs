//! Closed-form pose of a square marker from its four image corners.
//!
//! The marker plane is `z = 0` in the marker frame, centered at the origin,
//! with the marker's own top-left corner at `(-s/2, s/2)`. The plane-to-image
//! homography `H ~ K [r1 r2 t]` is decomposed directly; no iterative
//! refinement is run.

use marker_pose_aruco::DetectedMarker;
use marker_pose_core::{homography_from_4pt_f64, CameraIntrinsics, RawPose};
use nalgebra::{Matrix3, Point2, Point3, Rotation3, Vector3};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Below this the homography columns carry no usable scale.
const MIN_COLUMN_NORM: f64 = 1e-12;

/// Marker corners in the marker frame: TL, TR, BR, BL.
pub fn marker_object_points(side: f64) -> [Point3<f64>; 4] {
    let h = 0.5 * side;
    [
        Point3::new(-h, h, 0.0),
        Point3::new(h, h, 0.0),
        Point3::new(h, -h, 0.0),
        Point3::new(-h, -h, 0.0),
    ]
}

/// Project a 3x3 matrix onto SO(3) (closest rotation in Frobenius norm).
fn project_to_so3(m: &Matrix3<f64>) -> Option<Rotation3<f64>> {
    let svd = m.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_fixed = u;
        u_fixed.column_mut(2).neg_mut();
        r = u_fixed * v_t;
    }
    r.iter()
        .all(|x| x.is_finite())
        .then(|| Rotation3::from_matrix_unchecked(r))
}

/// Rotation and translation taking marker-frame points into the camera frame.
///
/// `corners` are the marker's TL, TR, BR, BL in pixels. Returns `None` for
/// degenerate corner sets (collinear, repeated), a singular homography, a
/// non-finite result or a marker on the camera plane.
pub fn solve_square_pose(
    corners: &[Point2<f64>; 4],
    side: f64,
    intrinsics: &CameraIntrinsics,
) -> Option<(Rotation3<f64>, Vector3<f64>)> {
    if !(side.is_finite() && side > 0.0) {
        return None;
    }
    let plane = marker_object_points(side).map(|p| Point2::new(p.x, p.y));
    let h = homography_from_4pt_f64(&plane, corners)?;

    let m = intrinsics.inverse_matrix() * h.h;
    let (c1, c2, c3) = (m.column(0), m.column(1), m.column(2));
    let (n1, n2) = (c1.norm(), c2.norm());
    if n1 < MIN_COLUMN_NORM || n2 < MIN_COLUMN_NORM {
        return None;
    }

    let mut scale = 2.0 / (n1 + n2);
    if c3[2] * scale < 0.0 {
        scale = -scale;
    }

    let r1: Vector3<f64> = c1 * scale;
    let r2: Vector3<f64> = c2 * scale;
    let t: Vector3<f64> = c3 * scale;
    if !(t.z.is_finite() && t.z > 0.0) {
        return None;
    }

    let approx = Matrix3::from_columns(&[r1, r2, r1.cross(&r2)]);
    let rotation = project_to_so3(&approx)?;
    t.iter().all(|x| x.is_finite()).then_some((rotation, t))
}

/// Turns detected markers into raw camera-frame poses.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoseEstimator {
    marker_length: f64,
}

impl PoseEstimator {
    /// `marker_length` is the outer black square side in meters.
    pub fn new(marker_length: f64) -> Self {
        Self { marker_length }
    }

    #[inline]
    pub fn marker_length(&self) -> f64 {
        self.marker_length
    }

    /// Pose of one marker in detection space, or `None` if it cannot be solved.
    pub fn estimate(
        &self,
        marker: &DetectedMarker,
        intrinsics: &CameraIntrinsics,
    ) -> Option<RawPose> {
        let corners = marker
            .corners
            .map(|p| Point2::new(p.x as f64, p.y as f64));
        let (rotation, translation) = solve_square_pose(&corners, self.marker_length, intrinsics)?;
        Some(RawPose::new(marker.id, rotation, translation))
    }

    /// Solve every marker; unsolvable ones are skipped without affecting the rest.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, markers, intrinsics), fields(markers = markers.len()))
    )]
    pub fn estimate_all(
        &self,
        markers: &[DetectedMarker],
        intrinsics: &CameraIntrinsics,
    ) -> Vec<RawPose> {
        markers
            .iter()
            .filter_map(|m| {
                let pose = self.estimate(m, intrinsics);
                if pose.is_none() {
                    log::trace!("marker {} skipped: degenerate pose", m.id);
                }
                pose
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> CameraIntrinsics {
        CameraIntrinsics::new(800.0, 790.0, 320.0, 240.0)
    }

    fn project_corners(
        r: &Rotation3<f64>,
        t: &Vector3<f64>,
        side: f64,
        k: &CameraIntrinsics,
    ) -> [Point2<f64>; 4] {
        marker_object_points(side).map(|p| {
            k.project(&(r * p.coords + t))
                .expect("marker in front of camera")
        })
    }

    #[test]
    fn recovers_synthetic_pose() {
        let k = camera();
        let side = 0.05;
        let cases = [
            (
                Rotation3::from_euler_angles(std::f64::consts::PI, 0.0, 0.0),
                Vector3::new(0.0, 0.0, 0.4),
            ),
            (
                Rotation3::from_euler_angles(std::f64::consts::PI + 0.4, -0.3, 0.8),
                Vector3::new(0.03, -0.02, 0.35),
            ),
            (
                Rotation3::from_euler_angles(2.6, 0.5, -2.0),
                Vector3::new(-0.1, 0.05, 0.9),
            ),
        ];

        for (r, t) in cases {
            let corners = project_corners(&r, &t, side, &k);
            let (r_est, t_est) = solve_square_pose(&corners, side, &k).expect("solvable");
            assert_relative_eq!(t_est, t, epsilon = 1e-6);
            assert_relative_eq!(*r_est.matrix(), *r.matrix(), epsilon = 1e-6);
        }
    }

    #[test]
    fn frontal_marker_faces_camera() {
        let k = camera();
        let side = 0.1;
        // Upright square centered on the principal point, 100 px wide at 0.8 m.
        let corners = [
            Point2::new(270.0, 190.625),
            Point2::new(370.0, 190.625),
            Point2::new(370.0, 289.375),
            Point2::new(270.0, 289.375),
        ];
        let (r, t) = solve_square_pose(&corners, side, &k).expect("solvable");
        assert_relative_eq!(t, Vector3::new(0.0, 0.0, 0.8), epsilon = 1e-9);
        // Marker normal points back at the camera.
        assert_relative_eq!(r * Vector3::z(), -Vector3::z(), epsilon = 1e-9);
        assert_relative_eq!(r.matrix().determinant(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_corners_are_rejected() {
        let k = camera();
        let collinear = [
            Point2::new(100.0, 100.0),
            Point2::new(150.0, 100.0),
            Point2::new(200.0, 100.0),
            Point2::new(120.0, 180.0),
        ];
        assert!(solve_square_pose(&collinear, 0.05, &k).is_none());

        let repeated = [Point2::new(50.0, 50.0); 4];
        assert!(solve_square_pose(&repeated, 0.05, &k).is_none());

        let ok = [
            Point2::new(100.0, 100.0),
            Point2::new(200.0, 100.0),
            Point2::new(200.0, 200.0),
            Point2::new(100.0, 200.0),
        ];
        assert!(solve_square_pose(&ok, 0.0, &k).is_none());
        assert!(solve_square_pose(&ok, f64::NAN, &k).is_none());
    }

    #[test]
    fn estimate_all_skips_only_bad_markers() {
        let k = camera();
        let est = PoseEstimator::new(0.05);
        let r = Rotation3::from_euler_angles(std::f64::consts::PI, 0.1, 0.0);
        let t = Vector3::new(0.0, 0.0, 0.5);
        let good = project_corners(&r, &t, 0.05, &k).map(|p| Point2::new(p.x as f32, p.y as f32));
        let markers = vec![
            DetectedMarker {
                id: 2,
                corners: good,
                hamming: 0,
                rotation: 0,
                border_score: 1.0,
                inverted: false,
            },
            DetectedMarker {
                id: 4,
                corners: [Point2::new(10.0, 10.0); 4],
                hamming: 0,
                rotation: 0,
                border_score: 1.0,
                inverted: false,
            },
        ];
        let poses = est.estimate_all(&markers, &k);
        assert_eq!(poses.len(), 1);
        assert_eq!(poses[0].marker_id, 2);
        assert_relative_eq!(poses[0].translation, t, epsilon = 1e-4);
    }
}
