use nalgebra::{Quaternion, UnitQuaternion};

/// Below this half-angle sine SLERP is ill-conditioned and NLERP is used.
const SLERP_EPS: f64 = 1e-9;

/// Move `fraction` of the way from `prev` to `target` along the shortest arc.
///
/// The result is always a unit quaternion.
pub fn blend_rotation(
    prev: &UnitQuaternion<f64>,
    target: &UnitQuaternion<f64>,
    fraction: f64,
) -> UnitQuaternion<f64> {
    prev.try_slerp(target, fraction, SLERP_EPS)
        .unwrap_or_else(|| nlerp_shortest(prev, target, fraction))
}

fn nlerp_shortest(
    prev: &UnitQuaternion<f64>,
    target: &UnitQuaternion<f64>,
    fraction: f64,
) -> UnitQuaternion<f64> {
    let a = *prev.quaternion();
    let mut b = *target.quaternion();
    if a.coords.dot(&b.coords) < 0.0 {
        b = -b;
    }
    let q: Quaternion<f64> = a * (1.0 - fraction) + b * fraction;
    UnitQuaternion::try_new(q, f64::EPSILON).unwrap_or(*target)
}
