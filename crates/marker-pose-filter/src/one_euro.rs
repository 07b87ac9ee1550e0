//! One Euro filter over 3D translations.
//!
//! Smooth at rest, responsive under motion: the cutoff frequency grows with
//! the low-passed speed of the signal.

use nalgebra::Vector3;
use std::f64::consts::PI;

/// Time step used when there is no previous timestamp or time did not advance.
pub const FALLBACK_DT: f64 = 1.0 / 60.0;

/// Exponential smoothing factor for a first-order low-pass at `cutoff` Hz.
///
/// `alpha = 1 / (1 + tau / dt)` with `tau = 1 / (2π·cutoff)`; always in `(0, 1)`
/// for positive finite inputs.
#[inline]
pub fn alpha(cutoff: f64, dt: f64) -> f64 {
    let tau = 1.0 / (2.0 * PI * cutoff);
    1.0 / (1.0 + tau / dt)
}

/// Static tuning of one filter instance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OneEuroParams {
    pub min_cutoff: f64,
    pub beta: f64,
    pub d_cutoff: f64,
}

/// Adaptive low-pass state for one marker's translation.
#[derive(Clone, Debug)]
pub struct OneEuroFilter {
    params: OneEuroParams,
    prev: Option<Vector3<f64>>,
    velocity: Vector3<f64>,
    last_timestamp: Option<f64>,
    last_cutoff: Option<f64>,
}

impl OneEuroFilter {
    pub fn new(params: OneEuroParams) -> Self {
        Self {
            params,
            prev: None,
            velocity: Vector3::zeros(),
            last_timestamp: None,
            last_cutoff: None,
        }
    }

    /// Seconds since the last update, or [`FALLBACK_DT`].
    fn dt(&self, timestamp: f64) -> f64 {
        match self.last_timestamp {
            Some(last) => {
                let dt = timestamp - last;
                if dt.is_finite() && dt > 0.0 {
                    dt
                } else {
                    FALLBACK_DT
                }
            }
            None => FALLBACK_DT,
        }
    }

    /// Filter `x` observed at `timestamp` (seconds).
    pub fn filter(&mut self, x: Vector3<f64>, timestamp: f64) -> Vector3<f64> {
        let dt = self.dt(timestamp);
        self.last_timestamp = Some(timestamp);

        let Some(prev) = self.prev else {
            self.prev = Some(x);
            self.velocity = Vector3::zeros();
            self.last_cutoff = None;
            return x;
        };

        let raw_velocity = (x - prev) / dt;
        let a_d = alpha(self.params.d_cutoff, dt);
        self.velocity = self.velocity + a_d * (raw_velocity - self.velocity);

        let cutoff = self.params.min_cutoff + self.params.beta * self.velocity.norm();
        let a = alpha(cutoff, dt);
        let filtered = prev + a * (x - prev);

        self.prev = Some(filtered);
        self.last_cutoff = Some(cutoff);
        filtered
    }

    /// Last filtered value.
    #[inline]
    pub fn value(&self) -> Option<Vector3<f64>> {
        self.prev
    }

    /// Low-passed velocity (m/s).
    #[inline]
    pub fn velocity(&self) -> Vector3<f64> {
        self.velocity
    }

    #[inline]
    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    /// Adaptive cutoff used by the last update; `None` after a first observation.
    #[inline]
    pub fn last_cutoff(&self) -> Option<f64> {
        self.last_cutoff
    }

    pub fn reset(&mut self) {
        self.prev = None;
        self.velocity = Vector3::zeros();
        self.last_timestamp = None;
        self.last_cutoff = None;
    }
}
