//! Per-marker filter state, keyed by marker id.

use crate::one_euro::{OneEuroFilter, OneEuroParams};
use crate::rotation::blend_rotation;
use crate::window::WindowAverage;
use crate::{FilterConfigError, FilterMode, FilterParams};
use marker_pose_core::{FilteredPose, RawPose};
use nalgebra::{UnitQuaternion, Vector3};
use std::collections::HashMap;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Everything remembered about one marker between frames.
///
/// Created on the first observation of an id; only [`FilterBank::clear`] and
/// [`FilterBank::clear_all`] remove it.
#[derive(Clone, Debug)]
pub struct FilterState {
    window: WindowAverage,
    low_pass: OneEuroFilter,
    rotation: Option<UnitQuaternion<f64>>,
    translation: Option<Vector3<f64>>,
    updates: u64,
}

impl FilterState {
    fn new(params: &FilterParams) -> Self {
        Self {
            window: WindowAverage::new(params.window_size),
            low_pass: OneEuroFilter::new(OneEuroParams {
                min_cutoff: params.effective_min_cutoff(),
                beta: params.beta,
                d_cutoff: params.d_cutoff,
            }),
            rotation: None,
            translation: None,
            updates: 0,
        }
    }

    /// Samples currently held by the window average.
    #[inline]
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Last filtered rotation.
    #[inline]
    pub fn rotation(&self) -> Option<UnitQuaternion<f64>> {
        self.rotation
    }

    /// Last filtered translation.
    #[inline]
    pub fn translation(&self) -> Option<Vector3<f64>> {
        self.translation
    }

    /// Low-passed translational velocity (stays zero in window-only mode).
    #[inline]
    pub fn velocity(&self) -> Vector3<f64> {
        self.low_pass.velocity()
    }

    #[inline]
    pub fn last_timestamp(&self) -> Option<f64> {
        self.low_pass.last_timestamp()
    }

    /// Adaptive cutoff of the last low-pass update.
    #[inline]
    pub fn last_cutoff(&self) -> Option<f64> {
        self.low_pass.last_cutoff()
    }

    /// Number of observations folded into this state.
    #[inline]
    pub fn updates(&self) -> u64 {
        self.updates
    }

    fn update(
        &mut self,
        params: &FilterParams,
        rotation: UnitQuaternion<f64>,
        translation: Vector3<f64>,
        timestamp: f64,
    ) -> (UnitQuaternion<f64>, Vector3<f64>) {
        // Stage A: translation only, rotation untouched.
        let translation = match params.mode {
            FilterMode::Chained | FilterMode::WindowOnly => self.window.push(translation),
            FilterMode::Adaptive => translation,
        };

        // Stage B: OneEuro on translation, SLERP on rotation.
        let (rot, trans) = match params.mode {
            FilterMode::WindowOnly => (rotation, translation),
            FilterMode::Chained | FilterMode::Adaptive => {
                let trans = self.low_pass.filter(translation, timestamp);
                let rot = match self.rotation {
                    Some(prev) => blend_rotation(&prev, &rotation, params.rotation_blend),
                    None => rotation,
                };
                (rot, trans)
            }
        };

        self.rotation = Some(rot);
        self.translation = Some(trans);
        self.updates += 1;
        (rot, trans)
    }
}

/// Temporal filter chain for every marker seen so far.
///
/// The bank is the single owner of per-marker state; whoever owns the bank
/// is its only writer.
#[derive(Clone, Debug)]
pub struct FilterBank {
    params: FilterParams,
    states: HashMap<u32, FilterState>,
}

impl FilterBank {
    pub fn new(params: FilterParams) -> Result<Self, FilterConfigError> {
        params.validate()?;
        Ok(Self {
            params,
            states: HashMap::new(),
        })
    }

    #[inline]
    pub fn params(&self) -> &FilterParams {
        &self.params
    }

    /// Filter one raw pose observed at `timestamp` (seconds).
    ///
    /// The pose must already be in the consumer axis convention; state for a
    /// given id is always interpreted in that space.
    pub fn filter(&mut self, pose: &RawPose, timestamp: f64) -> FilteredPose {
        let params = &self.params;
        let state = self.states.entry(pose.marker_id).or_insert_with(|| {
            log::trace!("new filter state for marker {}", pose.marker_id);
            FilterState::new(params)
        });
        let (rot, trans) = state.update(params, pose.quaternion(), pose.translation, timestamp);
        FilteredPose::from_parts(pose.marker_id, rot, trans)
    }

    /// Filter every pose of one frame; output order follows input order.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, poses), fields(poses = poses.len()))
    )]
    pub fn filter_frame(&mut self, poses: &[RawPose], timestamp: f64) -> Vec<FilteredPose> {
        poses.iter().map(|p| self.filter(p, timestamp)).collect()
    }

    /// Forget everything about `marker_id`. Returns whether state existed.
    pub fn clear(&mut self, marker_id: u32) -> bool {
        let removed = self.states.remove(&marker_id).is_some();
        if removed {
            log::debug!("cleared filter state for marker {marker_id}");
        }
        removed
    }

    pub fn clear_all(&mut self) {
        if !self.states.is_empty() {
            log::debug!("cleared filter state for {} markers", self.states.len());
        }
        self.states.clear();
    }

    #[inline]
    pub fn state(&self, marker_id: u32) -> Option<&FilterState> {
        self.states.get(&marker_id)
    }

    #[inline]
    pub fn contains(&self, marker_id: u32) -> bool {
        self.states.contains_key(&marker_id)
    }

    /// Number of markers with resident state.
    #[inline]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
