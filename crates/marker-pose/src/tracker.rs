//! Synchronous detect → solve → convert → filter pipeline.

use crate::config::{ConfigError, TrackerConfig};
use crate::pose::PoseEstimator;
use marker_pose_aruco::{DetectedMarker, MarkerDetector};
use marker_pose_core::{coords, CameraIntrinsics, FilteredPose, ImageView, RawPose};
use marker_pose_filter::FilterBank;
use std::collections::BTreeSet;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Full per-frame pipeline for one camera.
///
/// Owns the only copy of per-marker filter state, so frames must be fed
/// sequentially; [`crate::TrackingService`] enforces that across threads.
#[derive(Debug)]
pub struct MarkerTracker {
    config: TrackerConfig,
    allowed_ids: BTreeSet<u32>,
    detector: MarkerDetector,
    estimator: PoseEstimator,
    filters: FilterBank,
}

impl MarkerTracker {
    pub fn new(config: TrackerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let dict = config.resolve_dictionary()?;
        let detector = MarkerDetector::new(dict, config.detector.clone())?;
        let filters = FilterBank::new(config.filter.clone())?;
        log::debug!(
            "tracker ready: dictionary {}, ids {:?}, marker length {} m, mode {:?}",
            dict.name,
            config.allowed_ids,
            config.marker_length,
            config.filter.mode
        );
        Ok(Self {
            allowed_ids: config.allowed_ids.clone(),
            estimator: PoseEstimator::new(config.marker_length),
            config,
            detector,
            filters,
        })
    }

    #[inline]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    #[inline]
    pub fn filters(&self) -> &FilterBank {
        &self.filters
    }

    /// Detected markers whose id is in the allowed set, sorted by id.
    pub fn detect_allowed(&self, image: &ImageView<'_>) -> Vec<DetectedMarker> {
        let mut markers = self.detector.detect(image);
        markers.retain(|m| self.allowed_ids.contains(&m.id));
        markers
    }

    /// Unfiltered detection-space poses of the allowed markers in `image`.
    ///
    /// Does not touch filter state.
    pub fn detect_raw(
        &self,
        image: &ImageView<'_>,
        intrinsics: &CameraIntrinsics,
    ) -> Vec<RawPose> {
        if let Err(err) = intrinsics.validate() {
            log::debug!("skipping frame: {err}");
            return Vec::new();
        }
        let markers = self.detect_allowed(image);
        self.estimator.estimate_all(&markers, intrinsics)
    }

    /// Process one frame observed at `timestamp` seconds.
    ///
    /// Returns one filtered, consumer-space pose per allowed marker found in
    /// this frame, sorted by id. Markers missing from the frame produce no
    /// entry but keep their filter state.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, image, intrinsics), fields(w = image.width, h = image.height))
    )]
    pub fn process(
        &mut self,
        image: &ImageView<'_>,
        intrinsics: &CameraIntrinsics,
        timestamp: f64,
    ) -> Vec<FilteredPose> {
        let consumer: Vec<RawPose> = self
            .detect_raw(image, intrinsics)
            .iter()
            .map(coords::pose_to_consumer)
            .collect();
        let mut out = self.filters.filter_frame(&consumer, timestamp);
        out.sort_by_key(|p| p.marker_id);
        out
    }

    /// Drop the filter state of one marker. Returns whether it existed.
    pub fn clear_marker(&mut self, marker_id: u32) -> bool {
        self.filters.clear(marker_id)
    }

    pub fn clear_all(&mut self) {
        self.filters.clear_all();
    }
}
