//! Full-image marker detection: threshold, components, quads, decoding.

use crate::decode::QuadDecoder;
use crate::quad::{extract_quad, label_components};
use crate::threshold::adaptive_threshold;
use crate::{Dictionary, Matcher};
use marker_pose_core::{GrayImageView, ImageView};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Tunables of [`MarkerDetector`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    /// Side of the local-mean window used for adaptive thresholding (pixels).
    pub threshold_window: usize,
    /// A pixel is dark when it is below the local mean minus this offset.
    pub threshold_offset: f32,
    /// Minimal quad side length in pixels.
    pub min_side_px: f32,
    /// Marker border width in cells (OpenCV uses 1).
    pub border_bits: usize,
    /// Require border-black ratio >= this.
    pub min_border_score: f32,
    /// Maximum Hamming distance for dictionary matching.
    pub max_hamming: u8,
    /// Also accept white-bordered markers on a dark background.
    pub detect_inverted: bool,
    /// Fit lines to quad edges for sub-pixel corners.
    pub refine_corners: bool,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            threshold_window: 31,
            threshold_offset: 7.0,
            min_side_px: 12.0,
            border_bits: 1,
            min_border_score: 0.85,
            max_hamming: 1,
            detect_inverted: false,
            refine_corners: true,
        }
    }
}

/// Invalid detector configuration.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DetectorConfigError {
    #[error("threshold window must be >= 3 (got {0})")]
    ThresholdWindow(usize),
    #[error("threshold offset must be finite (got {0})")]
    ThresholdOffset(f32),
    #[error("min_side_px must be finite and >= 4 (got {0})")]
    MinSide(f32),
    #[error("border_bits must be >= 1 (got {0})")]
    BorderBits(usize),
    #[error("min_border_score must be in [0, 1] (got {0})")]
    BorderScore(f32),
    #[error("dictionary {name} is not supported (marker size {marker_size}, {len} codes)")]
    UnsupportedDictionary {
        name: &'static str,
        marker_size: usize,
        len: usize,
    },
}

impl DetectorParams {
    pub fn validate(&self) -> Result<(), DetectorConfigError> {
        if self.threshold_window < 3 {
            return Err(DetectorConfigError::ThresholdWindow(self.threshold_window));
        }
        if !self.threshold_offset.is_finite() {
            return Err(DetectorConfigError::ThresholdOffset(self.threshold_offset));
        }
        if !self.min_side_px.is_finite() || self.min_side_px < 4.0 {
            return Err(DetectorConfigError::MinSide(self.min_side_px));
        }
        if self.border_bits == 0 {
            return Err(DetectorConfigError::BorderBits(self.border_bits));
        }
        if !(0.0..=1.0).contains(&self.min_border_score) {
            return Err(DetectorConfigError::BorderScore(self.min_border_score));
        }
        Ok(())
    }
}

/// One decoded marker in image coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedMarker {
    pub id: u32,
    /// Outer corners in the marker's own TL, TR, BR, BL order.
    pub corners: [Point2<f32>; 4],
    pub hamming: u8,
    /// Quarter turns between the sampled quad and the marker's own frame.
    pub rotation: u8,
    pub border_score: f32,
    pub inverted: bool,
}

impl DetectedMarker {
    /// Centroid of the four corners.
    pub fn center(&self) -> Point2<f32> {
        let sum = self
            .corners
            .iter()
            .fold(nalgebra::Vector2::zeros(), |acc, p| acc + p.coords);
        Point2::from(sum / 4.0)
    }
}

/// Detects square fiducials of one dictionary in whole images.
///
/// Immutable after construction, so one detector can serve any number of
/// sequential frames.
#[derive(Clone, Debug)]
pub struct MarkerDetector {
    params: DetectorParams,
    matcher: Matcher,
    decoder: QuadDecoder,
}

impl MarkerDetector {
    pub fn new(dict: Dictionary, params: DetectorParams) -> Result<Self, DetectorConfigError> {
        params.validate()?;
        let unsupported = || DetectorConfigError::UnsupportedDictionary {
            name: dict.name,
            marker_size: dict.marker_size,
            len: dict.len(),
        };
        if dict.is_empty() {
            return Err(unsupported());
        }
        let matcher = Matcher::new(dict, params.max_hamming).ok_or_else(unsupported)?;
        let decoder = QuadDecoder::new(
            dict.marker_size,
            params.border_bits,
            params.min_border_score,
            params.detect_inverted,
        )
        .ok_or_else(unsupported)?;

        Ok(Self {
            params,
            matcher,
            decoder,
        })
    }

    #[inline]
    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    #[inline]
    pub fn dictionary(&self) -> Dictionary {
        self.matcher.dictionary()
    }

    /// Detect markers in a camera buffer.
    ///
    /// A buffer whose layout does not match its declared size yields no
    /// detections.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, image), fields(width = image.width, height = image.height))
    )]
    pub fn detect(&self, image: &ImageView<'_>) -> Vec<DetectedMarker> {
        match image.to_gray() {
            Ok(gray) => self.detect_gray(&gray.view()),
            Err(err) => {
                log::debug!("frame skipped: {err}");
                Vec::new()
            }
        }
    }

    /// Detect markers in an 8-bit grayscale image.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, gray), fields(width = gray.width, height = gray.height))
    )]
    pub fn detect_gray(&self, gray: &GrayImageView<'_>) -> Vec<DetectedMarker> {
        let area = gray.width.checked_mul(gray.height);
        if area.is_none_or(|n| n == 0 || gray.data.len() < n) {
            log::debug!("empty or truncated grayscale image");
            return Vec::new();
        }

        let p = &self.params;
        let mask = adaptive_threshold(gray, p.threshold_window, p.threshold_offset);
        let (labels, comps) = label_components(&mask, gray.width, gray.height, p.min_side_px);

        let mut out = Vec::new();
        for comp in &comps {
            let Some(quad) = extract_quad(comp, &labels, p.min_side_px, p.refine_corners) else {
                continue;
            };
            let Some(obs) = self.decoder.decode(gray, &quad) else {
                continue;
            };
            let Some(m) = self.matcher.match_code(obs.code) else {
                continue;
            };

            let rot = m.rotation as usize;
            let corners = std::array::from_fn(|i| quad[(rot + i) % 4]);
            out.push(DetectedMarker {
                id: m.id,
                corners,
                hamming: m.hamming,
                rotation: m.rotation,
                border_score: obs.border_score,
                inverted: obs.inverted,
            });
        }

        log::trace!(
            "{} components, {} decoded markers",
            comps.len(),
            out.len()
        );
        dedup_by_id_keep_best(out)
    }
}

/// Keep the lowest-Hamming, highest-border-score detection per id; output
/// sorted by id.
fn dedup_by_id_keep_best(dets: Vec<DetectedMarker>) -> Vec<DetectedMarker> {
    let mut best: HashMap<u32, DetectedMarker> = HashMap::new();
    for d in dets {
        match best.get(&d.id) {
            Some(cur)
                if (cur.hamming, -cur.border_score) <= (d.hamming, -d.border_score) => {}
            _ => {
                best.insert(d.id, d);
            }
        }
    }
    let mut out: Vec<_> = best.into_values().collect();
    out.sort_by_key(|d| d.id);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::DICT_4X4_50;
    use approx::assert_relative_eq;
    use crate::render::draw_marker;
    use marker_pose_core::{OwnedImage, PixelFormat};

    fn det(id: u32, hamming: u8, border_score: f32) -> DetectedMarker {
        DetectedMarker {
            id,
            corners: [Point2::origin(); 4],
            hamming,
            rotation: 0,
            border_score,
            inverted: false,
        }
    }

    #[test]
    fn invalid_params_are_rejected() {
        let bad = DetectorParams {
            threshold_window: 1,
            ..DetectorParams::default()
        };
        assert_eq!(
            MarkerDetector::new(DICT_4X4_50, bad).err(),
            Some(DetectorConfigError::ThresholdWindow(1))
        );

        let bad = DetectorParams {
            min_border_score: 1.5,
            ..DetectorParams::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(DetectorConfigError::BorderScore(_))
        ));
    }

    #[test]
    fn dedup_prefers_lower_hamming_then_border() {
        let out = dedup_by_id_keep_best(vec![
            det(4, 1, 1.0),
            det(4, 0, 0.9),
            det(2, 0, 0.9),
            det(2, 0, 0.95),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, 2);
        assert!((out[0].border_score - 0.95).abs() < 1e-6);
        assert_eq!(out[1].id, 4);
        assert_eq!(out[1].hamming, 0);
    }

    #[test]
    fn detects_axis_aligned_marker_in_rgb_buffer() {
        let gray = draw_marker(&DICT_4X4_50, 5, 12, 2).expect("id 5 exists");
        let rgb = OwnedImage::rgb_from_gray(&gray);
        assert_eq!(rgb.format, PixelFormat::Rgb8);

        let detector = MarkerDetector::new(DICT_4X4_50, DetectorParams::default()).expect("valid");
        let found = detector.detect(&rgb.view());
        assert_eq!(found.len(), 1);
        let m = &found[0];
        assert_eq!(m.id, 5);
        assert_eq!(m.hamming, 0);

        // quiet zone 24 px, marker 72 px: outer edges at 23.5 and 95.5
        let expected = [(23.5, 23.5), (95.5, 23.5), (95.5, 95.5), (23.5, 95.5)];
        for (c, (ex, ey)) in m.corners.iter().zip(expected) {
            assert!((c.x - ex).abs() < 1.0 && (c.y - ey).abs() < 1.0, "{c:?}");
        }
    }

    #[test]
    fn malformed_buffer_yields_no_detections() {
        let detector = MarkerDetector::new(DICT_4X4_50, DetectorParams::default()).expect("valid");
        let data = [0u8; 5];
        let view = ImageView::packed(4, 4, PixelFormat::Rgb8, &data);
        assert!(detector.detect(&view).is_empty());
    }

    #[test]
    fn overflowing_dimensions_yield_no_detections() {
        let detector = MarkerDetector::new(DICT_4X4_50, DetectorParams::default()).expect("valid");
        let data = [0u8; 16];
        let view = ImageView {
            width: usize::MAX / 2,
            height: 2,
            stride: usize::MAX / 2,
            format: PixelFormat::Rgb8,
            data: &data,
        };
        assert!(detector.detect(&view).is_empty());

        let gray = GrayImageView {
            width: usize::MAX / 2,
            height: 4,
            data: &data,
        };
        assert!(detector.detect_gray(&gray).is_empty());
    }

    #[test]
    fn params_json_fills_defaults() {
        let p: DetectorParams =
            serde_json::from_str(r#"{ "threshold_window": 15, "detect_inverted": true }"#)
                .expect("parse");
        assert_eq!(p.threshold_window, 15);
        assert!(p.detect_inverted);
        assert_eq!(p.max_hamming, DetectorParams::default().max_hamming);
        assert_relative_eq!(p.min_border_score, DetectorParams::default().min_border_score);
        p.validate().expect("valid");

        let back: DetectorParams =
            serde_json::from_str(&serde_json::to_string(&p).expect("serialize")).expect("parse");
        assert_eq!(back, p);
    }
}
