//! Bit decoding of a candidate quad through its corner homography.

use crate::threshold::otsu_threshold_from_samples;
use marker_pose_core::{homography_from_4pt, sample_bilinear, GrayImageView, Homography};
use nalgebra::Point2;

/// Observed cell grid of one candidate.
#[derive(Clone, Copy, Debug)]
pub(crate) struct MarkerObservation {
    /// Inner bits, row-major in the candidate's sampled orientation, white = 1.
    pub code: u64,
    /// Fraction of border cells read as black.
    pub border_score: f32,
    /// Whether polarity was flipped (white border on dark background).
    pub inverted: bool,
}

/// Fractions of a cell side where sub-samples are taken (central region only).
const CELL_SUBSAMPLES: [f32; 3] = [0.3, 0.5, 0.7];
const THRESH_SUBDIV: usize = 3;

/// Precomputed sample pattern in grid units (`0..cells` on both axes).
#[derive(Clone, Debug)]
pub(crate) struct QuadDecoder {
    bits: usize,
    border: usize,
    cells: usize,
    min_border_score: f32,
    allow_inverted: bool,
    cell_points: Vec<[Point2<f32>; 9]>,
    threshold_points: Vec<Point2<f32>>,
}

impl QuadDecoder {
    pub fn new(bits: usize, border: usize, min_border_score: f32, allow_inverted: bool) -> Option<Self> {
        if bits == 0 || bits * bits > 64 {
            return None;
        }
        let cells = bits + 2 * border;

        let mut cell_points = Vec::with_capacity(cells * cells);
        for cy in 0..cells {
            for cx in 0..cells {
                let mut pts = [Point2::origin(); 9];
                for (k, p) in pts.iter_mut().enumerate() {
                    *p = Point2::new(
                        cx as f32 + CELL_SUBSAMPLES[k % 3],
                        cy as f32 + CELL_SUBSAMPLES[k / 3],
                    );
                }
                cell_points.push(pts);
            }
        }

        let grid = cells * THRESH_SUBDIV;
        let step = cells as f32 / grid as f32;
        let mut threshold_points = Vec::with_capacity(grid * grid);
        for ty in 0..grid {
            for tx in 0..grid {
                threshold_points.push(Point2::new(
                    (tx as f32 + 0.5) * step,
                    (ty as f32 + 0.5) * step,
                ));
            }
        }

        Some(Self {
            bits,
            border,
            cells,
            min_border_score,
            allow_inverted,
            cell_points,
            threshold_points,
        })
    }

    /// Map from grid units to the image for a clockwise quad.
    ///
    /// Grid corner `(0, 0)` lands on `corners[0]`, `(cells, 0)` on `corners[1]`.
    pub fn grid_to_image(&self, corners: &[Point2<f32>; 4]) -> Option<Homography> {
        let c = self.cells as f32;
        let grid = [
            Point2::new(0.0, 0.0),
            Point2::new(c, 0.0),
            Point2::new(c, c),
            Point2::new(0.0, c),
        ];
        homography_from_4pt(&grid, corners)
    }

    pub fn decode(
        &self,
        img: &GrayImageView<'_>,
        corners: &[Point2<f32>; 4],
    ) -> Option<MarkerObservation> {
        let h = self.grid_to_image(corners)?;

        let mut samples = Vec::with_capacity(self.cell_points.len());
        for pts in &self.cell_points {
            let sum: f32 = pts
                .iter()
                .map(|p| {
                    let q = h.apply(*p);
                    sample_bilinear(img, q.x, q.y)
                })
                .sum();
            samples.push((sum / pts.len() as f32).round().clamp(0.0, 255.0) as u8);
        }

        let thr_samples: Vec<u8> = self
            .threshold_points
            .iter()
            .map(|p| {
                let q = h.apply(*p);
                sample_bilinear(img, q.x, q.y).round().clamp(0.0, 255.0) as u8
            })
            .collect();

        decode_samples(
            &samples,
            &thr_samples,
            self.cells,
            self.bits,
            self.border,
            self.min_border_score,
            self.allow_inverted,
        )
    }
}

fn decode_samples(
    samples: &[u8],
    thr_samples: &[u8],
    cells: usize,
    bits: usize,
    border: usize,
    min_border_score: f32,
    allow_inverted: bool,
) -> Option<MarkerObservation> {
    if samples.len() != cells * cells {
        return None;
    }

    let thr = if thr_samples.is_empty() {
        otsu_threshold_from_samples(samples)
    } else {
        otsu_threshold_from_samples(thr_samples)
    };

    let polarities: &[bool] = if allow_inverted {
        &[false, true]
    } else {
        &[false]
    };

    let mut best: Option<MarkerObservation> = None;

    for &inverted in polarities {
        let mut border_ok = 0u32;
        let mut border_total = 0u32;
        let mut code: u64 = 0;
        let use_border = border > 0;

        for cy in 0..cells {
            for cx in 0..cells {
                let mut is_black = samples[cy * cells + cx] < thr;
                if inverted {
                    is_black = !is_black;
                }

                let is_border = use_border
                    && (cx < border || cy < border || cx + border >= cells || cy + border >= cells);
                if is_border {
                    border_total += 1;
                    if is_black {
                        border_ok += 1;
                    }
                } else if !is_black {
                    let idx = (cy - border) * bits + (cx - border);
                    code |= 1u64 << idx;
                }
            }
        }

        let border_score = if use_border {
            border_ok as f32 / border_total.max(1) as f32
        } else {
            1.0
        };
        if border_score < min_border_score {
            continue;
        }

        if best.is_none_or(|b| border_score > b.border_score) {
            best = Some(MarkerObservation {
                code,
                border_score,
                inverted,
            });
        }
    }

    best
}
