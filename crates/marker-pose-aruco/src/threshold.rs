//! Thresholding utilities: global Otsu for cell sampling, local-mean
//! adaptive threshold for candidate segmentation.

use marker_pose_core::GrayImageView;

/// Compute Otsu threshold from a set of sample intensities.
pub(crate) fn otsu_threshold_from_samples(samples: &[u8]) -> u8 {
    if samples.is_empty() {
        return 127;
    }

    let mut min_v = 255u8;
    let mut max_v = 0u8;
    for &v in samples {
        min_v = min_v.min(v);
        max_v = max_v.max(v);
    }
    if min_v == max_v {
        return min_v;
    }

    let mut hist = [0u32; 256];
    for &v in samples {
        hist[v as usize] += 1;
    }
    let nonzero_bins = hist.iter().filter(|&&h| h > 0).count();
    if nonzero_bins <= 2 {
        return ((min_v as u16 + max_v as u16) / 2) as u8;
    }

    let total = samples.len() as f64;
    let sum_total: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &h)| i as f64 * h as f64)
        .sum();

    let mut sum_b = 0f64;
    let mut w_b = 0f64;
    let mut best_var = -1f64;
    let mut best_t = 127u8;

    for (t, &h) in hist.iter().enumerate() {
        w_b += h as f64;
        if w_b < 1.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f < 1.0 {
            break;
        }

        sum_b += t as f64 * h as f64;
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;

        let var_between = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var_between > best_var {
            best_var = var_between;
            best_t = t as u8;
        }
    }

    best_t
}

/// Summed-area table with a zero row/column in front
/// (`(width + 1) * (height + 1)` entries).
struct IntegralImage {
    width: usize,
    sums: Vec<u64>,
}

impl IntegralImage {
    fn new(img: &GrayImageView<'_>) -> Self {
        let w1 = img.width + 1;
        let mut sums = vec![0u64; w1 * (img.height + 1)];
        for y in 0..img.height {
            let mut row = 0u64;
            for x in 0..img.width {
                row += img.data[y * img.width + x] as u64;
                sums[(y + 1) * w1 + x + 1] = sums[y * w1 + x + 1] + row;
            }
        }
        Self {
            width: img.width,
            sums,
        }
    }

    /// Sum over the half-open box `[x0, x1) x [y0, y1)`.
    #[inline]
    fn box_sum(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> u64 {
        let w1 = self.width + 1;
        self.sums[y1 * w1 + x1] + self.sums[y0 * w1 + x0]
            - self.sums[y0 * w1 + x1]
            - self.sums[y1 * w1 + x0]
    }
}

/// Binary mask (`1` = dark) where a pixel is darker than the mean of its
/// `window x window` neighbourhood minus `offset`.
///
/// The window is clamped at the image border. `window` is rounded up to an
/// odd size of at least 3.
pub(crate) fn adaptive_threshold(img: &GrayImageView<'_>, window: usize, offset: f32) -> Vec<u8> {
    let (w, h) = (img.width, img.height);
    let Some(area) = w.checked_mul(h) else {
        return Vec::new();
    };
    let mut mask = vec![0u8; area];
    if area == 0 || img.data.len() < area {
        return mask;
    }

    let window = (window.max(3)) | 1;
    let r = window / 2;
    let integral = IntegralImage::new(img);

    for y in 0..h {
        let y0 = y.saturating_sub(r);
        let y1 = (y + r + 1).min(h);
        for x in 0..w {
            let x0 = x.saturating_sub(r);
            let x1 = (x + r + 1).min(w);
            let area = ((x1 - x0) * (y1 - y0)) as f32;
            let mean = integral.box_sum(x0, y0, x1, y1) as f32 / area;
            if (img.data[y * w + x] as f32) < mean - offset {
                mask[y * w + x] = 1;
            }
        }
    }

    mask
}
