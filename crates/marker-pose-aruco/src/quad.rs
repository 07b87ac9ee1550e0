//! Candidate quads from a binary dark-pixel mask.
//!
//! Pixel centers sit at integer coordinates. Corners are returned clockwise in
//! image space (y down), starting from an arbitrary corner; the decoder later
//! rotates them into the marker's own order.

use nalgebra::{Point2, Vector2};

/// One 4-connected component of dark pixels.
#[derive(Clone, Debug)]
pub(crate) struct Component {
    pub label: u32,
    pub pixels: Vec<(u32, u32)>,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl Component {
    #[inline]
    pub fn bbox_width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    #[inline]
    pub fn bbox_height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    fn touches_border(&self, width: usize, height: usize) -> bool {
        self.min_x == 0
            || self.min_y == 0
            || self.max_x as usize + 1 >= width
            || self.max_y as usize + 1 >= height
    }
}

/// Per-pixel component labels (`0` = background) plus the components.
pub(crate) struct LabelMap {
    pub width: usize,
    pub height: usize,
    pub labels: Vec<u32>,
}

impl LabelMap {
    #[inline]
    fn label_at(&self, x: i64, y: i64) -> u32 {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return 0;
        }
        self.labels[y as usize * self.width + x as usize]
    }
}

/// Label 4-connected components of `mask != 0`.
///
/// Components touching the image border or whose bounding box is smaller than
/// `min_side_px` on either axis are labelled but not returned.
pub(crate) fn label_components(
    mask: &[u8],
    width: usize,
    height: usize,
    min_side_px: f32,
) -> (LabelMap, Vec<Component>) {
    let mut labels = vec![0u32; width * height];
    let mut comps = Vec::new();
    let mut stack: Vec<(u32, u32)> = Vec::new();
    let mut next = 1u32;

    for start in 0..width * height {
        if mask[start] == 0 || labels[start] != 0 {
            continue;
        }

        let label = next;
        next += 1;
        let sx = (start % width) as u32;
        let sy = (start / width) as u32;
        labels[start] = label;
        stack.push((sx, sy));

        let mut comp = Component {
            label,
            pixels: Vec::new(),
            min_x: sx,
            min_y: sy,
            max_x: sx,
            max_y: sy,
        };

        while let Some((x, y)) = stack.pop() {
            comp.pixels.push((x, y));
            comp.min_x = comp.min_x.min(x);
            comp.min_y = comp.min_y.min(y);
            comp.max_x = comp.max_x.max(x);
            comp.max_y = comp.max_y.max(y);

            let (xi, yi) = (x as i64, y as i64);
            for (nx, ny) in [(xi - 1, yi), (xi + 1, yi), (xi, yi - 1), (xi, yi + 1)] {
                if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                    continue;
                }
                let idx = ny as usize * width + nx as usize;
                if mask[idx] != 0 && labels[idx] == 0 {
                    labels[idx] = label;
                    stack.push((nx as u32, ny as u32));
                }
            }
        }

        let min_side = min_side_px.max(1.0);
        if comp.touches_border(width, height)
            || (comp.bbox_width() as f32) < min_side
            || (comp.bbox_height() as f32) < min_side
            || (comp.pixels.len() as f32) < 4.0 * min_side
        {
            continue;
        }
        comps.push(comp);
    }

    (
        LabelMap {
            width,
            height,
            labels,
        },
        comps,
    )
}

#[inline]
fn to_point(p: (u32, u32)) -> Point2<f32> {
    Point2::new(p.0 as f32, p.1 as f32)
}

fn farthest_from(pixels: &[(u32, u32)], from: Point2<f32>) -> Option<Point2<f32>> {
    pixels
        .iter()
        .map(|&p| to_point(p))
        .map(|p| ((p - from).norm_squared(), p))
        .fold(None, |best: Option<(f32, Point2<f32>)>, cur| match best {
            Some(b) if b.0 >= cur.0 => Some(b),
            _ => Some(cur),
        })
        .map(|(_, p)| p)
}

/// Four extreme pixels: farthest from the centroid, farthest from that one,
/// then the extremes on either side of the diagonal they span.
fn extreme_corners(pixels: &[(u32, u32)]) -> Option<[Point2<f32>; 4]> {
    if pixels.len() < 4 {
        return None;
    }
    let n = pixels.len() as f32;
    let (sx, sy) = pixels
        .iter()
        .fold((0.0f32, 0.0f32), |(ax, ay), &(x, y)| (ax + x as f32, ay + y as f32));
    let centroid = Point2::new(sx / n, sy / n);

    let p0 = farthest_from(pixels, centroid)?;
    let p2 = farthest_from(pixels, p0)?;
    let diag = p2 - p0;
    if diag.norm() < 1.0 {
        return None;
    }

    let mut pos: Option<(f32, Point2<f32>)> = None;
    let mut neg: Option<(f32, Point2<f32>)> = None;
    for &px in pixels {
        let p = to_point(px);
        let d = p - p0;
        let side = diag.x * d.y - diag.y * d.x;
        if side > 0.0 && pos.is_none_or(|b| side > b.0) {
            pos = Some((side, p));
        }
        if side < 0.0 && neg.is_none_or(|b| side < b.0) {
            neg = Some((side, p));
        }
    }

    let (_, p1) = pos?;
    let (_, p3) = neg?;
    Some([p0, p1, p2, p3])
}

/// Twice the signed area; positive for clockwise order in image space.
pub(crate) fn signed_area2(q: &[Point2<f32>; 4]) -> f32 {
    (0..4)
        .map(|i| {
            let a = q[i];
            let b = q[(i + 1) % 4];
            a.x * b.y - b.x * a.y
        })
        .sum()
}

/// Reorder in place so the quad winds clockwise in image space.
pub(crate) fn make_clockwise(q: &mut [Point2<f32>; 4]) {
    if signed_area2(q) < 0.0 {
        q.swap(1, 3);
    }
}

/// Strictly convex with clockwise winding and every side at least `min_side`.
pub(crate) fn is_valid_quad(q: &[Point2<f32>; 4], min_side: f32) -> bool {
    if q.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return false;
    }
    for i in 0..4 {
        let a = q[i];
        let b = q[(i + 1) % 4];
        let c = q[(i + 2) % 4];
        if (b - a).norm() < min_side {
            return false;
        }
        let e1 = b - a;
        let e2 = c - b;
        if e1.x * e2.y - e1.y * e2.x <= 0.0 {
            return false;
        }
    }
    true
}

/// Line `n · p = d` with unit normal `n`.
#[derive(Clone, Copy, Debug)]
struct Line {
    n: Vector2<f32>,
    d: f32,
}

impl Line {
    fn intersect(&self, other: &Line) -> Option<Point2<f32>> {
        let det = self.n.x * other.n.y - self.n.y * other.n.x;
        // Sides closer than ~6 degrees to parallel do not form a usable corner.
        if det.abs() < 0.1 {
            return None;
        }
        Some(Point2::new(
            (self.d * other.n.y - other.d * self.n.y) / det,
            (self.n.x * other.d - other.n.x * self.d) / det,
        ))
    }
}

/// Total least squares line through `pts`.
fn fit_line(pts: &[Point2<f32>]) -> Option<(Point2<f32>, Vector2<f32>)> {
    if pts.len() < 3 {
        return None;
    }
    let n = pts.len() as f32;
    let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), p| (ax + p.x, ay + p.y));
    let m = Point2::new(sx / n, sy / n);

    let (mut sxx, mut syy, mut sxy) = (0.0f32, 0.0f32, 0.0f32);
    for p in pts {
        let d = p - m;
        sxx += d.x * d.x;
        syy += d.y * d.y;
        sxy += d.x * d.y;
    }
    let theta = 0.5 * (2.0 * sxy).atan2(sxx - syy);
    let dir = Vector2::new(theta.cos(), theta.sin());
    Some((m, dir))
}

fn boundary_pixels(comp: &Component, labels: &LabelMap) -> Vec<Point2<f32>> {
    comp.pixels
        .iter()
        .filter(|&&(x, y)| {
            let (x, y) = (x as i64, y as i64);
            [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)]
                .iter()
                .any(|&(nx, ny)| labels.label_at(nx, ny) != comp.label)
        })
        .map(|&p| to_point(p))
        .collect()
}

/// Refine extreme-pixel corners by fitting a line to each side's boundary
/// pixels and intersecting neighbouring lines.
///
/// Fitted lines run through dark pixel centers, half a pixel inside the true
/// edge, so each line is moved 0.5 px outward before intersecting.
fn refine_with_edges(
    coarse: &[Point2<f32>; 4],
    comp: &Component,
    labels: &LabelMap,
) -> Option<[Point2<f32>; 4]> {
    let boundary = boundary_pixels(comp, labels);
    let center = Point2::from(
        coarse.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords) / 4.0,
    );

    let mut lines = [Line {
        n: Vector2::zeros(),
        d: 0.0,
    }; 4];
    let mut min_len = f32::INFINITY;

    for (i, line) in lines.iter_mut().enumerate() {
        let a = coarse[i];
        let b = coarse[(i + 1) % 4];
        let edge = b - a;
        let len = edge.norm();
        if len < 1.0 {
            return None;
        }
        min_len = min_len.min(len);
        let dir = edge / len;
        let normal = Vector2::new(-dir.y, dir.x);
        let tol = (0.05 * len).max(2.0);

        let support: Vec<Point2<f32>> = boundary
            .iter()
            .copied()
            .filter(|p| {
                let d = *p - a;
                let t = d.dot(&dir) / len;
                (0.15..=0.85).contains(&t) && d.dot(&normal).abs() <= tol
            })
            .collect();

        let (m, fit_dir) = fit_line(&support)?;
        let mut n = Vector2::new(-fit_dir.y, fit_dir.x);
        if n.dot(&(center - m)) > 0.0 {
            n = -n;
        }
        *line = Line {
            n,
            d: n.dot(&m.coords) + 0.5,
        };
    }

    let max_shift = (0.1 * min_len).max(3.0);
    let mut out = *coarse;
    for i in 0..4 {
        let prev = &lines[(i + 3) % 4];
        let p = prev.intersect(&lines[i])?;
        if (p - coarse[i]).norm() > max_shift {
            return None;
        }
        out[i] = p;
    }
    Some(out)
}

/// Push extreme pixel centers outward by half a pixel diagonal.
fn expand_extremes(coarse: &[Point2<f32>; 4]) -> [Point2<f32>; 4] {
    let center = coarse.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords) / 4.0;
    coarse.map(|p| {
        let v = p.coords - center;
        let len = v.norm();
        if len > 1e-3 {
            p + v * (std::f32::consts::FRAC_1_SQRT_2 / len)
        } else {
            p
        }
    })
}

/// Extract a clockwise quad from one component, or `None` if it is not
/// quad-shaped enough to be a marker candidate.
pub(crate) fn extract_quad(
    comp: &Component,
    labels: &LabelMap,
    min_side_px: f32,
    refine: bool,
) -> Option<[Point2<f32>; 4]> {
    let mut coarse = extreme_corners(&comp.pixels)?;
    make_clockwise(&mut coarse);
    if !is_valid_quad(&coarse, 1.0) {
        return None;
    }

    let quad = if refine {
        refine_with_edges(&coarse, comp, labels).unwrap_or_else(|| expand_extremes(&coarse))
    } else {
        expand_extremes(&coarse)
    };

    is_valid_quad(&quad, min_side_px).then_some(quad)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_polygon_mask(width: usize, height: usize, poly: &[Point2<f32>; 4]) -> Vec<u8> {
        let mut mask = vec![0u8; width * height];
        for y in 0..height {
            for x in 0..width {
                let p = Point2::new(x as f32, y as f32);
                let inside = (0..4).all(|i| {
                    let a = poly[i];
                    let b = poly[(i + 1) % 4];
                    let e = b - a;
                    let d = p - a;
                    e.x * d.y - e.y * d.x >= 0.0
                });
                if inside {
                    mask[y * width + x] = 1;
                }
            }
        }
        mask
    }

    #[test]
    fn components_skip_border_and_small_blobs() {
        let (w, h) = (30usize, 30usize);
        let mut mask = vec![0u8; w * h];
        // touches the left border
        for y in 2..20 {
            for x in 0..15 {
                mask[y * w + x] = 1;
            }
        }
        // isolated tiny blob
        mask[25 * w + 25] = 1;
        let (labels, comps) = label_components(&mask, w, h, 4.0);
        assert!(comps.is_empty());
        assert_ne!(labels.labels[5 * w + 5], 0);
        assert_ne!(labels.labels[25 * w + 25], labels.labels[5 * w + 5]);
    }

    #[test]
    fn clockwise_order_has_positive_area() {
        let mut q = [
            Point2::new(0.0, 0.0),
            Point2::new(0.0, 10.0),
            Point2::new(10.0, 10.0),
            Point2::new(10.0, 0.0),
        ];
        assert!(signed_area2(&q) < 0.0);
        make_clockwise(&mut q);
        assert!(signed_area2(&q) > 0.0);
        assert!(is_valid_quad(&q, 5.0));
        assert!(!is_valid_quad(&q, 11.0));
    }

    #[test]
    fn non_convex_quad_is_rejected() {
        let dart = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 5.0),
            Point2::new(0.0, 10.0),
            Point2::new(3.0, 5.0),
        ];
        assert!(!is_valid_quad(&dart, 1.0));
    }

    #[test]
    fn rotated_square_corners_are_recovered() {
        let (w, h) = (80usize, 80usize);
        let truth = [
            Point2::new(40.0, 12.0),
            Point2::new(66.0, 38.0),
            Point2::new(42.0, 64.0),
            Point2::new(15.0, 40.0),
        ];
        let mask = filled_polygon_mask(w, h, &truth);
        let (labels, comps) = label_components(&mask, w, h, 8.0);
        assert_eq!(comps.len(), 1);

        let quad = extract_quad(&comps[0], &labels, 8.0, true).expect("quad");
        assert!(signed_area2(&quad) > 0.0);
        for t in &truth {
            let best = quad
                .iter()
                .map(|q| (*q - *t).norm())
                .fold(f32::INFINITY, f32::min);
            assert!(best < 1.5, "corner {t:?} off by {best}");
        }
    }
}
