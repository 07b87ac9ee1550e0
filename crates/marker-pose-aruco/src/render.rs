//! Synthetic marker images for tests, demos and printing.

use crate::Dictionary;
use marker_pose_core::{homography_from_4pt, GrayImage};
use nalgebra::Point2;

/// Border width in cells used by rendered markers.
pub const RENDER_BORDER_BITS: usize = 1;

const BLACK: u8 = 0;
const WHITE: u8 = 255;

#[inline]
fn cell_value(code: u64, bits: usize, border: usize, cx: usize, cy: usize) -> u8 {
    let cells = bits + 2 * border;
    if cx < border || cy < border || cx + border >= cells || cy + border >= cells {
        return BLACK;
    }
    let idx = (cy - border) * bits + (cx - border);
    if (code >> idx) & 1 == 1 {
        WHITE
    } else {
        BLACK
    }
}

/// Axis-aligned marker with `quiet_cells` of white margin on every side.
///
/// Cells are `cell_px` pixels wide. Returns `None` for an unknown id or a zero
/// cell size.
pub fn draw_marker(
    dict: &Dictionary,
    id: u32,
    cell_px: usize,
    quiet_cells: usize,
) -> Option<GrayImage> {
    let code = dict.code(id)?;
    if cell_px == 0 {
        return None;
    }
    let bits = dict.marker_size;
    let cells = bits + 2 * RENDER_BORDER_BITS;
    let side = (cells + 2 * quiet_cells) * cell_px;
    let mut img = GrayImage::filled(side, side, WHITE);

    for cy in 0..cells {
        for cx in 0..cells {
            let value = cell_value(code, bits, RENDER_BORDER_BITS, cx, cy);
            if value == WHITE {
                continue;
            }
            let x0 = (cx + quiet_cells) * cell_px;
            let y0 = (cy + quiet_cells) * cell_px;
            for y in y0..y0 + cell_px {
                let row = &mut img.data[y * side + x0..y * side + x0 + cell_px];
                row.fill(value);
            }
        }
    }

    Some(img)
}

/// Paint marker `id` into `canvas` so that its own TL, TR, BR, BL outer
/// corners land on `corners` (continuous pixel coordinates, pixel centers at
/// integers). Each pixel averages 2x2 sub-samples.
///
/// Returns `false` if the id is unknown or the quad is degenerate.
pub fn warp_marker(
    canvas: &mut GrayImage,
    dict: &Dictionary,
    id: u32,
    corners: &[Point2<f32>; 4],
) -> bool {
    let Some(code) = dict.code(id) else {
        return false;
    };
    let bits = dict.marker_size;
    let cells = bits + 2 * RENDER_BORDER_BITS;
    let c = cells as f32;
    let grid = [
        Point2::new(0.0, 0.0),
        Point2::new(c, 0.0),
        Point2::new(c, c),
        Point2::new(0.0, c),
    ];
    let Some(inv) = homography_from_4pt(corners, &grid) else {
        return false;
    };

    let min_x = corners.iter().map(|p| p.x).fold(f32::INFINITY, f32::min).floor().max(0.0) as usize;
    let min_y = corners.iter().map(|p| p.y).fold(f32::INFINITY, f32::min).floor().max(0.0) as usize;
    let max_x = corners.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max).ceil();
    let max_y = corners.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max).ceil();
    if max_x < 0.0 || max_y < 0.0 {
        return true;
    }
    let max_x = (max_x as usize).min(canvas.width.saturating_sub(1));
    let max_y = (max_y as usize).min(canvas.height.saturating_sub(1));

    const OFFSETS: [f32; 2] = [-0.25, 0.25];
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let background = canvas.data[y * canvas.width + x] as f32;
            let mut acc = 0.0f32;
            for oy in OFFSETS {
                for ox in OFFSETS {
                    let g = inv.apply(Point2::new(x as f32 + ox, y as f32 + oy));
                    if g.x >= 0.0 && g.y >= 0.0 && g.x < c && g.y < c {
                        let v = cell_value(code, bits, RENDER_BORDER_BITS, g.x as usize, g.y as usize);
                        acc += v as f32;
                    } else {
                        acc += background;
                    }
                }
            }
            canvas.data[y * canvas.width + x] = (acc / 4.0).round() as u8;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::DICT_4X4_50;

    #[test]
    fn drawn_marker_has_black_border_and_quiet_zone() {
        let img = draw_marker(&DICT_4X4_50, 3, 4, 1).expect("id 3 exists");
        assert_eq!(img.width, 32);
        // quiet zone
        assert_eq!(img.data[0], WHITE);
        // top-left border cell
        assert_eq!(img.data[5 * 32 + 5], BLACK);
        assert!(draw_marker(&DICT_4X4_50, 99, 4, 1).is_none());
    }

    #[test]
    fn warp_matches_draw_for_axis_aligned_quad() {
        let drawn = draw_marker(&DICT_4X4_50, 11, 8, 1).expect("id 11 exists");
        let mut canvas = GrayImage::filled(drawn.width, drawn.height, WHITE);
        let lo = 8.0 - 0.5;
        let hi = 56.0 - 0.5;
        let corners = [
            Point2::new(lo, lo),
            Point2::new(hi, lo),
            Point2::new(hi, hi),
            Point2::new(lo, hi),
        ];
        assert!(warp_marker(&mut canvas, &DICT_4X4_50, 11, &corners));
        // Cell centers agree exactly; only edge pixels may differ.
        for cy in 0..6 {
            for cx in 0..6 {
                let x = 8 + cx * 8 + 4;
                let y = 8 + cy * 8 + 4;
                assert_eq!(canvas.data[y * canvas.width + x], drawn.data[y * drawn.width + x]);
            }
        }
    }
}
