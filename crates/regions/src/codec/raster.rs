//! Scanline polygon rasterization.
//!
//! Pixels are sampled at their centers (x + 0.5, y + 0.5). Decoded rings
//! have integer vertices, so a center never lies on an edge and boundary
//! ownership is unambiguous: a pixel belongs to whichever side the fill
//! assigns it.

use image::{GrayImage, Luma};

use crate::types::BoundingBox;

/// Which interior test the fill uses.
///
/// `EvenOdd` is the codec's canonical rule; `NonZero` keeps every lobe of a
/// self-overlapping outline and is used for freehand input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillRule {
    #[default]
    EvenOdd,
    NonZero,
}

fn is_inside(winding: i32, rule: FillRule) -> bool {
    match rule {
        FillRule::EvenOdd => winding % 2 != 0,
        FillRule::NonZero => winding != 0,
    }
}

/// Rasterize a set of rings into a binary image framed by `bbox`.
///
/// Ring coordinates are global; the output raster is bbox-local.
pub(crate) fn fill_rings(rings: &[&[[f32; 2]]], bbox: &BoundingBox, rule: FillRule) -> GrayImage {
    let mut out = GrayImage::new(bbox.width, bbox.height);
    let mut crossings: Vec<(f32, i32)> = Vec::new();

    for py in 0..bbox.height {
        let sample_y = bbox.top as f32 + py as f32 + 0.5;
        crossings.clear();

        for ring in rings {
            let n = ring.len();
            if n < 3 {
                continue;
            }
            for i in 0..n {
                let [x1, y1] = ring[i];
                let [x2, y2] = ring[(i + 1) % n];
                if y1 == y2 {
                    continue;
                }
                // half-open span so shared vertices count once
                let (y_min, y_max, winding) =
                    if y1 < y2 { (y1, y2, 1) } else { (y2, y1, -1) };
                if sample_y < y_min || sample_y >= y_max {
                    continue;
                }
                let t = (sample_y - y1) / (y2 - y1);
                crossings.push((x1 + t * (x2 - x1), winding));
            }
        }

        crossings
            .sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut winding = 0i32;
        let mut span_start = 0.0f32;
        for &(x, w) in &crossings {
            let was_inside = is_inside(winding, rule);
            winding += w;
            let now_inside = is_inside(winding, rule);
            if !was_inside && now_inside {
                span_start = x;
            } else if was_inside && !now_inside {
                fill_span(&mut out, bbox, py, span_start, x);
            }
        }
    }
    out
}

/// Set the pixels of row `py` whose centers lie strictly inside
/// (x_start, x_end), global coordinates.
fn fill_span(out: &mut GrayImage, bbox: &BoundingBox, py: u32, x_start: f32, x_end: f32) {
    let left = bbox.left as f32;
    let first = ((x_start - left - 0.5).floor() as i64 + 1).max(0);
    let last = ((x_end - left - 0.5).ceil() as i64 - 1).min(bbox.width as i64 - 1);
    for px in first..=last {
        out.put_pixel(px as u32, py, Luma([255u8]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_foreground(img: &GrayImage) -> u32 {
        img.pixels().filter(|p| p.0[0] > 0).count() as u32
    }

    #[test]
    fn test_fill_square() {
        let ring: Vec<[f32; 2]> =
            vec![[2.0, 2.0], [8.0, 2.0], [8.0, 8.0], [2.0, 8.0]];
        let bbox = BoundingBox::new(0, 0, 10, 10);
        let img = fill_rings(&[&ring], &bbox, FillRule::EvenOdd);
        assert_eq!(count_foreground(&img), 36);
        assert_eq!(img.get_pixel(2, 2).0[0], 255);
        assert_eq!(img.get_pixel(7, 7).0[0], 255);
        assert_eq!(img.get_pixel(8, 8).0[0], 0);
    }

    #[test]
    fn test_fill_respects_hole_ring() {
        let outer: Vec<[f32; 2]> =
            vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]];
        // opposite winding
        let hole: Vec<[f32; 2]> =
            vec![[3.0, 3.0], [3.0, 7.0], [7.0, 7.0], [7.0, 3.0]];
        let bbox = BoundingBox::new(0, 0, 10, 10);
        let img = fill_rings(&[&outer, &hole], &bbox, FillRule::EvenOdd);
        assert_eq!(count_foreground(&img), 100 - 16);
        assert_eq!(img.get_pixel(5, 5).0[0], 0);
    }

    #[test]
    fn test_nonzero_keeps_overlap() {
        // two same-winding squares overlapping in the middle
        let a: Vec<[f32; 2]> = vec![[0.0, 0.0], [6.0, 0.0], [6.0, 6.0], [0.0, 6.0]];
        let b: Vec<[f32; 2]> = vec![[4.0, 0.0], [10.0, 0.0], [10.0, 6.0], [4.0, 6.0]];
        let bbox = BoundingBox::new(0, 0, 10, 6);

        let even_odd = fill_rings(&[&a, &b], &bbox, FillRule::EvenOdd);
        let non_zero = fill_rings(&[&a, &b], &bbox, FillRule::NonZero);

        // even-odd drops the doubly covered strip, non-zero keeps it
        assert_eq!(count_foreground(&even_odd), 60 - 2 * 12);
        assert_eq!(count_foreground(&non_zero), 60 - 12);
    }

    #[test]
    fn test_fill_with_offset_bbox() {
        let ring: Vec<[f32; 2]> =
            vec![[100.0, 50.0], [104.0, 50.0], [104.0, 53.0], [100.0, 53.0]];
        let bbox = BoundingBox::new(50, 100, 4, 3);
        let img = fill_rings(&[&ring], &bbox, FillRule::EvenOdd);
        assert_eq!(count_foreground(&img), 12);
    }
}
