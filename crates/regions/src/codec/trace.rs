//! Crack-following boundary tracer.
//!
//! Walks the edges between foreground and background pixels, keeping the
//! foreground on the left, so ring vertices land on integer grid corners.
//! The shoelace area of the traced rings therefore equals the foreground
//! pixel count exactly, which is what makes the encode/decode round trip
//! lossless.

use std::collections::HashMap;

use image::{GrayImage, ImageBuffer, Luma};

pub(crate) type LabelImage = ImageBuffer<Luma<u32>, Vec<u32>>;

/// One closed ring of pixel-corner vertices.
///
/// Exterior rings carry positive signed area, hole rings negative.
pub(crate) struct TracedRing {
    pub points: Vec<[f32; 2]>,
    pub label: u32,
    pub signed_area: f64,
}

type Vertex = (i32, i32);

struct Edge {
    from: Vertex,
    to: Vertex,
    label: u32,
}

impl Edge {
    fn dir(&self) -> (i32, i32) {
        (self.to.0 - self.from.0, self.to.1 - self.from.1)
    }
}

fn cross(a: (i32, i32), b: (i32, i32)) -> i32 {
    a.0 * b.1 - a.1 * b.0
}

/// Trace every boundary ring of the mask.
///
/// `labels` must be the 4-connected component labelling of `mask` with
/// background label 0; each ring reports the label of the component whose
/// pixels emitted its edges (for hole rings, the enclosing component).
pub(crate) fn trace_rings(mask: &GrayImage, labels: &LabelImage) -> Vec<TracedRing> {
    let (width, height) = (mask.width() as i32, mask.height() as i32);
    let fg = |x: i32, y: i32| -> bool {
        x >= 0 && y >= 0 && x < width && y < height && mask.get_pixel(x as u32, y as u32).0[0] > 0
    };

    // Emit one directed edge per exposed pixel side, foreground on the left.
    // An isolated pixel traces (x,y) -> (x+1,y) -> (x+1,y+1) -> (x,y+1),
    // which is the positive orientation under the shoelace formula.
    let mut edges: Vec<Edge> = Vec::new();
    let mut outgoing: HashMap<Vertex, Vec<usize>> = HashMap::new();
    for y in 0..height {
        for x in 0..width {
            if !fg(x, y) {
                continue;
            }
            let label = labels.get_pixel(x as u32, y as u32).0[0];
            let sides: [(bool, Vertex, Vertex); 4] = [
                (!fg(x, y - 1), (x, y), (x + 1, y)),
                (!fg(x + 1, y), (x + 1, y), (x + 1, y + 1)),
                (!fg(x, y + 1), (x + 1, y + 1), (x, y + 1)),
                (!fg(x - 1, y), (x, y + 1), (x, y)),
            ];
            for (exposed, from, to) in sides {
                if exposed {
                    outgoing.entry(from).or_default().push(edges.len());
                    edges.push(Edge { from, to, label });
                }
            }
        }
    }

    // Chain edges into closed loops. Every vertex has equal in- and
    // out-degree, so a walk can only terminate by closing on its start edge.
    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();
    for start in 0..edges.len() {
        if used[start] {
            continue;
        }
        let mut vertices: Vec<Vertex> = vec![edges[start].from];
        let mut current = start;
        loop {
            used[current] = true;
            let v = edges[current].to;
            let candidates = &outgoing[&v];
            let chosen = if candidates.len() == 1 {
                candidates[0]
            } else {
                // Corner where two pixels meet diagonally: take the left
                // turn so the walk keeps hugging the pixel it came along.
                // This keeps 4-connected foreground components on separate
                // rings and merges 8-connected background into one hole.
                let din = edges[current].dir();
                *candidates
                    .iter()
                    .find(|&&i| cross(din, edges[i].dir()) > 0)
                    .unwrap_or(&candidates[0])
            };
            if used[chosen] {
                break;
            }
            vertices.push(v);
            current = chosen;
        }

        let label = edges[start].label;
        let corners = collapse_collinear(vertices);
        if corners.len() < 3 {
            continue;
        }
        let signed_area = shoelace(&corners);
        rings.push(TracedRing {
            points: corners
                .into_iter()
                .map(|(x, y)| [x as f32, y as f32])
                .collect(),
            label,
            signed_area,
        });
    }
    rings
}

/// Drop vertices interior to straight runs, wrap-around included.
fn collapse_collinear(ring: Vec<Vertex>) -> Vec<Vertex> {
    let n = ring.len();
    let mut corners = Vec::with_capacity(n);
    for i in 0..n {
        let prev = ring[(i + n - 1) % n];
        let cur = ring[i];
        let next = ring[(i + 1) % n];
        let d1 = (cur.0 - prev.0, cur.1 - prev.1);
        let d2 = (next.0 - cur.0, next.1 - cur.1);
        if cross(d1, d2) != 0 {
            corners.push(cur);
        }
    }
    corners
}

fn shoelace(ring: &[Vertex]) -> f64 {
    let n = ring.len();
    let mut sum = 0i64;
    for i in 0..n {
        let j = (i + 1) % n;
        sum += ring[i].0 as i64 * ring[j].1 as i64 - ring[j].0 as i64 * ring[i].1 as i64;
    }
    sum as f64 / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::region_labelling::{connected_components, Connectivity};

    fn labelled(mask: &GrayImage) -> LabelImage {
        connected_components(mask, Connectivity::Four, Luma([0u8]))
    }

    #[test]
    fn test_single_pixel_ring() {
        let mut mask = GrayImage::new(3, 3);
        mask.put_pixel(1, 1, Luma([255u8]));
        let rings = trace_rings(&mask, &labelled(&mask));
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].signed_area, 1.0);
        assert_eq!(rings[0].points.len(), 4);
    }

    #[test]
    fn test_square_area_is_pixel_count() {
        let mut mask = GrayImage::new(12, 12);
        for y in 1..11 {
            for x in 1..11 {
                mask.put_pixel(x, y, Luma([255u8]));
            }
        }
        let rings = trace_rings(&mask, &labelled(&mask));
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].signed_area, 100.0);
    }

    #[test]
    fn test_hole_ring_is_negative() {
        let mut mask = GrayImage::new(12, 12);
        for y in 1..11 {
            for x in 1..11 {
                mask.put_pixel(x, y, Luma([255u8]));
            }
        }
        for y in 4..8 {
            for x in 4..8 {
                mask.put_pixel(x, y, Luma([0u8]));
            }
        }
        let mut rings = trace_rings(&mask, &labelled(&mask));
        rings.sort_by(|a, b| b.signed_area.partial_cmp(&a.signed_area).unwrap());
        assert_eq!(rings.len(), 2);
        assert_eq!(rings[0].signed_area, 100.0);
        assert_eq!(rings[1].signed_area, -16.0);
        // net area is the foreground pixel count
        assert_eq!(rings[0].signed_area + rings[1].signed_area, 84.0);
    }

    #[test]
    fn test_diagonal_pixels_stay_separate() {
        let mut mask = GrayImage::new(4, 4);
        mask.put_pixel(1, 1, Luma([255u8]));
        mask.put_pixel(2, 2, Luma([255u8]));
        let rings = trace_rings(&mask, &labelled(&mask));
        assert_eq!(rings.len(), 2, "diagonal pixels are distinct components");
        assert!(rings.iter().all(|r| r.signed_area == 1.0));
    }

    #[test]
    fn test_diagonal_background_merges_into_one_hole() {
        let mut mask = GrayImage::new(6, 6);
        for y in 0..6 {
            for x in 0..6 {
                mask.put_pixel(x, y, Luma([255u8]));
            }
        }
        mask.put_pixel(2, 2, Luma([0u8]));
        mask.put_pixel(3, 3, Luma([0u8]));
        let rings = trace_rings(&mask, &labelled(&mask));
        let holes: Vec<_> = rings.iter().filter(|r| r.signed_area < 0.0).collect();
        assert_eq!(holes.len(), 1, "8-connected background is a single hole");
        assert_eq!(holes[0].signed_area, -2.0);
    }
}
