//! Interactive border editing: a small state machine turning user-drawn
//! polylines into mask edits.
//!
//! The editor accumulates points while Drawing; each apply validates fully,
//! computes the replacement regions through the codec, and only then
//! touches the store. A failed apply leaves both the store and the drawn
//! polyline exactly as they were, so the user can retry or cancel.

use geo::Intersects;
use geo_types::{Coord, Line};
use image::{GrayImage, Luma};
use imageproc::drawing::draw_line_segment_mut;
use strum::Display;

use crate::{
    codec::{FillRule, MaskCodec},
    error::{RegionError, Result},
    store::RegionStore,
    types::{Region, RegionGeometry},
};

/// Squared-distance tolerance for treating two snap points as one.
const SNAP_EPS: f32 = 1e-4;

/// Editing phase. Drawing begins on the first appended point; apply and
/// cancel both lead back to Idle.
#[derive(Debug, Clone, PartialEq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DrawState {
    Idle,
    Drawing { points: Vec<[f32; 2]> },
}

/// The border-editing state machine.
#[derive(Debug, Clone)]
pub struct BorderEditor {
    state: DrawState,
    codec: MaskCodec,
}

impl Default for BorderEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl BorderEditor {
    pub fn new() -> Self {
        Self { state: DrawState::Idle, codec: MaskCodec::new() }
    }

    pub fn state(&self) -> &DrawState {
        &self.state
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.state, DrawState::Drawing { .. })
    }

    /// Append a point to the working polyline, entering Drawing from Idle.
    pub fn append(&mut self, point: [f32; 2]) {
        match &mut self.state {
            DrawState::Idle => {
                self.state = DrawState::Drawing { points: vec![point] };
            }
            DrawState::Drawing { points } => points.push(point),
        }
    }

    /// Discard the working polyline with no side effects.
    pub fn cancel(&mut self) {
        tracing::debug!(state = %self.state, "border edit cancelled");
        self.state = DrawState::Idle;
    }

    /// Replace part of the target's boundary with the drawn open polyline.
    ///
    /// The polyline's endpoints are snapped to the nearest points on the
    /// target's outer or inner contour (both must land on the same ring);
    /// the ring arc nearer to the drawn line is replaced. Returns the
    /// target's new version.
    pub fn apply_edit_border(&mut self, store: &mut RegionStore, target_id: u32) -> Result<u32> {
        let drawn = self.drawn()?.to_vec();
        let target = store.get(target_id)?.clone();

        let geometry = replace_border_arc(&self.codec, &target.geometry, &drawn)?;
        let mut region = Region::derived_from(&target, geometry)?;
        region.id = target_id;
        region.version = target.version + 1;
        let version = region.version;

        store.replace(target_id, region)?;
        self.state = DrawState::Idle;
        Ok(version)
    }

    /// Cut the target along the drawn open polyline.
    ///
    /// The polyline must cross the target's mask. It is rasterized as a
    /// one-pixel barrier; each remaining component becomes a new region
    /// with the source's attributes, the first retaining the source id.
    /// Returns the new ids; the source region is removed.
    pub fn apply_cut(&mut self, store: &mut RegionStore, target_id: u32) -> Result<Vec<u32>> {
        let drawn = self.drawn()?.to_vec();
        let ids = self.cut_with(store, target_id, &drawn)?;
        self.state = DrawState::Idle;
        Ok(ids)
    }

    /// Cut along a caller-supplied point sequence instead of a freely
    /// drawn line. Does not involve the Drawing state.
    pub fn apply_split(
        &self,
        store: &mut RegionStore,
        target_id: u32,
        points: &[[f32; 2]],
    ) -> Result<Vec<u32>> {
        if points.len() < 2 {
            return Err(RegionError::InvalidBoundary(
                "a split needs at least two points".to_string(),
            ));
        }
        self.cut_with(store, target_id, points)
    }

    /// Create regions from the drawn closed polyline.
    ///
    /// The outline is rasterized under the non-zero rule, so every lobe of
    /// a self-intersecting curve is kept. Returns the ids of the created
    /// regions.
    pub fn apply_freehand(&mut self, store: &mut RegionStore, class_name: &str) -> Result<Vec<u32>> {
        let drawn = match &self.state {
            DrawState::Drawing { points } if points.len() >= 3 => points.clone(),
            _ => {
                return Err(RegionError::InvalidBoundary(
                    "a freehand outline needs at least three points".to_string(),
                ))
            }
        };

        let outline_frame = RegionGeometry { exterior: drawn.clone(), holes: Vec::new() }
            .bounding_box()
            .padded(1);
        let mask = self.codec.rasterize_outline(&drawn, &outline_frame, FillRule::NonZero);
        let geometries =
            self.codec
                .decode(&mask, (outline_frame.left, outline_frame.top), 1)?;
        if geometries.is_empty() {
            return Err(RegionError::Degenerate);
        }

        let mut regions = Vec::with_capacity(geometries.len());
        for geometry in geometries {
            let mut region = Region::from_geometry(geometry)?;
            region.class_name = class_name.to_string();
            regions.push(region);
        }

        let ids = store.add_all(regions)?;
        self.state = DrawState::Idle;
        Ok(ids)
    }

    fn drawn(&self) -> Result<&[[f32; 2]]> {
        match &self.state {
            DrawState::Drawing { points } if points.len() >= 2 => Ok(points),
            _ => Err(RegionError::InvalidBoundary(
                "no polyline drawn".to_string(),
            )),
        }
    }

    fn cut_with(
        &self,
        store: &mut RegionStore,
        target_id: u32,
        polyline: &[[f32; 2]],
    ) -> Result<Vec<u32>> {
        let target = store.get(target_id)?.clone();
        let bbox = target.bbox;
        let mut mask = self.codec.encode(&target.geometry, &bbox);

        let mut barrier = GrayImage::new(bbox.width, bbox.height);
        for pair in polyline.windows(2) {
            let start = (pair[0][0] - bbox.left as f32, pair[0][1] - bbox.top as f32);
            let end = (pair[1][0] - bbox.left as f32, pair[1][1] - bbox.top as f32);
            draw_line_segment_mut(&mut barrier, start, end, Luma([255u8]));
        }

        if !mask
            .pixels()
            .zip(barrier.pixels())
            .any(|(m, b)| m.0[0] > 0 && b.0[0] > 0)
        {
            return Err(RegionError::NoIntersection);
        }
        for (m, b) in mask.pixels_mut().zip(barrier.pixels()) {
            if b.0[0] > 0 {
                m.0[0] = 0;
            }
        }

        let geometries = self.codec.decode(&mask, (bbox.left, bbox.top), 1)?;
        if geometries.is_empty() {
            return Err(RegionError::Degenerate);
        }

        // build every replacement before touching the store
        let mut parts = Vec::with_capacity(geometries.len());
        for (i, geometry) in geometries.into_iter().enumerate() {
            let mut part = Region::derived_from(&target, geometry)?;
            if i == 0 {
                part.version = target.version + 1;
            }
            parts.push(part);
        }

        store.remove(target_id)?;
        let mut ids = Vec::with_capacity(parts.len());
        for (i, part) in parts.into_iter().enumerate() {
            let requested = if i == 0 { Some(target_id) } else { None };
            ids.push(store.add(part, requested)?);
        }
        Ok(ids)
    }
}

// --- arc replacement ---

struct Snap {
    ring: usize,
    position: SnapPos,
}

enum SnapPos {
    Vertex(usize),
    Edge { segment: usize, t: f32, point: [f32; 2] },
}

fn sqdist(a: [f32; 2], b: [f32; 2]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

/// Closest point of any ring of `geometry` to `p`; ring 0 is the exterior,
/// ring i+1 is hole i.
fn snap_to_geometry(geometry: &RegionGeometry, p: [f32; 2]) -> Snap {
    let mut best_d = f32::INFINITY;
    let mut best = Snap { ring: 0, position: SnapPos::Vertex(0) };

    let rings = std::iter::once(&geometry.exterior).chain(geometry.holes.iter());
    for (ring_idx, ring) in rings.enumerate() {
        let n = ring.len();
        for i in 0..n {
            let a = ring[i];
            let b = ring[(i + 1) % n];
            let (t, q) = project_onto_segment(p, a, b);
            let d = sqdist(p, q);
            if d < best_d {
                best_d = d;
                let position = if t <= 1e-3 {
                    SnapPos::Vertex(i)
                } else if t >= 1.0 - 1e-3 {
                    SnapPos::Vertex((i + 1) % n)
                } else {
                    SnapPos::Edge { segment: i, t, point: q }
                };
                best = Snap { ring: ring_idx, position };
            }
        }
    }
    best
}

fn project_onto_segment(p: [f32; 2], a: [f32; 2], b: [f32; 2]) -> (f32, [f32; 2]) {
    let ab = [b[0] - a[0], b[1] - a[1]];
    let len2 = ab[0] * ab[0] + ab[1] * ab[1];
    if len2 == 0.0 {
        return (0.0, a);
    }
    let t = (((p[0] - a[0]) * ab[0] + (p[1] - a[1]) * ab[1]) / len2).clamp(0.0, 1.0);
    (t, [a[0] + t * ab[0], a[1] + t * ab[1]])
}

/// Rebuild the ring with both snap points materialized as vertices,
/// returning their indices.
fn insert_snaps(
    ring: &[[f32; 2]],
    a: &SnapPos,
    b: &SnapPos,
) -> (Vec<[f32; 2]>, usize, usize) {
    let n = ring.len();
    let mut edge_snaps: Vec<(usize, f32, [f32; 2], usize)> = Vec::new();
    if let SnapPos::Edge { segment, t, point } = a {
        edge_snaps.push((*segment, *t, *point, 0));
    }
    if let SnapPos::Edge { segment, t, point } = b {
        edge_snaps.push((*segment, *t, *point, 1));
    }
    edge_snaps.sort_by(|x, y| (x.0, x.1).partial_cmp(&(y.0, y.1)).unwrap());

    let mut out: Vec<[f32; 2]> = Vec::with_capacity(n + 2);
    let mut vertex_index = vec![0usize; n];
    let mut snap_index = [usize::MAX; 2];
    for i in 0..n {
        vertex_index[i] = out.len();
        out.push(ring[i]);
        for &(segment, _, point, which) in &edge_snaps {
            if segment == i {
                snap_index[which] = out.len();
                out.push(point);
            }
        }
    }

    let resolve = |pos: &SnapPos, which: usize| match pos {
        SnapPos::Vertex(v) => vertex_index[*v],
        SnapPos::Edge { .. } => snap_index[which],
    };
    let idx_a = resolve(a, 0);
    let idx_b = resolve(b, 1);
    (out, idx_a, idx_b)
}

/// Core of edit-border: splice the drawn polyline into the snapped ring and
/// settle the result through the codec.
fn replace_border_arc(
    codec: &MaskCodec,
    geometry: &RegionGeometry,
    drawn: &[[f32; 2]],
) -> Result<RegionGeometry> {
    let snap_a = snap_to_geometry(geometry, drawn[0]);
    let snap_b = snap_to_geometry(geometry, drawn[drawn.len() - 1]);
    if snap_a.ring != snap_b.ring {
        return Err(RegionError::InvalidBoundary(
            "endpoints snap to different contours".to_string(),
        ));
    }
    let ring_idx = snap_a.ring;
    let original: &[[f32; 2]] = if ring_idx == 0 {
        &geometry.exterior
    } else {
        &geometry.holes[ring_idx - 1]
    };

    let (ring, idx_a, idx_b) = insert_snaps(original, &snap_a.position, &snap_b.position);
    if idx_a == idx_b || sqdist(ring[idx_a], ring[idx_b]) < SNAP_EPS {
        return Err(RegionError::InvalidBoundary(
            "endpoints snap to the same contour point".to_string(),
        ));
    }
    let n = ring.len();

    let walk = |from: usize, to: usize, step_up: bool| -> Vec<usize> {
        let mut indices = Vec::new();
        let mut i = from;
        loop {
            indices.push(i);
            if i == to {
                break;
            }
            i = if step_up { (i + 1) % n } else { (i + n - 1) % n };
        }
        indices
    };
    let forward = walk(idx_a, idx_b, true);
    let backward = walk(idx_a, idx_b, false);

    // replace the arc nearer to the drawn line; the user redraws the border
    // where they drew it
    let drawn_mid = drawn[drawn.len() / 2];
    let arc_mid = |arc: &[usize]| ring[arc[arc.len() / 2]];
    let replace_forward =
        sqdist(arc_mid(&forward), drawn_mid) <= sqdist(arc_mid(&backward), drawn_mid);

    let mut new_ring: Vec<[f32; 2]> = Vec::new();
    let kept_len;
    if replace_forward {
        // keep the complement arc, b up to a, then run the drawn line a -> b
        for &i in &walk(idx_b, idx_a, true) {
            new_ring.push(ring[i]);
        }
        kept_len = new_ring.len();
        new_ring.extend(drawn[1..drawn.len() - 1].iter().copied());
    } else {
        for &i in &forward {
            new_ring.push(ring[i]);
        }
        kept_len = new_ring.len();
        new_ring.extend(drawn[1..drawn.len() - 1].iter().rev().copied());
    }

    ensure_simple(&new_ring, kept_len)?;

    let area = RegionGeometry::ring_area(&new_ring);
    if area == 0.0 {
        return Err(RegionError::InvalidBoundary(
            "replacement boundary encloses no area".to_string(),
        ));
    }
    // restore the ring's winding convention
    let want_positive = ring_idx == 0;
    if (area > 0.0) != want_positive {
        new_ring.reverse();
    }

    let mut edited = geometry.clone();
    if ring_idx == 0 {
        edited.exterior = new_ring;
    } else {
        edited.holes[ring_idx - 1] = new_ring;
    }

    // re-encode so pixel ownership and clipped holes settle in the raster
    let frame = edited.bounding_box().padded(1);
    let mask = codec.encode(&edited, &frame);
    let mut decoded = codec.decode(&mask, (frame.left, frame.top), 1)?;
    match decoded.len() {
        0 => Err(RegionError::Degenerate),
        1 => Ok(decoded.remove(0)),
        _ => Err(RegionError::InvalidBoundary(
            "edited boundary splits the region".to_string(),
        )),
    }
}

/// Reject a spliced ring whose drawn portion crosses the kept arc or
/// itself. The kept arc alone is simple already.
fn ensure_simple(ring: &[[f32; 2]], kept_len: usize) -> Result<()> {
    let n = ring.len();
    let segment = |i: usize| {
        Line::new(
            Coord { x: ring[i][0], y: ring[i][1] },
            Coord { x: ring[(i + 1) % n][0], y: ring[(i + 1) % n][1] },
        )
    };
    for i in (kept_len - 1)..n {
        for j in 0..n {
            if j == i || (i + 1) % n == j || (j + 1) % n == i {
                continue;
            }
            // patch pairs are checked once, from the smaller index
            if j >= kept_len - 1 && j < i {
                continue;
            }
            if segment(i).intersects(&segment(j)) {
                return Err(RegionError::InvalidBoundary(
                    "drawn border crosses the region boundary".to_string(),
                ));
            }
        }
    }
    Ok(())
}
