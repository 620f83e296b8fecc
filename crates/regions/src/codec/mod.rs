//! Conversion between binary raster masks and polygon-with-holes geometry.
//!
//! `decode` is exact: rings follow pixel boundaries, so the shoelace area of
//! a decoded geometry equals the component's pixel count and
//! `encode(decode(mask)) == mask` for any binary mask. Foreground components
//! are 4-connected; enclosed background (holes) is 8-connected, which is
//! what lets a one-pixel barrier separate a region.

mod raster;
mod trace;

use std::collections::BTreeMap;

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

pub use raster::FillRule;

use crate::{
    error::{RegionError, Result},
    types::{BoundingBox, RegionGeometry},
};

/// Codec between masks and region geometry.
#[derive(Debug, Clone)]
pub struct MaskCodec {
    /// Holes with fewer pixels than this are dropped at decode time.
    /// Zero keeps every hole.
    pub min_hole_area: u32,
}

impl Default for MaskCodec {
    fn default() -> Self {
        Self { min_hole_area: 0 }
    }
}

impl MaskCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress holes smaller than `min_hole_area` pixels while decoding.
    pub fn with_min_hole_area(mut self, min_hole_area: u32) -> Self {
        self.min_hole_area = min_hole_area;
        self
    }

    /// Decode a binary mask into one geometry per foreground component.
    ///
    /// `origin` translates the mask into global image coordinates.
    /// Components with fewer than `min_area` pixels are dropped (a
    /// degenerate outcome, not an error); an all-background mask decodes to
    /// an empty list. A mask with values other than 0/255 is rejected.
    pub fn decode(
        &self,
        mask: &GrayImage,
        origin: (i32, i32),
        min_area: u32,
    ) -> Result<Vec<RegionGeometry>> {
        self.ensure_binary(mask)?;
        if !mask.pixels().any(|p| p.0[0] > 0) {
            return Ok(Vec::new());
        }

        let labels = connected_components(mask, Connectivity::Four, Luma([0u8]));

        let mut pixel_counts: BTreeMap<u32, u64> = BTreeMap::new();
        for p in labels.pixels() {
            if p.0[0] > 0 {
                *pixel_counts.entry(p.0[0]).or_insert(0) += 1;
            }
        }

        // label -> (exterior, holes)
        let mut components: BTreeMap<u32, (Option<Vec<[f32; 2]>>, Vec<Vec<[f32; 2]>>)> =
            BTreeMap::new();
        for ring in trace::trace_rings(mask, &labels) {
            let entry = components.entry(ring.label).or_insert((None, Vec::new()));
            if ring.signed_area > 0.0 {
                entry.0 = Some(ring.points);
            } else {
                let hole_pixels = -ring.signed_area;
                if hole_pixels < self.min_hole_area as f64 {
                    tracing::debug!(
                        label = ring.label,
                        pixels = hole_pixels,
                        "suppressing hole below noise threshold"
                    );
                    continue;
                }
                entry.1.push(ring.points);
            }
        }

        let (dx, dy) = (origin.0 as f32, origin.1 as f32);
        let translate = |mut ring: Vec<[f32; 2]>| -> Vec<[f32; 2]> {
            for p in &mut ring {
                p[0] += dx;
                p[1] += dy;
            }
            ring
        };

        let mut geometries = Vec::new();
        for (label, (exterior, holes)) in components {
            let pixels = pixel_counts.get(&label).copied().unwrap_or(0);
            if pixels < min_area as u64 {
                tracing::debug!(label, pixels, "discarding component below minimum area");
                continue;
            }
            let Some(exterior) = exterior else { continue };
            geometries.push(RegionGeometry {
                exterior: translate(exterior),
                holes: holes.into_iter().map(translate).collect(),
            });
        }
        Ok(geometries)
    }

    /// Rasterize a geometry into a binary raster framed by `bbox`.
    pub fn encode(&self, geometry: &RegionGeometry, bbox: &BoundingBox) -> GrayImage {
        let mut rings: Vec<&[[f32; 2]]> = vec![&geometry.exterior];
        for hole in &geometry.holes {
            rings.push(hole);
        }
        raster::fill_rings(&rings, bbox, FillRule::EvenOdd)
    }

    /// Rasterize a single closed outline under the given fill rule.
    ///
    /// With `FillRule::NonZero`, every lobe of a self-intersecting outline
    /// is kept (the union of lobes), which is the contract freehand drawing
    /// relies on.
    pub fn rasterize_outline(
        &self,
        outline: &[[f32; 2]],
        bbox: &BoundingBox,
        rule: FillRule,
    ) -> GrayImage {
        raster::fill_rings(&[outline], bbox, rule)
    }

    fn ensure_binary(&self, mask: &GrayImage) -> Result<()> {
        for (x, y, p) in mask.enumerate_pixels() {
            let value = p.0[0];
            if value != 0 && value != 255 {
                return Err(RegionError::NonBinaryMask { value, x, y });
            }
        }
        Ok(())
    }
}
