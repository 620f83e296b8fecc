//! Pure boolean and morphological operations over region values.
//!
//! Every operation materializes its operands as masks, works on pixels, and
//! decodes the result back into fresh `Region` values; operands are never
//! mutated and no store is touched. Callers commit results through
//! `RegionStore::add/replace/remove`.

use image::GrayImage;
use imageproc::{distance_transform::Norm, morphology};

use crate::{
    codec::MaskCodec,
    error::{RegionError, Result},
    types::{BoundingBox, Region, RegionGeometry, RegionMask},
};

/// Margin, in pixels, by which attach_boundaries grows both operands.
const ATTACH_MARGIN: u8 = 3;

/// Holes smaller than this arise from seam noise when two masks merge and
/// are suppressed by union.
const UNION_HOLE_NOISE_AREA: u32 = 16;

/// The boolean/morphological region algebra.
#[derive(Debug, Clone, Default)]
pub struct RegionAlgebra {
    codec: MaskCodec,
}

impl RegionAlgebra {
    pub fn new() -> Self {
        Self { codec: MaskCodec::new() }
    }

    pub fn codec(&self) -> &MaskCodec {
        &self.codec
    }

    /// Decode a raw binary mask into regions, one per foreground component.
    ///
    /// This is the entry point for every tool that produces a pixel mask
    /// (model inference, watershed, manual painting).
    pub fn from_mask(
        &self,
        mask: &GrayImage,
        origin: (i32, i32),
        min_area: u32,
    ) -> Result<Vec<Region>> {
        self.codec
            .decode(mask, origin, min_area)?
            .into_iter()
            .map(Region::from_geometry)
            .collect()
    }

    /// Rasterize a region's geometry back into its mask.
    pub fn mask_of(&self, region: &Region) -> RegionMask {
        RegionMask {
            bbox: region.bbox,
            pixels: self.codec.encode(&region.geometry, &region.bbox),
        }
    }

    /// Merge two overlapping regions into one.
    ///
    /// Fails with `NoIntersection` when the masks share no pixels. The
    /// result carries `a`'s identity and attributes; seam holes below the
    /// noise threshold are filled.
    pub fn union(&self, a: &Region, b: &Region) -> Result<Region> {
        let bbox = a.bbox.union(&b.bbox);
        let ma = self.materialize(a, &bbox);
        let mb = self.materialize(b, &bbox);

        if !overlaps(&ma, &mb) {
            return Err(RegionError::NoIntersection);
        }

        let merged = combine(&ma, &mb, |x, y| x || y);
        let geometry = self
            .codec
            .clone()
            .with_min_hole_area(UNION_HOLE_NOISE_AREA)
            .decode(&merged, (bbox.left, bbox.top), 1)?
            .into_iter()
            .max_by(|g, h| g.area().total_cmp(&h.area()))
            .ok_or(RegionError::Degenerate)?;

        let mut region = Region::derived_from(a, geometry)?;
        region.id = a.id;
        region.version = a.version + 1;
        Ok(region)
    }

    /// Remove `b`'s pixels from `a`.
    ///
    /// An empty remainder is `Degenerate` (the caller deletes `a`). A
    /// connected remainder keeps `a`'s id at version + 1. A disconnected
    /// remainder comes back as unregistered parts carrying `a`'s
    /// attributes; the caller replaces `a` with all of them.
    pub fn subtract(&self, a: &Region, b: &Region) -> Result<Vec<Region>> {
        let bbox = a.bbox;
        let ma = self.materialize(a, &bbox);
        let mb = self.materialize(b, &bbox);

        let difference = combine(&ma, &mb, |x, y| x && !y);
        let geometries = self.codec.decode(&difference, (bbox.left, bbox.top), 1)?;
        self.replacement_parts(a, geometries)
    }

    /// Separate two overlapping regions so the overlap is retained by
    /// neither: `a` loses `b`'s pixels and `b` loses `a`'s.
    ///
    /// Each side follows subtract's rules; an emptied operand comes back as
    /// an empty list (the caller deletes it).
    pub fn divide(&self, a: &Region, b: &Region) -> Result<(Vec<Region>, Vec<Region>)> {
        let keep_a = self.subtract_or_empty(a, b)?;
        let keep_b = self.subtract_or_empty(b, a)?;
        Ok((keep_a, keep_b))
    }

    /// Grow a region by a disk of the given pixel radius.
    pub fn dilate(&self, a: &Region, radius: u8) -> Result<Region> {
        let bbox = a.bbox.padded(radius as u32);
        let grown = morphology::dilate(&self.materialize(a, &bbox), Norm::L2, radius);
        let geometry = self
            .codec
            .decode(&grown, (bbox.left, bbox.top), 1)?
            .into_iter()
            .max_by(|g, h| g.area().total_cmp(&h.area()))
            .ok_or(RegionError::Degenerate)?;

        let mut region = Region::derived_from(a, geometry)?;
        region.id = a.id;
        region.version = a.version + 1;
        Ok(region)
    }

    /// Shrink a region by a disk of the given pixel radius.
    ///
    /// Erosion that empties the mask is `Degenerate`; erosion that
    /// disconnects it returns the parts, as subtract does.
    pub fn erode(&self, a: &Region, radius: u8) -> Result<Vec<Region>> {
        let bbox = a.bbox;
        let shrunk = morphology::erode(&self.materialize(a, &bbox), Norm::L2, radius);
        let geometries = self.codec.decode(&shrunk, (bbox.left, bbox.top), 1)?;
        self.replacement_parts(a, geometries)
    }

    /// Remove every hole, leaving the exterior untouched.
    pub fn fill(&self, a: &Region) -> Result<Region> {
        let geometry = RegionGeometry {
            exterior: a.geometry.exterior.clone(),
            holes: Vec::new(),
        };
        let mut region = Region::derived_from(a, geometry)?;
        region.id = a.id;
        region.version = a.version + 1;
        Ok(region)
    }

    /// Close the gap between two nearby regions so they share a common
    /// border with no gap and no overlap.
    ///
    /// Both operands are dilated by a fixed margin; the strip where the
    /// dilations meet is granted to `a` except where `b` already stands,
    /// and `b` then yields to the enlarged `a`: the first operand's shape
    /// wins along the shared border.
    pub fn attach_boundaries(&self, a: &Region, b: &Region) -> Result<(Region, Vec<Region>)> {
        let bbox = a.bbox.union(&b.bbox).padded(ATTACH_MARGIN as u32);
        let ma = self.materialize(a, &bbox);
        let mb = self.materialize(b, &bbox);

        let da = morphology::dilate(&ma, Norm::L2, ATTACH_MARGIN);
        let db = morphology::dilate(&mb, Norm::L2, ATTACH_MARGIN);

        let strip = combine(&da, &db, |x, y| x && y);
        let granted = combine(&strip, &mb, |x, y| x && !y);
        let enlarged_a = combine(&ma, &granted, |x, y| x || y);
        let remaining_b = combine(&mb, &enlarged_a, |x, y| x && !y);

        let origin = (bbox.left, bbox.top);
        let mut a_geometries = self.codec.decode(&enlarged_a, origin, 1)?;
        if a_geometries.len() > 1 {
            tracing::debug!(
                fragments = a_geometries.len() - 1,
                "dropping strip fragments detached from the first operand"
            );
        }
        let a_geometry = a_geometries
            .drain(..)
            .max_by(|g, h| g.area().total_cmp(&h.area()))
            .ok_or(RegionError::Degenerate)?;

        let mut a_region = Region::derived_from(a, a_geometry)?;
        a_region.id = a.id;
        a_region.version = a.version + 1;

        let b_geometries = self.codec.decode(&remaining_b, origin, 1)?;
        let b_parts = self.replacement_parts(b, b_geometries)?;
        Ok((a_region, b_parts))
    }

    fn materialize(&self, region: &Region, bbox: &BoundingBox) -> GrayImage {
        self.codec.encode(&region.geometry, bbox)
    }

    fn subtract_or_empty(&self, a: &Region, b: &Region) -> Result<Vec<Region>> {
        match self.subtract(a, b) {
            Ok(parts) => Ok(parts),
            Err(RegionError::Degenerate) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Map decoded remainder geometries onto subtract's outcome rules.
    fn replacement_parts(
        &self,
        source: &Region,
        mut geometries: Vec<RegionGeometry>,
    ) -> Result<Vec<Region>> {
        match geometries.len() {
            0 => Err(RegionError::Degenerate),
            1 => {
                let mut region = Region::derived_from(source, geometries.remove(0))?;
                region.id = source.id;
                region.version = source.version + 1;
                Ok(vec![region])
            }
            _ => geometries
                .into_iter()
                .map(|g| Region::derived_from(source, g))
                .collect(),
        }
    }
}

fn overlaps(a: &GrayImage, b: &GrayImage) -> bool {
    a.pixels().zip(b.pixels()).any(|(x, y)| x.0[0] > 0 && y.0[0] > 0)
}

fn combine(a: &GrayImage, b: &GrayImage, f: impl Fn(bool, bool) -> bool) -> GrayImage {
    let mut out = GrayImage::new(a.width(), a.height());
    for (p, (x, y)) in out.pixels_mut().zip(a.pixels().zip(b.pixels())) {
        if f(x.0[0] > 0, y.0[0] > 0) {
            p.0[0] = 255;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn square_region(left: i32, top: i32, side: u32) -> Region {
        let mut mask = GrayImage::new(side, side);
        for p in mask.pixels_mut() {
            p.0[0] = 255;
        }
        let algebra = RegionAlgebra::new();
        let mut regions = algebra
            .from_mask(&mask, (left, top), 1)
            .expect("Should decode square");
        regions.remove(0)
    }

    fn mask_pixels(algebra: &RegionAlgebra, region: &Region) -> Vec<(i32, i32)> {
        let mask = algebra.mask_of(region);
        let mut pixels: Vec<(i32, i32)> = mask
            .pixels
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] > 0)
            .map(|(x, y, _)| (mask.bbox.left + x as i32, mask.bbox.top + y as i32))
            .collect();
        pixels.sort();
        pixels
    }

    #[test]
    fn test_union_requires_overlap() {
        let algebra = RegionAlgebra::new();
        let a = square_region(0, 0, 10);
        let b = square_region(20, 20, 10);
        assert!(matches!(
            algebra.union(&a, &b),
            Err(RegionError::NoIntersection)
        ));
    }

    #[test]
    fn test_union_of_edge_sharing_squares() {
        let algebra = RegionAlgebra::new();
        // overlap on one shared edge column
        let a = square_region(0, 0, 10);
        let b = square_region(9, 0, 10);

        let merged = algebra.union(&a, &b).expect("Should union");
        assert_eq!(merged.area, 100.0 + 100.0 - 10.0);
        assert_eq!(merged.id, a.id);
        assert_eq!(merged.version, a.version + 1);
    }

    #[test]
    fn test_union_is_commutative_on_pixels() {
        let algebra = RegionAlgebra::new();
        let a = square_region(0, 0, 12);
        let b = square_region(6, 4, 12);

        let ab = algebra.union(&a, &b).expect("Should union");
        let ba = algebra.union(&b, &a).expect("Should union");
        assert_eq!(mask_pixels(&algebra, &ab), mask_pixels(&algebra, &ba));
    }

    #[test]
    fn test_subtract_disjoint_is_noop() {
        let algebra = RegionAlgebra::new();
        let a = square_region(0, 0, 10);
        let b = square_region(30, 30, 10);

        let parts = algebra.subtract(&a, &b).expect("Should subtract");
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].geometry, a.geometry);
        assert_eq!(parts[0].id, a.id);
        assert_eq!(parts[0].version, a.version + 1);
    }

    #[test]
    fn test_subtract_contained_is_degenerate() {
        let algebra = RegionAlgebra::new();
        let a = square_region(4, 4, 6);
        let b = square_region(0, 0, 20);
        assert!(matches!(
            algebra.subtract(&a, &b),
            Err(RegionError::Degenerate)
        ));
    }

    #[test]
    fn test_subtract_can_split() {
        let algebra = RegionAlgebra::new();
        let a = square_region(0, 0, 15);
        // vertical bar through the middle, taller than a
        let mut bar = GrayImage::new(3, 30);
        for p in bar.pixels_mut() {
            p.0[0] = 255;
        }
        let b = algebra.from_mask(&bar, (6, -5), 1).expect("Should decode").remove(0);

        let parts = algebra.subtract(&a, &b).expect("Should subtract");
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.id == Region::UNASSIGNED));
        let total: f64 = parts.iter().map(|p| p.area).sum();
        assert_eq!(total, 15.0 * 15.0 - 3.0 * 15.0);
    }

    #[test]
    fn test_divide_retains_overlap_in_neither() {
        let algebra = RegionAlgebra::new();
        let a = square_region(0, 0, 10);
        let b = square_region(6, 0, 10);

        let (keep_a, keep_b) = algebra.divide(&a, &b).expect("Should divide");
        assert_eq!(keep_a.len(), 1);
        assert_eq!(keep_b.len(), 1);
        // the 4x10 overlap is dropped from both sides
        assert_eq!(keep_a[0].area, 60.0);
        assert_eq!(keep_b[0].area, 60.0);

        let pa = mask_pixels(&algebra, &keep_a[0]);
        let pb = mask_pixels(&algebra, &keep_b[0]);
        assert!(pa.iter().all(|p| !pb.contains(p)), "no pixel owned twice");
    }

    #[test]
    fn test_dilate_then_erode_restores_square() {
        let algebra = RegionAlgebra::new();
        let a = square_region(10, 10, 12);

        let grown = algebra.dilate(&a, 2).expect("Should dilate");
        assert!(grown.area > a.area);
        assert_eq!(grown.id, a.id);

        let parts = algebra.erode(&grown, 2).expect("Should erode");
        assert_eq!(parts.len(), 1);
        // closing a convex shape changes little: never shrinks, and any
        // growth is confined to the corners
        assert!(parts[0].area >= a.area);
        assert!(parts[0].area <= a.area + 16.0);
    }

    #[test]
    fn test_erode_to_nothing_is_degenerate() {
        let algebra = RegionAlgebra::new();
        let a = square_region(0, 0, 3);
        assert!(matches!(algebra.erode(&a, 4), Err(RegionError::Degenerate)));
    }

    #[test]
    fn test_fill_scenario() {
        let algebra = RegionAlgebra::new();
        // 20x20 square with a 10x10 enclosed hole
        let mut mask = GrayImage::new(20, 20);
        for p in mask.pixels_mut() {
            p.0[0] = 255;
        }
        for y in 5..15 {
            for x in 5..15 {
                mask.put_pixel(x, y, Luma([0u8]));
            }
        }
        let a = algebra.from_mask(&mask, (0, 0), 1).expect("Should decode").remove(0);
        assert_eq!(a.area, 300.0);
        assert_eq!(a.geometry.holes.len(), 1);

        let filled = algebra.fill(&a).expect("Should fill");
        assert!(filled.geometry.holes.is_empty());
        assert_eq!(filled.area, 400.0);
        assert_eq!(filled.geometry.exterior, a.geometry.exterior);
        assert_eq!(filled.version, a.version + 1);
    }

    #[test]
    fn test_attach_boundaries_closes_gap() {
        let algebra = RegionAlgebra::new();
        // two squares separated by a 2 pixel gap
        let a = square_region(0, 0, 10);
        let b = square_region(12, 0, 10);

        let (a2, b_parts) = algebra.attach_boundaries(&a, &b).expect("Should attach");
        assert_eq!(b_parts.len(), 1);
        let b2 = &b_parts[0];

        let pa = mask_pixels(&algebra, &a2);
        let pb = mask_pixels(&algebra, b2);
        assert!(pa.iter().all(|p| !pb.contains(p)), "no overlap");

        // the gap strip between the squares is now covered
        for y in 0..10 {
            for x in 10..12 {
                let p = (x, y);
                assert!(
                    pa.contains(&p) || pb.contains(&p),
                    "gap pixel {p:?} left unowned"
                );
            }
        }
        // first operand wins the strip
        assert!(a2.area > a.area);
        assert_eq!(b2.area, b.area);
    }
}
