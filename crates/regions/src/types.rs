use geo_types::{Coord, LineString, Point, Polygon};
use image::GrayImage;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{RegionError, Result};

/// Axis-aligned bounding box in raster units, global image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    pub top: i32,
    pub left: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(top: i32, left: i32, width: u32, height: u32) -> Self {
        Self { top, left, width, height }
    }

    pub fn right(&self) -> i32 {
        self.left + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height as i32
    }

    /// Smallest box covering both operands.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let left = self.left.min(other.left);
        let top = self.top.min(other.top);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        BoundingBox {
            top,
            left,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
        }
    }

    /// Box grown by `margin` pixels on every side.
    pub fn padded(&self, margin: u32) -> BoundingBox {
        BoundingBox {
            top: self.top - margin as i32,
            left: self.left - margin as i32,
            width: self.width + 2 * margin,
            height: self.height + 2 * margin,
        }
    }

    pub fn contains_point(&self, point: [f32; 2]) -> bool {
        point[0] >= self.left as f32
            && point[0] <= self.right() as f32
            && point[1] >= self.top as f32
            && point[1] <= self.bottom() as f32
    }
}

/// A polygon with holes, in pixel-boundary coordinates.
///
/// The exterior ring winds positively (positive shoelace area), holes wind
/// negatively. Rings are not explicitly closed; all ring math wraps around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RegionGeometry {
    /// The outer contour of the region.
    pub exterior: Vec<[f32; 2]>,
    /// Interior contours (holes within the region).
    pub holes: Vec<Vec<[f32; 2]>>,
}

impl RegionGeometry {
    /// Convert to a geo-types Polygon for geometric operations.
    pub fn to_polygon(&self) -> Polygon<f32> {
        let exterior_coords: Vec<Coord<f32>> = self
            .exterior
            .iter()
            .map(|&[x, y]| Coord { x, y })
            .collect();

        let holes: Vec<LineString<f32>> = self
            .holes
            .iter()
            .map(|hole| {
                LineString::new(hole.iter().map(|&[x, y]| Coord { x, y }).collect())
            })
            .collect();

        Polygon::new(LineString::new(exterior_coords), holes)
    }

    /// Signed shoelace area of one ring, with wrap-around.
    pub fn ring_area(ring: &[[f32; 2]]) -> f64 {
        let n = ring.len();
        if n < 3 {
            return 0.0;
        }
        let mut sum = 0.0f64;
        for i in 0..n {
            let j = (i + 1) % n;
            sum += ring[i][0] as f64 * ring[j][1] as f64
                - ring[j][0] as f64 * ring[i][1] as f64;
        }
        sum / 2.0
    }

    /// Net area: exterior minus holes.
    ///
    /// For decoded geometries this equals the foreground pixel count of the
    /// component exactly, because rings follow pixel boundaries.
    pub fn area(&self) -> f64 {
        let mut area = Self::ring_area(&self.exterior);
        for hole in &self.holes {
            // hole rings carry negative signed area
            area += Self::ring_area(hole);
        }
        area
    }

    /// Total boundary length of the shape, holes included.
    pub fn perimeter(&self) -> f64 {
        let ring_length = |ring: &[[f32; 2]]| -> f64 {
            let n = ring.len();
            (0..n)
                .map(|i| {
                    let j = (i + 1) % n;
                    let dx = (ring[j][0] - ring[i][0]) as f64;
                    let dy = (ring[j][1] - ring[i][1]) as f64;
                    (dx * dx + dy * dy).sqrt()
                })
                .sum()
        };

        let mut total = ring_length(&self.exterior);
        for hole in &self.holes {
            total += ring_length(hole);
        }
        total
    }

    pub fn has_holes(&self) -> bool {
        !self.holes.is_empty()
    }

    /// Tight pixel bounding box of the exterior ring.
    pub fn bounding_box(&self) -> BoundingBox {
        let mut min_x = f32::INFINITY;
        let mut min_y = f32::INFINITY;
        let mut max_x = f32::NEG_INFINITY;
        let mut max_y = f32::NEG_INFINITY;

        for &[x, y] in &self.exterior {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }

        let left = min_x.floor() as i32;
        let top = min_y.floor() as i32;
        let right = max_x.ceil() as i32;
        let bottom = max_y.ceil() as i32;
        BoundingBox {
            top,
            left,
            width: (right - left).max(0) as u32,
            height: (bottom - top).max(0) as u32,
        }
    }

    /// Area-weighted centroid, falling back to the bbox center for
    /// degenerate rings.
    pub fn centroid(&self) -> [f32; 2] {
        use geo::Centroid;
        if let Some(centroid) = self.to_polygon().centroid() {
            [centroid.x(), centroid.y()]
        } else {
            let bbox = self.bounding_box();
            [
                bbox.left as f32 + bbox.width as f32 / 2.0,
                bbox.top as f32 + bbox.height as f32 / 2.0,
            ]
        }
    }

    /// Point-in-region test honoring holes.
    pub fn contains_point(&self, point: [f32; 2]) -> bool {
        use geo::Contains;
        self.to_polygon().contains(&Point::new(point[0], point[1]))
    }
}

/// A single annotated area, backed jointly by a raster mask and a
/// polygon-with-holes. The polygon is the stored form; the mask is derived
/// on demand by the codec and is canonical during boolean operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Unique positive id within a store; 0 until registered.
    pub id: u32,
    /// Monotonically increasing per logical region.
    pub version: u32,
    pub class_name: String,
    pub instance_name: String,
    pub note: String,
    pub bbox: BoundingBox,
    pub geometry: RegionGeometry,
    /// Foreground pixel count of the region's mask.
    pub area: f64,
    pub perimeter: f64,
    pub centroid: [f32; 2],
    /// Id of the group this region belongs to, if any.
    pub group_id: Option<u32>,
    /// Opaque cross-image correspondence tag; carried, never interpreted.
    pub genet: Option<String>,
}

impl Region {
    /// Id value of a region not yet registered with a store.
    pub const UNASSIGNED: u32 = 0;

    /// Build a region from decoded geometry, deriving bbox and metrics.
    ///
    /// Fails with `Degenerate` if the geometry encloses no area.
    pub fn from_geometry(geometry: RegionGeometry) -> Result<Self> {
        let area = geometry.area();
        if area <= 0.0 {
            return Err(RegionError::Degenerate);
        }
        let bbox = geometry.bounding_box();
        let perimeter = geometry.perimeter();
        let centroid = geometry.centroid();
        Ok(Region {
            id: Self::UNASSIGNED,
            version: 1,
            class_name: String::new(),
            instance_name: String::new(),
            note: String::new(),
            bbox,
            geometry,
            area,
            perimeter,
            centroid,
            group_id: None,
            genet: None,
        })
    }

    /// New geometry, same identity-free attributes as `parent`.
    ///
    /// Used by the algebra for results that replace or split an operand:
    /// class, instance name, note, group and genet carry over; id and
    /// version are left for the caller to settle.
    pub fn derived_from(parent: &Region, geometry: RegionGeometry) -> Result<Self> {
        let mut region = Self::from_geometry(geometry)?;
        region.class_name = parent.class_name.clone();
        region.instance_name = parent.instance_name.clone();
        region.note = parent.note.clone();
        region.group_id = parent.group_id;
        region.genet = parent.genet.clone();
        Ok(region)
    }

    pub fn to_record(&self) -> RegionRecord {
        RegionRecord {
            id: self.id,
            version: self.version,
            class_name: self.class_name.clone(),
            instance_name: self.instance_name.clone(),
            note: self.note.clone(),
            bbox: self.bbox,
            outer: self.geometry.exterior.clone(),
            inner: self.geometry.holes.clone(),
            area: self.area,
            perimeter: self.perimeter,
            centroid: self.centroid,
            group_id: self.group_id,
            genet: self.genet.clone(),
        }
    }

    /// Reconstruct a region from its persisted record.
    ///
    /// Geometry is trusted as stored (the record is the persistence layer's
    /// sole contract; nothing is re-derived), but an empty shape is still
    /// rejected so the store invariant holds.
    pub fn from_record(record: RegionRecord) -> Result<Self> {
        let geometry = RegionGeometry {
            exterior: record.outer,
            holes: record.inner,
        };
        if geometry.area() <= 0.0 {
            return Err(RegionError::Degenerate);
        }
        Ok(Region {
            id: record.id,
            version: record.version,
            class_name: record.class_name,
            instance_name: record.instance_name,
            note: record.note,
            bbox: record.bbox,
            geometry,
            area: record.area,
            perimeter: record.perimeter,
            centroid: record.centroid,
            group_id: record.group_id,
            genet: record.genet,
        })
    }
}

/// Persisted form of a [`Region`]: sufficient to reconstruct the region and,
/// via the codec, its mask, without re-deriving geometry elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RegionRecord {
    pub id: u32,
    pub version: u32,
    pub class_name: String,
    pub instance_name: String,
    pub note: String,
    pub bbox: BoundingBox,
    pub outer: Vec<[f32; 2]>,
    pub inner: Vec<Vec<[f32; 2]>>,
    pub area: f64,
    pub perimeter: f64,
    pub centroid: [f32; 2],
    pub group_id: Option<u32>,
    pub genet: Option<String>,
}

/// A pure association of regions; no geometric effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: u32,
    pub members: std::collections::BTreeSet<u32>,
}

/// A binary raster placed on the global image by its bounding box.
///
/// 0 is background, 255 foreground. This is the transient canonical operand
/// of every boolean operation; regions never own one.
#[derive(Debug, Clone)]
pub struct RegionMask {
    pub bbox: BoundingBox,
    pub pixels: GrayImage,
}

impl RegionMask {
    /// Foreground pixel count.
    pub fn area(&self) -> u64 {
        self.pixels.pixels().filter(|p| p.0[0] > 0).count() as u64
    }
}
