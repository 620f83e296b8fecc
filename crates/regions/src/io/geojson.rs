//! GeoJSON export/import of a store's regions, for downstream mapping and
//! analysis tools.
//!
//! Export writes exact pixel-boundary coordinates by default; the
//! `simplified` variant thins contours with Douglas-Peucker for
//! display-only output. Stored geometry is never simplified: the stored
//! contours must stay exact so the mask remains reconstructible.

use geojson::{Feature, FeatureCollection, Geometry, Value};

use crate::{
    error::Result,
    store::RegionStore,
    types::{Region, RegionGeometry},
};

fn ring_coordinates(ring: &[[f32; 2]]) -> Vec<Vec<f64>> {
    let mut coords: Vec<Vec<f64>> = ring
        .iter()
        .map(|&[x, y]| vec![x as f64, y as f64])
        .collect();
    // GeoJSON rings are explicitly closed
    if let Some(first) = coords.first().cloned() {
        coords.push(first);
    }
    coords
}

fn region_feature(region: &Region) -> Feature {
    let mut coordinates = vec![ring_coordinates(&region.geometry.exterior)];
    for hole in &region.geometry.holes {
        coordinates.push(ring_coordinates(hole));
    }
    let geometry = Geometry::new(Value::Polygon(coordinates));

    let mut properties = serde_json::Map::new();
    properties.insert("id".to_string(), region.id.into());
    properties.insert("version".to_string(), region.version.into());
    properties.insert("class_name".to_string(), region.class_name.clone().into());
    properties.insert(
        "instance_name".to_string(),
        region.instance_name.clone().into(),
    );
    properties.insert("note".to_string(), region.note.clone().into());
    properties.insert(
        "area".to_string(),
        serde_json::Value::Number(
            serde_json::Number::from_f64(region.area).unwrap_or(serde_json::Number::from(0)),
        ),
    );
    properties.insert(
        "perimeter".to_string(),
        serde_json::Value::Number(
            serde_json::Number::from_f64(region.perimeter)
                .unwrap_or(serde_json::Number::from(0)),
        ),
    );
    if let Some(group_id) = region.group_id {
        properties.insert("group_id".to_string(), group_id.into());
    }
    if let Some(genet) = &region.genet {
        properties.insert("genet".to_string(), genet.clone().into());
    }

    Feature {
        bbox: None,
        geometry: Some(geometry),
        id: Some(geojson::feature::Id::Number(region.id.into())),
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Export every live region of the store as a FeatureCollection.
pub fn store_to_geojson(store: &RegionStore) -> FeatureCollection {
    let features = store.regions().map(region_feature).collect();

    let mut foreign_members = serde_json::Map::new();
    foreign_members.insert("region_count".to_string(), store.len().into());

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(foreign_members),
    }
}

pub fn store_to_geojson_string(store: &RegionStore) -> Result<String> {
    Ok(serde_json::to_string_pretty(&store_to_geojson(store))?)
}

pub fn save_geojson(store: &RegionStore, path: &str) -> Result<()> {
    std::fs::write(path, store_to_geojson_string(store)?)?;
    Ok(())
}

/// Export with Douglas-Peucker-thinned contours for display-only use.
pub fn store_to_geojson_simplified(store: &RegionStore, tolerance: f32) -> FeatureCollection {
    use geo::Simplify;
    use geo_types::{Coord, LineString};

    let thin = |ring: &[[f32; 2]]| -> Vec<[f32; 2]> {
        let line = LineString::new(
            ring.iter().map(|&[x, y]| Coord { x, y }).collect(),
        );
        line.simplify(&tolerance)
            .coords()
            .map(|c| [c.x, c.y])
            .collect()
    };

    let features = store
        .regions()
        .map(|region| {
            let mut display = region.clone();
            display.geometry.exterior = thin(&region.geometry.exterior);
            display.geometry.holes =
                region.geometry.holes.iter().map(|h| thin(h)).collect();
            region_feature(&display)
        })
        .collect();

    let mut foreign_members = serde_json::Map::new();
    foreign_members.insert("region_count".to_string(), store.len().into());

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(foreign_members),
    }
}

/// Rebuild regions from a GeoJSON string produced by the exporter.
pub fn regions_from_geojson_string(geojson_str: &str) -> Result<Vec<Region>> {
    let collection: FeatureCollection = geojson_str.parse()?;
    let mut regions = Vec::new();

    for feature in collection.features {
        let Some(geometry) = feature.geometry else { continue };
        let Value::Polygon(coords) = geometry.value else { continue };
        if coords.is_empty() {
            continue;
        }

        let read_ring = |ring: &Vec<Vec<f64>>| -> Vec<[f32; 2]> {
            let mut points: Vec<[f32; 2]> = ring
                .iter()
                .map(|c| [c[0] as f32, c[1] as f32])
                .collect();
            // drop the closing duplicate
            if points.len() >= 2 && points.first() == points.last() {
                points.pop();
            }
            points
        };

        let geometry = RegionGeometry {
            exterior: read_ring(&coords[0]),
            holes: coords[1..].iter().map(read_ring).collect(),
        };
        let mut region = Region::from_geometry(geometry)?;

        if let Some(properties) = feature.properties {
            if let Some(id) = properties.get("id").and_then(|v| v.as_u64()) {
                region.id = id as u32;
            }
            if let Some(version) = properties.get("version").and_then(|v| v.as_u64()) {
                region.version = version as u32;
            }
            if let Some(class_name) = properties.get("class_name").and_then(|v| v.as_str()) {
                region.class_name = class_name.to_string();
            }
            if let Some(instance_name) =
                properties.get("instance_name").and_then(|v| v.as_str())
            {
                region.instance_name = instance_name.to_string();
            }
            if let Some(note) = properties.get("note").and_then(|v| v.as_str()) {
                region.note = note.to_string();
            }
            if let Some(group_id) = properties.get("group_id").and_then(|v| v.as_u64()) {
                region.group_id = Some(group_id as u32);
            }
            if let Some(genet) = properties.get("genet").and_then(|v| v.as_str()) {
                region.genet = Some(genet.to_string());
            }
        }
        regions.push(region);
    }

    Ok(regions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RegionGeometry;

    fn sample_store() -> RegionStore {
        let mut store = RegionStore::new();
        let mut region = Region::from_geometry(RegionGeometry {
            exterior: vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]],
            holes: vec![vec![[3.0, 3.0], [3.0, 7.0], [7.0, 7.0], [7.0, 3.0]]],
        })
        .expect("Should build region");
        region.class_name = "acropora".to_string();
        region.genet = Some("g-17".to_string());
        store.add(region, None).expect("Should add");
        store
    }

    #[test]
    fn test_export_has_polygon_with_hole() {
        let store = sample_store();
        let collection = store_to_geojson(&store);
        assert_eq!(collection.features.len(), 1);

        let geometry = collection.features[0].geometry.as_ref().expect("Should have geometry");
        match &geometry.value {
            Value::Polygon(rings) => {
                assert_eq!(rings.len(), 2, "exterior plus one hole");
                assert_eq!(rings[0].first(), rings[0].last(), "rings are closed");
            }
            other => panic!("expected polygon, got {other:?}"),
        }
    }

    #[test]
    fn test_geojson_round_trip() {
        let store = sample_store();
        let text = store_to_geojson_string(&store).expect("Should serialize");
        let regions = regions_from_geojson_string(&text).expect("Should parse");

        assert_eq!(regions.len(), 1);
        let original = store.regions().next().expect("Should have region");
        assert_eq!(regions[0].geometry, original.geometry);
        assert_eq!(regions[0].class_name, original.class_name);
        assert_eq!(regions[0].genet, original.genet);
        assert_eq!(regions[0].area, original.area);
    }

    #[test]
    fn test_simplified_export_thins_contours() {
        let mut store = RegionStore::new();
        // staircase exterior with many collinear-ish steps
        let mut exterior = Vec::new();
        for i in 0..20 {
            exterior.push([i as f32, (i % 2) as f32 * 0.2]);
        }
        exterior.push([20.0, 0.0]);
        exterior.push([20.0, 10.0]);
        exterior.push([0.0, 10.0]);
        let region = Region::from_geometry(RegionGeometry { exterior, holes: vec![] })
            .expect("Should build region");
        store.add(region, None).expect("Should add");

        let full = store_to_geojson(&store);
        let thin = store_to_geojson_simplified(&store, 1.0);
        let count = |fc: &FeatureCollection| match &fc.features[0].geometry.as_ref().unwrap().value
        {
            Value::Polygon(rings) => rings[0].len(),
            _ => 0,
        };
        assert!(count(&thin) < count(&full));
    }
}
