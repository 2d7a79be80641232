// Block group geometry - polygons keyed by GEOID
//
// Two on-disk formats: GeoPackage (the census download) and GeoJSON.

pub mod gpkg;
pub mod wkb;

use anyhow::{bail, Context, Result};
use geo::{BoundingRect, MultiPolygon, Rect};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("Truncated geometry blob at byte {offset}")]
    Truncated { offset: usize },

    #[error("Malformed geometry: {0}")]
    Malformed(String),

    #[error("Unsupported geometry type {0}; only polygons and multipolygons are mapped")]
    UnsupportedType(u32),

    #[error("Feature layer not found: {0}")]
    MissingLayer(String),

    #[error("Layer {layer} has no column {column}")]
    MissingColumn { layer: String, column: String },
}

/// Polygon(s) of one census block group
#[derive(Debug, Clone, PartialEq)]
pub struct BlockGroupGeometry {
    pub geoid: String,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryOptions {
    /// Attribute holding the block group id
    pub id_column: String,

    /// GeoPackage layer; first feature layer when unset
    pub layer: Option<String>,
}

impl Default for GeometryOptions {
    fn default() -> Self {
        GeometryOptions {
            id_column: "GEOID".to_string(),
            layer: None,
        }
    }
}

/// Load block group geometry, picking the reader from the file extension
pub fn load_geometry(path: &Path, options: &GeometryOptions) -> Result<Vec<BlockGroupGeometry>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    read_geometry(path, &bytes, options)
}

/// Parse geometry from `bytes`, the contents of `path` as already read.
///
/// GeoPackages are opened through SQLite at `path`, so the file is compared
/// with `bytes` afterwards and a change in between is an error.
pub fn read_geometry(
    path: &Path,
    bytes: &[u8],
    options: &GeometryOptions,
) -> Result<Vec<BlockGroupGeometry>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("gpkg") => {
            let geometries = gpkg::load_gpkg(path, options)?;
            let current = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            if current != bytes {
                bail!("{} changed while it was being loaded", path.display());
            }
            Ok(geometries)
        }
        Some("geojson") | Some("json") => {
            let text = std::str::from_utf8(bytes)
                .with_context(|| format!("{} is not valid UTF-8", path.display()))?;
            parse_geojson(text, options)
                .with_context(|| format!("Failed to parse {}", path.display()))
        }
        _ => bail!(
            "Unsupported geometry file {} (expected .gpkg or .geojson)",
            path.display()
        ),
    }
}

/// Block groups from a GeoJSON FeatureCollection
pub fn parse_geojson(text: &str, options: &GeometryOptions) -> Result<Vec<BlockGroupGeometry>> {
    let collection: geojson::FeatureCollection = text.parse()?;

    let mut geometries = Vec::new();
    for (index, feature) in collection.features.into_iter().enumerate() {
        let geoid = match feature.property(&options.id_column) {
            Some(serde_json::Value::String(id)) => id.trim().to_string(),
            Some(serde_json::Value::Number(id)) => id.to_string(),
            _ => {
                tracing::warn!(feature = index, column = %options.id_column, "feature has no id, skipped");
                continue;
            }
        };

        let Some(geometry) = feature.geometry else {
            tracing::warn!(geoid = %geoid, "feature has no geometry, skipped");
            continue;
        };

        let geometry: geo::Geometry<f64> = geometry
            .value
            .try_into()
            .with_context(|| format!("Invalid geometry for {}", geoid))?;

        let geometry = match geometry {
            geo::Geometry::Polygon(polygon) => MultiPolygon(vec![polygon]),
            geo::Geometry::MultiPolygon(multi) => multi,
            _ => {
                tracing::warn!(geoid = %geoid, "non-areal geometry, skipped");
                continue;
            }
        };

        geometries.push(BlockGroupGeometry { geoid, geometry });
    }

    Ok(geometries)
}

/// Bounding box over every geometry as [min_lon, min_lat, max_lon, max_lat]
pub fn bounds<'a, I>(geometries: I) -> Option<[f64; 4]>
where
    I: IntoIterator<Item = &'a MultiPolygon<f64>>,
{
    geometries
        .into_iter()
        .filter_map(|geometry| geometry.bounding_rect())
        .reduce(|a, b| {
            Rect::new(
                geo::coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
                geo::coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
            )
        })
        .map(|rect| [rect.min().x, rect.min().y, rect.max().x, rect.max().y])
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLLECTION: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "GEOID": "131370001001" },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-83.6, 34.5], [-83.5, 34.5], [-83.5, 34.6], [-83.6, 34.5]]]
                }
            },
            {
                "type": "Feature",
                "properties": { "GEOID": 130110101001 },
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [[[[-83.4, 34.2], [-83.3, 34.2], [-83.3, 34.3], [-83.4, 34.2]]]]
                }
            },
            {
                "type": "Feature",
                "properties": { "GEOID": "131370001009" },
                "geometry": { "type": "Point", "coordinates": [-83.5, 34.5] }
            },
            {
                "type": "Feature",
                "properties": { "NAME": "no id" },
                "geometry": null
            }
        ]
    }"#;

    #[test]
    fn test_parse_geojson_keeps_areal_features() {
        let geometries = parse_geojson(COLLECTION, &GeometryOptions::default()).unwrap();

        assert_eq!(geometries.len(), 2);
        assert_eq!(geometries[0].geoid, "131370001001");
        assert_eq!(geometries[1].geoid, "130110101001");
    }

    #[test]
    fn test_bounds_cover_all_geometries() {
        let geometries = parse_geojson(COLLECTION, &GeometryOptions::default()).unwrap();

        let bbox = bounds(geometries.iter().map(|g| &g.geometry)).unwrap();

        assert_eq!(bbox, [-83.6, 34.2, -83.3, 34.6]);
    }

    #[test]
    fn test_bounds_of_nothing() {
        assert_eq!(bounds(std::iter::empty()), None);
    }

    #[test]
    fn test_unknown_extension() {
        let err = read_geometry(Path::new("shapes.shp"), b"", &GeometryOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported geometry file"));
    }

    #[test]
    fn test_geojson_is_parsed_from_given_bytes() {
        // Path is only used for the extension; nothing is read from disk
        let geometries = read_geometry(
            Path::new("missing/blockGroups.geojson"),
            COLLECTION.as_bytes(),
            &GeometryOptions::default(),
        )
        .unwrap();

        assert_eq!(geometries.len(), 2);
    }
}
