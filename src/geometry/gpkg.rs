// GeoPackage layer reader (SQLite container)
//
// Reads one feature table: the id column plus the geometry column named in
// gpkg_geometry_columns. Only areal geometries are kept.

use super::wkb::decode_gpkg;
use super::{BlockGroupGeometry, GeometryError, GeometryOptions};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;

/// SRS ids whose coordinates are plain longitude/latitude
const GEOGRAPHIC_SRS: [i32; 3] = [4326, 4269, 4258];

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// First feature table, or the requested one if it exists
fn resolve_layer(conn: &Connection, requested: Option<&str>) -> Result<String> {
    let layer: Option<String> = match requested {
        Some(name) => conn
            .query_row(
                "SELECT table_name FROM gpkg_contents
                 WHERE data_type = 'features' AND table_name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?,
        None => conn
            .query_row(
                "SELECT table_name FROM gpkg_contents
                 WHERE data_type = 'features' ORDER BY rowid LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?,
    };

    layer.ok_or_else(|| {
        GeometryError::MissingLayer(requested.unwrap_or("<first features layer>").to_string())
            .into()
    })
}

fn geometry_column(conn: &Connection, layer: &str) -> Result<(String, i32)> {
    conn.query_row(
        "SELECT column_name, srs_id FROM gpkg_geometry_columns WHERE table_name = ?1",
        params![layer],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()?
    .ok_or_else(|| GeometryError::MissingLayer(format!("{} (no geometry column)", layer)).into())
}

/// Read block group polygons from a GeoPackage file
pub fn load_gpkg(path: &Path, options: &GeometryOptions) -> Result<Vec<BlockGroupGeometry>> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open GeoPackage {}", path.display()))?;
    read_gpkg(&conn, options).with_context(|| format!("Failed to read {}", path.display()))
}

pub fn read_gpkg(conn: &Connection, options: &GeometryOptions) -> Result<Vec<BlockGroupGeometry>> {
    let layer = resolve_layer(conn, options.layer.as_deref())?;
    let (geom_column, srs_id) = geometry_column(conn, &layer)?;

    if !GEOGRAPHIC_SRS.contains(&srs_id) {
        tracing::warn!(
            layer = %layer,
            srs_id,
            "geometry is not in a lon/lat reference system; the map may be misplaced"
        );
    }

    let has_id: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2 COLLATE NOCASE)",
        params![layer, options.id_column],
        |row| row.get(0),
    )?;
    if !has_id {
        return Err(GeometryError::MissingColumn {
            layer,
            column: options.id_column.clone(),
        }
        .into());
    }

    let sql = format!(
        "SELECT CAST({} AS TEXT), {} FROM {}",
        quote_ident(&options.id_column),
        quote_ident(&geom_column),
        quote_ident(&layer)
    );
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt.query_map([], |row| {
        let geoid: Option<String> = row.get(0)?;
        let blob: Option<Vec<u8>> = row.get(1)?;
        Ok((geoid, blob))
    })?;

    let mut geometries = Vec::new();
    let mut skipped = 0usize;

    for (index, row) in rows.enumerate() {
        let (geoid, blob) = row?;
        let (Some(geoid), Some(blob)) = (geoid, blob) else {
            skipped += 1;
            continue;
        };

        let decoded = match decode_gpkg(&blob) {
            Ok(decoded) => decoded,
            Err(GeometryError::UnsupportedType(kind)) => {
                tracing::warn!(geoid = %geoid, kind, "skipping non-areal geometry");
                skipped += 1;
                continue;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Bad geometry in feature {}", index + 1))
            }
        };

        match decoded.geometry {
            Some(geometry) => geometries.push(BlockGroupGeometry {
                geoid: geoid.trim().to_string(),
                geometry,
            }),
            None => skipped += 1,
        }
    }

    tracing::info!(
        layer = %layer,
        features = geometries.len(),
        skipped,
        "GeoPackage layer loaded"
    );

    Ok(geometries)
}
