// GeoPackage binary + WKB decoding for areal geometries
//
// Layout of a GeoPackage geometry blob:
//   "GP" | version u8 | flags u8 | srs_id i32 | envelope (0/32/48/64 bytes) | WKB
// Flags: bit 0 = header byte order (1 = little endian), bits 1-3 = envelope
// kind, bit 4 = empty geometry, bit 5 = extended type.

use super::GeometryError;
use geo::{Coord, LineString, MultiPolygon, Polygon};

const WKB_POLYGON: u32 = 3;
const WKB_MULTI_POLYGON: u32 = 6;

// EWKB dimension flags (PostGIS style)
const EWKB_Z: u32 = 0x8000_0000;
const EWKB_M: u32 = 0x4000_0000;
const EWKB_SRID: u32 = 0x2000_0000;

/// Decoded GeoPackage geometry
#[derive(Debug, Clone, PartialEq)]
pub struct GpkgGeometry {
    pub srs_id: i32,

    /// `None` when the header marks the geometry as empty
    pub geometry: Option<MultiPolygon<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    fn from_flag(flag: u8) -> Result<Self, GeometryError> {
        match flag {
            0 => Ok(ByteOrder::Big),
            1 => Ok(ByteOrder::Little),
            other => Err(GeometryError::Malformed(format!(
                "invalid byte order marker {}",
                other
            ))),
        }
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], GeometryError> {
        let end = self.pos + N;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(GeometryError::Truncated { offset: self.pos })?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn skip(&mut self, n: usize) -> Result<(), GeometryError> {
        if self.pos + n > self.bytes.len() {
            return Err(GeometryError::Truncated { offset: self.pos });
        }
        self.pos += n;
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, GeometryError> {
        Ok(self.take::<1>()?[0])
    }

    fn u32(&mut self, order: ByteOrder) -> Result<u32, GeometryError> {
        let raw = self.take::<4>()?;
        Ok(match order {
            ByteOrder::Big => u32::from_be_bytes(raw),
            ByteOrder::Little => u32::from_le_bytes(raw),
        })
    }

    fn i32(&mut self, order: ByteOrder) -> Result<i32, GeometryError> {
        let raw = self.take::<4>()?;
        Ok(match order {
            ByteOrder::Big => i32::from_be_bytes(raw),
            ByteOrder::Little => i32::from_le_bytes(raw),
        })
    }

    fn f64(&mut self, order: ByteOrder) -> Result<f64, GeometryError> {
        let raw = self.take::<8>()?;
        Ok(match order {
            ByteOrder::Big => f64::from_be_bytes(raw),
            ByteOrder::Little => f64::from_le_bytes(raw),
        })
    }

    /// Element count, bounded by the bytes actually left
    fn count(&mut self, order: ByteOrder, min_item_size: usize) -> Result<usize, GeometryError> {
        let count = self.u32(order)? as usize;
        let remaining = self.bytes.len() - self.pos;
        if count.saturating_mul(min_item_size) > remaining {
            return Err(GeometryError::Truncated { offset: self.pos });
        }
        Ok(count)
    }
}

/// Decode a GeoPackage geometry blob into a multipolygon
pub fn decode_gpkg(blob: &[u8]) -> Result<GpkgGeometry, GeometryError> {
    let mut reader = Reader::new(blob);

    let magic = reader.take::<2>()?;
    if &magic != b"GP" {
        return Err(GeometryError::Malformed(
            "missing GeoPackage magic bytes".to_string(),
        ));
    }

    let version = reader.u8()?;
    if version != 0 {
        return Err(GeometryError::Malformed(format!(
            "unsupported GeoPackage binary version {}",
            version
        )));
    }

    let flags = reader.u8()?;
    let header_order = ByteOrder::from_flag(flags & 0b1)?;
    let envelope_len = match (flags >> 1) & 0b111 {
        0 => 0,
        1 => 32,
        2 | 3 => 48,
        4 => 64,
        other => {
            return Err(GeometryError::Malformed(format!(
                "invalid envelope indicator {}",
                other
            )))
        }
    };
    let empty = flags & 0b1_0000 != 0;

    let srs_id = reader.i32(header_order)?;
    reader.skip(envelope_len)?;

    if empty {
        return Ok(GpkgGeometry {
            srs_id,
            geometry: None,
        });
    }

    let geometry = read_areal(&mut reader)?;
    let geometry = if geometry.0.is_empty() {
        None
    } else {
        Some(geometry)
    };

    Ok(GpkgGeometry { srs_id, geometry })
}

/// Decode a bare WKB polygon or multipolygon
pub fn decode_wkb(bytes: &[u8]) -> Result<MultiPolygon<f64>, GeometryError> {
    read_areal(&mut Reader::new(bytes))
}

/// Base geometry type plus the number of ordinates per point
fn split_type(raw: u32) -> (u32, usize) {
    let mut dims = 2;
    if raw & EWKB_Z != 0 {
        dims += 1;
    }
    if raw & EWKB_M != 0 {
        dims += 1;
    }
    let iso = raw & !(EWKB_Z | EWKB_M | EWKB_SRID);

    // ISO WKB: 1000s = Z, 2000s = M, 3000s = ZM
    let base = iso % 1000;
    dims += match iso / 1000 {
        1 | 2 => 1,
        3 => 2,
        _ => 0,
    };

    (base, dims)
}

fn read_header(reader: &mut Reader) -> Result<(ByteOrder, u32, usize), GeometryError> {
    let order = ByteOrder::from_flag(reader.u8()?)?;
    let raw = reader.u32(order)?;
    if raw & EWKB_SRID != 0 {
        reader.skip(4)?;
    }
    let (base, dims) = split_type(raw);
    Ok((order, base, dims))
}

fn read_areal(reader: &mut Reader) -> Result<MultiPolygon<f64>, GeometryError> {
    let (order, base, dims) = read_header(reader)?;

    match base {
        WKB_POLYGON => {
            let polygon = read_polygon_body(reader, order, dims)?;
            Ok(MultiPolygon(polygon.into_iter().collect()))
        }
        WKB_MULTI_POLYGON => {
            let count = reader.count(order, 9)?;
            let mut polygons = Vec::with_capacity(count);
            for _ in 0..count {
                let (inner_order, inner_base, inner_dims) = read_header(reader)?;
                if inner_base != WKB_POLYGON {
                    return Err(GeometryError::UnsupportedType(inner_base));
                }
                if let Some(polygon) = read_polygon_body(reader, inner_order, inner_dims)? {
                    polygons.push(polygon);
                }
            }
            Ok(MultiPolygon(polygons))
        }
        other => Err(GeometryError::UnsupportedType(other)),
    }
}

/// Polygon rings; `None` for a polygon with no rings
fn read_polygon_body(
    reader: &mut Reader,
    order: ByteOrder,
    dims: usize,
) -> Result<Option<Polygon<f64>>, GeometryError> {
    let ring_count = reader.count(order, 4)?;
    let mut rings = Vec::with_capacity(ring_count);

    for _ in 0..ring_count {
        let point_count = reader.count(order, dims * 8)?;
        let mut coords = Vec::with_capacity(point_count);
        for _ in 0..point_count {
            let x = reader.f64(order)?;
            let y = reader.f64(order)?;
            reader.skip((dims - 2) * 8)?;
            coords.push(Coord { x, y });
        }
        rings.push(LineString::new(coords));
    }

    let mut rings = rings.into_iter();
    Ok(rings
        .next()
        .map(|exterior| Polygon::new(exterior, rings.collect())))
}
