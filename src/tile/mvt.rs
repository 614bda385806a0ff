//! Mapbox vector tile decoding.
//!
//! Tiles are protobuf messages (vector tile specification 2.1). Geometries are
//! decoded from their command streams into GeoJSON-like coordinates, in tile
//! pixel space (origin at the upper left corner, `y` growing downwards).

use std::collections::BTreeMap;

use prost::Message;
use serde::Serialize;

use crate::error::PyramidError;

// =============================================================================
// Protobuf schema
// =============================================================================

/// Protobuf messages of `vector_tile.proto`.
pub mod proto {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Tile {
        #[prost(message, repeated, tag = "3")]
        pub layers: Vec<Layer>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Layer {
        #[prost(uint32, required, tag = "15")]
        pub version: u32,
        #[prost(string, required, tag = "1")]
        pub name: String,
        #[prost(message, repeated, tag = "2")]
        pub features: Vec<Feature>,
        #[prost(string, repeated, tag = "3")]
        pub keys: Vec<String>,
        #[prost(message, repeated, tag = "4")]
        pub values: Vec<Value>,
        #[prost(uint32, optional, tag = "5")]
        pub extent: Option<u32>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Feature {
        #[prost(uint64, optional, tag = "1")]
        pub id: Option<u64>,
        #[prost(uint32, repeated, packed = "true", tag = "2")]
        pub tags: Vec<u32>,
        #[prost(enumeration = "GeomType", optional, tag = "3")]
        pub r#type: Option<i32>,
        #[prost(uint32, repeated, packed = "true", tag = "4")]
        pub geometry: Vec<u32>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Value {
        #[prost(string, optional, tag = "1")]
        pub string_value: Option<String>,
        #[prost(float, optional, tag = "2")]
        pub float_value: Option<f32>,
        #[prost(double, optional, tag = "3")]
        pub double_value: Option<f64>,
        #[prost(int64, optional, tag = "4")]
        pub int_value: Option<i64>,
        #[prost(uint64, optional, tag = "5")]
        pub uint_value: Option<u64>,
        #[prost(sint64, optional, tag = "6")]
        pub sint_value: Option<i64>,
        #[prost(bool, optional, tag = "7")]
        pub bool_value: Option<bool>,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum GeomType {
        Unknown = 0,
        Point = 1,
        Linestring = 2,
        Polygon = 3,
    }
}

use proto::GeomType;

/// Layer extent when the tile does not give one.
pub const DEFAULT_EXTENT: u32 = 4096;

const MOVE_TO: u32 = 1;
const LINE_TO: u32 = 2;
const CLOSE_PATH: u32 = 7;

// =============================================================================
// Decoded tile
// =============================================================================

/// A decoded vector tile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorTile {
    pub layers: Vec<VectorLayer>,
}

impl VectorTile {
    pub fn layer(&self, name: &str) -> Option<&VectorLayer> {
        self.layers.iter().find(|l| l.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorLayer {
    pub name: String,
    pub version: u32,
    pub extent: u32,
    pub features: Vec<VectorFeature>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorFeature {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub geometry: Geometry,
    pub properties: BTreeMap<String, PropertyValue>,
}

pub type Coordinates = [i64; 2];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Coordinates),
    MultiPoint(Vec<Coordinates>),
    LineString(Vec<Coordinates>),
    MultiLineString(Vec<Vec<Coordinates>>),
    Polygon(Vec<Vec<Coordinates>>),
    MultiPolygon(Vec<Vec<Vec<Coordinates>>>),
    Unknown,
}

/// Feature attribute value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    String(String),
    Float(f32),
    Double(f64),
    Int(i64),
    UInt(u64),
    Bool(bool),
    Null,
}

impl From<&proto::Value> for PropertyValue {
    fn from(value: &proto::Value) -> Self {
        if let Some(v) = &value.string_value {
            PropertyValue::String(v.clone())
        } else if let Some(v) = value.float_value {
            PropertyValue::Float(v)
        } else if let Some(v) = value.double_value {
            PropertyValue::Double(v)
        } else if let Some(v) = value.int_value.or(value.sint_value) {
            PropertyValue::Int(v)
        } else if let Some(v) = value.uint_value {
            PropertyValue::UInt(v)
        } else if let Some(v) = value.bool_value {
            PropertyValue::Bool(v)
        } else {
            PropertyValue::Null
        }
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a vector tile. `subject` names the tile in error messages.
pub fn decode(data: &[u8], subject: &str) -> Result<VectorTile, PyramidError> {
    let tile = proto::Tile::decode(data).map_err(|e| PyramidError::format("MVT", subject, e))?;

    let layers = tile
        .layers
        .iter()
        .map(|layer| decode_layer(layer).map_err(|cause| PyramidError::format("MVT", subject, cause)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(VectorTile { layers })
}

fn decode_layer(layer: &proto::Layer) -> Result<VectorLayer, String> {
    let mut features = Vec::with_capacity(layer.features.len());

    for feature in &layer.features {
        if feature.tags.len() % 2 != 0 {
            return Err(format!("odd tags count in layer {}", layer.name));
        }

        let mut properties = BTreeMap::new();
        for pair in feature.tags.chunks_exact(2) {
            let key = layer
                .keys
                .get(pair[0] as usize)
                .ok_or_else(|| format!("unknown key index {} in layer {}", pair[0], layer.name))?;
            let value = layer
                .values
                .get(pair[1] as usize)
                .ok_or_else(|| format!("unknown value index {} in layer {}", pair[1], layer.name))?;
            properties.insert(key.clone(), PropertyValue::from(value));
        }

        let geom_type = GeomType::try_from(feature.r#type.unwrap_or(0)).unwrap_or(GeomType::Unknown);

        features.push(VectorFeature {
            id: feature.id,
            geometry: decode_geometry(geom_type, &feature.geometry)?,
            properties,
        });
    }

    Ok(VectorLayer {
        name: layer.name.clone(),
        version: layer.version,
        extent: layer.extent.unwrap_or(DEFAULT_EXTENT),
        features,
    })
}

fn zigzag(value: u32) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Split a command stream into parts, one per `MoveTo` point.
///
/// `ClosePath` repeats the first point of the current part.
fn decode_parts(commands: &[u32]) -> Result<Vec<Vec<Coordinates>>, String> {
    let mut parts: Vec<Vec<Coordinates>> = Vec::new();
    let (mut x, mut y) = (0i64, 0i64);
    let mut i = 0;

    while i < commands.len() {
        let id = commands[i] & 0x7;
        let count = (commands[i] >> 3) as usize;
        i += 1;

        match id {
            MOVE_TO | LINE_TO => {
                for _ in 0..count {
                    let (dx, dy) = match (commands.get(i), commands.get(i + 1)) {
                        (Some(dx), Some(dy)) => (zigzag(*dx), zigzag(*dy)),
                        _ => return Err("truncated geometry".to_string()),
                    };
                    i += 2;
                    x += dx;
                    y += dy;

                    if id == MOVE_TO {
                        parts.push(vec![[x, y]]);
                    } else {
                        parts
                            .last_mut()
                            .ok_or("LineTo before any MoveTo")?
                            .push([x, y]);
                    }
                }
            }
            CLOSE_PATH => {
                let part = parts.last_mut().ok_or("ClosePath before any MoveTo")?;
                if let Some(first) = part.first().copied() {
                    part.push(first);
                }
            }
            other => return Err(format!("unknown geometry command {}", other)),
        }
    }

    Ok(parts)
}

/// Twice the signed area of a ring, positive for exterior rings.
fn ring_area(ring: &[Coordinates]) -> i64 {
    ring.windows(2)
        .map(|w| w[0][0] * w[1][1] - w[1][0] * w[0][1])
        .sum()
}

fn decode_geometry(geom_type: GeomType, commands: &[u32]) -> Result<Geometry, String> {
    let mut parts = decode_parts(commands)?;

    Ok(match geom_type {
        GeomType::Unknown => Geometry::Unknown,
        GeomType::Point => {
            let points: Vec<Coordinates> = parts.into_iter().flatten().collect();
            match points.as_slice() {
                [point] => Geometry::Point(*point),
                _ => Geometry::MultiPoint(points),
            }
        }
        GeomType::Linestring => {
            if parts.len() == 1 {
                Geometry::LineString(parts.remove(0))
            } else {
                Geometry::MultiLineString(parts)
            }
        }
        GeomType::Polygon => {
            let mut polygons: Vec<Vec<Vec<Coordinates>>> = Vec::new();
            for ring in parts {
                match polygons.last_mut() {
                    Some(polygon) if ring_area(&ring) <= 0 => polygon.push(ring),
                    _ => polygons.push(vec![ring]),
                }
            }

            if polygons.len() == 1 {
                Geometry::Polygon(polygons.remove(0))
            } else {
                Geometry::MultiPolygon(polygons)
            }
        }
    })
}
