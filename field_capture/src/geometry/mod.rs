//! Geometry value types for drawn polygons.
//!
//! Shapes coming out of the drawing tool are converted into a
//! [`PolygonShape`] at the boundary; everything downstream (the annotation
//! protocol, the record store, the exporters) only ever sees validated rings.

pub mod point;
pub use point::Point;

use geojson::{GeoJson, Value};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a drawn or serialized geometry cannot be used.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("a polygon needs at least three vertices, got {0}")]
    TooFewVertices(usize),
    #[error("vertex {0} has a non-finite coordinate")]
    NonFiniteCoordinate(usize),
    #[error("rectangle corners do not span an area")]
    DegenerateRectangle,
    #[error("unsupported geometry: {0}")]
    UnsupportedGeometry(String),
    #[error("feature has no geometry")]
    MissingGeometry,
    #[error("invalid WKT: {0}")]
    InvalidWkt(String),
    #[error("invalid GeoJSON: {0}")]
    InvalidGeoJson(String),
}

/// Text encoding used for the `coordenadas` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryEncoding {
    /// Well-known text, e.g. `POLYGON((x y, ...))`.
    #[default]
    Wkt,
    /// A GeoJSON geometry object.
    GeoJson,
}

/// Shape emitted by the drawing tool when the user finishes drawing.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawnShape {
    /// Free-hand polygon, vertices in drawing order.
    Polygon(Vec<Point>),
    /// Axis aligned rectangle given by two opposite corners.
    Rectangle { south_west: Point, north_east: Point },
}

impl DrawnShape {
    /// Converts the drawn shape into a validated polygon ring.
    pub fn into_polygon(self) -> Result<PolygonShape, GeometryError> {
        match self {
            DrawnShape::Polygon(vertices) => PolygonShape::new(vertices),
            DrawnShape::Rectangle {
                south_west,
                north_east,
            } => {
                if !south_west.is_finite() {
                    return Err(GeometryError::NonFiniteCoordinate(0));
                }
                if !north_east.is_finite() {
                    return Err(GeometryError::NonFiniteCoordinate(1));
                }
                let west = south_west.x.min(north_east.x);
                let east = south_west.x.max(north_east.x);
                let south = south_west.y.min(north_east.y);
                let north = south_west.y.max(north_east.y);
                if west == east || south == north {
                    return Err(GeometryError::DegenerateRectangle);
                }
                PolygonShape::new(vec![
                    Point::new(west, south),
                    Point::new(west, north),
                    Point::new(east, north),
                    Point::new(east, south),
                ])
            }
        }
    }
}

/// Closed polygon ring with at least three vertices.
///
/// The ring is stored open: the closing vertex is implied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPolygon")]
pub struct PolygonShape {
    vertices: Vec<Point>,
}

#[derive(Deserialize)]
struct RawPolygon {
    vertices: Vec<Point>,
}

impl TryFrom<RawPolygon> for PolygonShape {
    type Error = GeometryError;

    fn try_from(raw: RawPolygon) -> Result<Self, Self::Error> {
        Self::new(raw.vertices)
    }
}

impl PolygonShape {
    /// Creates a polygon from its vertices. A trailing vertex equal to the
    /// first one is treated as the closing vertex and dropped.
    pub fn new(mut vertices: Vec<Point>) -> Result<Self, GeometryError> {
        if let Some(idx) = vertices.iter().position(|p| !p.is_finite()) {
            return Err(GeometryError::NonFiniteCoordinate(idx));
        }
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        if vertices.len() < 3 {
            return Err(GeometryError::TooFewVertices(vertices.len()));
        }
        Ok(Self { vertices })
    }

    /// Returns the open ring.
    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// Returns the ring with the first vertex repeated at the end.
    pub fn closed_ring(&self) -> Vec<Point> {
        let mut ring = self.vertices.clone();
        ring.push(self.vertices[0]);
        ring
    }

    /// Planar area of the ring in squared coordinate units.
    pub fn planar_area(&self) -> f64 {
        polygon_area(&self.vertices)
    }

    /// Formats the polygon as WKT.
    pub fn to_wkt(&self) -> String {
        let coords: Vec<String> = self
            .closed_ring()
            .iter()
            .map(|p| format!("{} {}", p.x, p.y))
            .collect();
        format!("POLYGON(({}))", coords.join(", "))
    }

    /// Parses a `POLYGON` (or single-part `MULTIPOLYGON`) WKT string.
    pub fn from_wkt(text: &str) -> Result<Self, GeometryError> {
        let trimmed = text.trim();
        let upper = trimmed.to_ascii_uppercase();
        let (rest, depth) = if upper.starts_with("MULTIPOLYGON") {
            (&trimmed["MULTIPOLYGON".len()..], 3)
        } else if upper.starts_with("POLYGON") {
            (&trimmed["POLYGON".len()..], 2)
        } else {
            return Err(GeometryError::InvalidWkt(
                "expected POLYGON or MULTIPOLYGON".to_string(),
            ));
        };
        let rest = rest.trim_start();
        let opening = rest
            .chars()
            .take_while(|c| *c == '(' || c.is_whitespace())
            .filter(|c| *c == '(')
            .count();
        if opening != depth {
            return Err(GeometryError::InvalidWkt(format!(
                "expected {} opening parentheses, found {}",
                depth, opening
            )));
        }
        let body = rest.trim_start_matches(|c: char| c == '(' || c.is_whitespace());
        let end = body
            .find(')')
            .ok_or_else(|| GeometryError::InvalidWkt("unterminated ring".to_string()))?;
        let tail = &body[end..];
        if tail.contains('(') {
            return Err(GeometryError::UnsupportedGeometry(
                "polygons with holes or several parts".to_string(),
            ));
        }
        if tail.chars().any(|c| c != ')' && !c.is_whitespace()) {
            return Err(GeometryError::InvalidWkt(format!(
                "unexpected trailing text {:?}",
                tail
            )));
        }
        let mut vertices = Vec::new();
        for (idx, pair) in body[..end].split(',').enumerate() {
            let parts: Vec<&str> = pair.split_whitespace().collect();
            if parts.len() < 2 || parts.len() > 3 {
                return Err(GeometryError::InvalidWkt(format!(
                    "vertex {}: expected x y",
                    idx + 1
                )));
            }
            let x: f64 = parts[0]
                .parse()
                .map_err(|e| GeometryError::InvalidWkt(format!("vertex {}: {}", idx + 1, e)))?;
            let y: f64 = parts[1]
                .parse()
                .map_err(|e| GeometryError::InvalidWkt(format!("vertex {}: {}", idx + 1, e)))?;
            vertices.push(Point::new(x, y));
        }
        Self::new(vertices)
    }

    /// Builds a GeoJSON polygon geometry.
    pub fn to_geojson(&self) -> geojson::Geometry {
        let ring = self
            .closed_ring()
            .iter()
            .map(|p| vec![p.x, p.y])
            .collect();
        geojson::Geometry::new(Value::Polygon(vec![ring]))
    }

    /// Extracts a polygon from a GeoJSON geometry, a feature, or a feature
    /// collection holding exactly one feature.
    pub fn from_geojson(value: &GeoJson) -> Result<Self, GeometryError> {
        match value {
            GeoJson::Geometry(geometry) => Self::from_geojson_geometry(geometry),
            GeoJson::Feature(feature) => match &feature.geometry {
                Some(geometry) => Self::from_geojson_geometry(geometry),
                None => Err(GeometryError::MissingGeometry),
            },
            GeoJson::FeatureCollection(collection) => match collection.features.as_slice() {
                [feature] => match &feature.geometry {
                    Some(geometry) => Self::from_geojson_geometry(geometry),
                    None => Err(GeometryError::MissingGeometry),
                },
                features => Err(GeometryError::UnsupportedGeometry(format!(
                    "feature collection with {} features",
                    features.len()
                ))),
            },
        }
    }

    /// Extracts a polygon from a GeoJSON geometry object.
    pub fn from_geojson_geometry(geometry: &geojson::Geometry) -> Result<Self, GeometryError> {
        match &geometry.value {
            Value::Polygon(rings) => Self::from_rings(rings),
            Value::MultiPolygon(polygons) if polygons.len() == 1 => Self::from_rings(&polygons[0]),
            other => Err(GeometryError::UnsupportedGeometry(
                value_kind(other).to_string(),
            )),
        }
    }

    fn from_rings(rings: &[Vec<Vec<f64>>]) -> Result<Self, GeometryError> {
        if rings.len() > 1 {
            return Err(GeometryError::UnsupportedGeometry(
                "polygons with holes".to_string(),
            ));
        }
        let Some(ring) = rings.first() else {
            return Err(GeometryError::TooFewVertices(0));
        };
        let mut vertices = Vec::with_capacity(ring.len());
        for (idx, position) in ring.iter().enumerate() {
            if position.len() < 2 {
                return Err(GeometryError::InvalidGeoJson(format!(
                    "position {} has fewer than two coordinates",
                    idx + 1
                )));
            }
            vertices.push(Point::new(position[0], position[1]));
        }
        Self::new(vertices)
    }

    /// Serializes the polygon for the `coordenadas` column.
    pub fn encode(&self, encoding: GeometryEncoding) -> String {
        match encoding {
            GeometryEncoding::Wkt => self.to_wkt(),
            GeometryEncoding::GeoJson => GeoJson::Geometry(self.to_geojson()).to_string(),
        }
    }

    /// Parses a stored `coordenadas` value, detecting WKT or GeoJSON.
    pub fn decode(text: &str) -> Result<Self, GeometryError> {
        let trimmed = text.trim();
        if trimmed.starts_with('{') {
            let value: GeoJson = trimmed
                .parse()
                .map_err(|e: geojson::Error| GeometryError::InvalidGeoJson(e.to_string()))?;
            Self::from_geojson(&value)
        } else {
            Self::from_wkt(trimmed)
        }
    }

    /// Converts into a `geo-types` polygon without holes.
    pub fn to_geo(&self) -> geo_types::Polygon<f64> {
        let exterior: Vec<(f64, f64)> = self.closed_ring().iter().map(|p| (p.x, p.y)).collect();
        geo_types::Polygon::new(geo_types::LineString::from(exterior), Vec::new())
    }

    /// Builds a polygon from the exterior ring of a `geo-types` polygon.
    pub fn from_geo(polygon: &geo_types::Polygon<f64>) -> Result<Self, GeometryError> {
        if !polygon.interiors().is_empty() {
            return Err(GeometryError::UnsupportedGeometry(
                "polygons with holes".to_string(),
            ));
        }
        let vertices = polygon
            .exterior()
            .coords()
            .map(|c| Point::new(c.x, c.y))
            .collect();
        Self::new(vertices)
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Point(_) => "Point",
        Value::MultiPoint(_) => "MultiPoint",
        Value::LineString(_) => "LineString",
        Value::MultiLineString(_) => "MultiLineString",
        Value::Polygon(_) => "Polygon",
        Value::MultiPolygon(_) => "MultiPolygon",
        Value::GeometryCollection(_) => "GeometryCollection",
    }
}

/// Calculates the area of a simple polygon using the shoelace formula.
pub fn polygon_area(vertices: &[Point]) -> f64 {
    if vertices.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..vertices.len() {
        let j = (i + 1) % vertices.len();
        sum += vertices[i].x * vertices[j].y - vertices[j].x * vertices[i].y;
    }
    sum.abs() * 0.5
}
