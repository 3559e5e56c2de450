//! Conversion of topology geometries into GeoJSON-shaped geometries

use crate::arc::{ArcTable, Position};
use crate::topology::TopoGeometry;
use crate::{Result, TopoError};
use geo::BoundingRect;
use serde::{Deserialize, Serialize};

/// A decoded geometry, serialized as `{"type": ..., "coordinates": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Geometry {
    /// GeoJSON type name
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Point(_) => "Point",
            Self::MultiPoint(_) => "MultiPoint",
            Self::LineString(_) => "LineString",
            Self::MultiLineString(_) => "MultiLineString",
            Self::Polygon(_) => "Polygon",
            Self::MultiPolygon(_) => "MultiPolygon",
        }
    }

    /// Total number of positions across all parts
    pub fn position_count(&self) -> usize {
        match self {
            Self::Point(_) => 1,
            Self::MultiPoint(points) | Self::LineString(points) => points.len(),
            Self::MultiLineString(lines) | Self::Polygon(lines) => {
                lines.iter().map(Vec::len).sum()
            }
            Self::MultiPolygon(polygons) => polygons
                .iter()
                .flat_map(|polygon| polygon.iter())
                .map(Vec::len)
                .sum(),
        }
    }

    /// Convert into a `geo` geometry for spatial operations
    ///
    /// A polygon with no rings becomes an empty polygon; holes follow the exterior.
    pub fn to_geo(&self) -> geo::Geometry<f64> {
        match self {
            Self::Point([x, y]) => geo::Geometry::Point(geo::Point::new(*x, *y)),
            Self::MultiPoint(points) => geo::Geometry::MultiPoint(geo::MultiPoint::new(
                points.iter().map(|[x, y]| geo::Point::new(*x, *y)).collect(),
            )),
            Self::LineString(line) => geo::Geometry::LineString(to_line_string(line)),
            Self::MultiLineString(lines) => geo::Geometry::MultiLineString(
                geo::MultiLineString::new(lines.iter().map(|l| to_line_string(l)).collect()),
            ),
            Self::Polygon(rings) => geo::Geometry::Polygon(to_polygon(rings)),
            Self::MultiPolygon(polygons) => geo::Geometry::MultiPolygon(geo::MultiPolygon::new(
                polygons.iter().map(|rings| to_polygon(rings)).collect(),
            )),
        }
    }

    /// Bounding box of the geometry, `None` if it has no positions
    pub fn bounding_rect(&self) -> Option<geo::Rect<f64>> {
        self.to_geo().bounding_rect()
    }
}

fn to_line_string(line: &[Position]) -> geo::LineString<f64> {
    geo::LineString::new(line.iter().map(|[x, y]| geo::Coord { x: *x, y: *y }).collect())
}

fn to_polygon(rings: &[Vec<Position>]) -> geo::Polygon<f64> {
    let mut rings = rings.iter().map(|ring| to_line_string(ring));
    let exterior = rings.next().unwrap_or_else(|| geo::LineString::new(Vec::new()));
    geo::Polygon::new(exterior, rings.collect())
}

fn payload<'a>(
    geometry: &'a TopoGeometry,
    value: Option<&'a serde_json::Value>,
    field: &str,
) -> Result<&'a serde_json::Value> {
    value.ok_or_else(|| {
        TopoError::Geometry(format!("{} geometry has no '{field}' payload", geometry.kind))
    })
}

fn parse<'a, T: Deserialize<'a>>(
    geometry: &TopoGeometry,
    value: &'a serde_json::Value,
) -> Result<T> {
    T::deserialize(value)
        .map_err(|e| TopoError::Geometry(format!("malformed {} payload: {e}", geometry.kind)))
}

fn parse_position(geometry: &TopoGeometry, raw: &[f64]) -> Result<Position> {
    match raw {
        [x, y, ..] => Ok([*x, *y]),
        _ => Err(TopoError::Geometry(format!(
            "{} position needs at least two components, got {}",
            geometry.kind,
            raw.len()
        ))),
    }
}

/// Rings that assemble to nothing are dropped
fn assemble_polygon(rings: &[Vec<i64>], arcs: &ArcTable<'_>) -> Vec<Vec<Position>> {
    rings
        .iter()
        .map(|ring| arcs.assemble(ring))
        .filter(|ring| !ring.is_empty())
        .collect()
}

/// Convert one source geometry into its GeoJSON shape
///
/// Fails with [`TopoError::Geometry`] on an unsupported type or a payload that does
/// not match the type; the error only concerns this one geometry.
pub fn convert_geometry(geometry: &TopoGeometry, arcs: &ArcTable<'_>) -> Result<Geometry> {
    match geometry.kind.as_str() {
        "Point" => {
            let raw = payload(geometry, geometry.coordinates.as_ref(), "coordinates")?;
            let coords: Vec<f64> = parse(geometry, raw)?;
            Ok(Geometry::Point(parse_position(geometry, &coords)?))
        }
        "MultiPoint" => {
            let raw = payload(geometry, geometry.coordinates.as_ref(), "coordinates")?;
            let coords: Vec<Vec<f64>> = parse(geometry, raw)?;
            let points = coords
                .iter()
                .map(|c| parse_position(geometry, c))
                .collect::<Result<Vec<_>>>()?;
            Ok(Geometry::MultiPoint(points))
        }
        "LineString" => {
            let raw = payload(geometry, geometry.arcs.as_ref(), "arcs")?;
            let refs: Vec<i64> = parse(geometry, raw)?;
            Ok(Geometry::LineString(arcs.assemble(&refs)))
        }
        "MultiLineString" => {
            let raw = payload(geometry, geometry.arcs.as_ref(), "arcs")?;
            let lines: Vec<Vec<i64>> = parse(geometry, raw)?;
            Ok(Geometry::MultiLineString(
                lines.iter().map(|line| arcs.assemble(line)).collect(),
            ))
        }
        "Polygon" => {
            let raw = payload(geometry, geometry.arcs.as_ref(), "arcs")?;
            let rings: Vec<Vec<i64>> = parse(geometry, raw)?;
            Ok(Geometry::Polygon(assemble_polygon(&rings, arcs)))
        }
        "MultiPolygon" => {
            let raw = payload(geometry, geometry.arcs.as_ref(), "arcs")?;
            let polygons: Vec<Vec<Vec<i64>>> = parse(geometry, raw)?;
            Ok(Geometry::MultiPolygon(
                polygons
                    .iter()
                    .map(|rings| assemble_polygon(rings, arcs))
                    .collect(),
            ))
        }
        other => Err(TopoError::Geometry(format!(
            "unsupported geometry type: {other}"
        ))),
    }
}
