//! GeoJSON geometry handling: parsing, coercion to multi form, validity
//! and simplicity checks, and containment tests.
//!
//! Geometry is stored as GeoJSON in `jsonb` columns and evaluated
//! in-process; nothing here touches the database.

use geo::{Contains, Intersects, Validation};
use geo_types::{Geometry, Line, LineString, MultiLineString, MultiPoint, MultiPolygon, Point};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// The national coordinate reference system (ETRS89 / TM35FIN).
pub const PROJECT_SRID: i32 = 3067;

/// Errors from geometry parsing and validation.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("invalid GeoJSON geometry: {0}")]
    Parse(String),
    #[error("unsupported geometry type {0}")]
    Unsupported(String),
    #[error("geometry SRID {0} does not match project SRID {PROJECT_SRID}")]
    SridMismatch(i32),
    #[error("area geometry is not valid")]
    InvalidArea,
    #[error("line geometry intersects itself")]
    SelfIntersectingLine,
}

/// Parse a GeoJSON value into a geometry.
pub fn parse(json: &JsonValue) -> Result<Geometry<f64>, GeometryError> {
    let geojson: geojson::Geometry =
        serde_json::from_value(json.clone()).map_err(|e| GeometryError::Parse(e.to_string()))?;
    Geometry::<f64>::try_from(geojson).map_err(|e| GeometryError::Parse(e.to_string()))
}

/// Serialize a geometry back to a GeoJSON value.
pub fn to_json(geometry: &Geometry<f64>) -> Result<JsonValue, GeometryError> {
    let geojson = geojson::Geometry::new(geojson::Value::from(geometry));
    serde_json::to_value(geojson).map_err(|e| GeometryError::Parse(e.to_string()))
}

/// Coerce a geometry to its multi form. Storage accepts only multi
/// geometries so that single and multi inputs land in the same shape.
pub fn to_multi(geometry: Geometry<f64>) -> Result<Geometry<f64>, GeometryError> {
    match geometry {
        Geometry::Polygon(p) => Ok(Geometry::MultiPolygon(MultiPolygon(vec![p]))),
        Geometry::Point(p) => Ok(Geometry::MultiPoint(MultiPoint(vec![p]))),
        Geometry::LineString(l) => Ok(Geometry::MultiLineString(MultiLineString(vec![l]))),
        g @ (Geometry::MultiPolygon(_)
        | Geometry::MultiPoint(_)
        | Geometry::MultiLineString(_)) => Ok(g),
        other => Err(GeometryError::Unsupported(type_name(&other).to_owned())),
    }
}

/// Unwrap a single-member multi geometry to its single form for wire
/// output; anything else passes through unchanged.
pub fn unwrap_single(geometry: Geometry<f64>) -> Geometry<f64> {
    match geometry {
        Geometry::MultiPolygon(mp) if mp.0.len() == 1 => {
            let mut polygons = mp.0;
            Geometry::Polygon(polygons.remove(0))
        }
        Geometry::MultiPoint(mp) if mp.0.len() == 1 => Geometry::Point(mp.0[0]),
        Geometry::MultiLineString(ml) if ml.0.len() == 1 => {
            let mut lines = ml.0;
            Geometry::LineString(lines.remove(0))
        }
        other => other,
    }
}

/// Validate a geometry for storage: areas must be OGC-valid, lines must be
/// OGC-valid and simple, points are always acceptable.
pub fn validate(geometry: &Geometry<f64>) -> Result<(), GeometryError> {
    match geometry {
        Geometry::Polygon(p) => {
            if !p.is_valid() {
                return Err(GeometryError::InvalidArea);
            }
            Ok(())
        }
        Geometry::MultiPolygon(mp) => {
            if !mp.is_valid() {
                return Err(GeometryError::InvalidArea);
            }
            Ok(())
        }
        Geometry::LineString(l) => validate_line(l),
        Geometry::MultiLineString(ml) => {
            for line in &ml.0 {
                validate_line(line)?;
            }
            Ok(())
        }
        Geometry::Point(_) | Geometry::MultiPoint(_) => Ok(()),
        other => Err(GeometryError::Unsupported(type_name(other).to_owned())),
    }
}

fn validate_line(line: &LineString<f64>) -> Result<(), GeometryError> {
    if !line.is_valid() {
        return Err(GeometryError::SelfIntersectingLine);
    }
    if !line_is_simple(line) {
        return Err(GeometryError::SelfIntersectingLine);
    }
    Ok(())
}

/// A line is simple when no two segments touch except at the shared vertex
/// of consecutive segments (or the shared endpoint of a closed ring).
fn line_is_simple(line: &LineString<f64>) -> bool {
    let segments: Vec<Line<f64>> = line.lines().collect();
    for i in 0..segments.len() {
        for j in (i + 1)..segments.len() {
            let adjacent = j == i + 1;
            let closing = i == 0 && j == segments.len() - 1 && line.is_closed();
            if adjacent {
                // Consecutive segments share one vertex; any further
                // contact means the line doubles back over itself.
                if segments[i].intersects(&Point::from(segments[j].end))
                    || segments[j].intersects(&Point::from(segments[i].start))
                {
                    return false;
                }
            } else if closing {
                if segments[i].intersects(&Point::from(segments[j].start))
                    || segments[j].intersects(&Point::from(segments[i].end))
                {
                    return false;
                }
            } else if segments[i].intersects(&segments[j]) {
                return false;
            }
        }
    }
    true
}

/// Whether `outer` spatially contains `inner`.
pub fn contains(outer: &Geometry<f64>, inner: &Geometry<f64>) -> bool {
    outer.contains(inner)
}

/// Check a stored SRID against the project SRID.
pub fn check_srid(srid: i32) -> Result<(), GeometryError> {
    if srid == PROJECT_SRID {
        Ok(())
    } else {
        Err(GeometryError::SridMismatch(srid))
    }
}

fn type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}
