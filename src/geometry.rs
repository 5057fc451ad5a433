//! Pure geometry for the transformation core: WKT parsing, line/line
//! intersection points, projection of a point onto a pipe centerline, and
//! centerline substring extraction. No I/O happens here.

use crate::errors::NetworkError;
use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::{Distance, Euclidean, Length, LineLocatePoint};
use geo_types::{Coord, Geometry, Line, LineString, Point};
use wkt::TryFromWkt;

/// Distances along a pipe are keyed in whole centimetres; positions closer
/// together than this are the same topological point.
pub const CM_PER_M: f64 = 100.0;

const ALLOWED_INTERSECTION_TYPES: &str = "LineString, MultiLineString, Point";

/// Coincident-point tolerance when deduplicating raw intersection output.
/// Far below the centimetre consolidation grid, so it only collapses
/// floating-point twins.
const COINCIDENT_EPS: f64 = 1e-6;

/// An intersection point projected onto the base pipe's centerline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointOnLine {
    pub point: Point<f64>,
    /// Linear distance from the pipe start along the centerline, in metres.
    pub distance_m: f64,
    /// `round(distance_m * 100)`, the consolidation key.
    pub distance_cm: i64,
    /// Normalized position in `[0, 1]` from start to end.
    pub position: f64,
}

pub fn parse_geometry(wkt_str: &str) -> Result<Geometry<f64>, NetworkError> {
    Geometry::try_from_wkt_str(wkt_str).map_err(|e| NetworkError::WktParse(e.to_string()))
}

/// Parse a pipe centerline. Anything other than a LINESTRING with at least
/// two coordinates is rejected.
pub fn parse_line(wkt_str: &str) -> Result<LineString<f64>, NetworkError> {
    match parse_geometry(wkt_str)? {
        Geometry::LineString(line) if line.0.len() >= 2 => Ok(line),
        Geometry::LineString(_) => Err(NetworkError::DegenerateGeometry(format!(
            "line has fewer than two coordinates: {wkt_str}"
        ))),
        other => Err(NetworkError::UnsupportedGeometryType {
            found: geometry_type_name(&other).to_string(),
            allowed: "LineString",
        }),
    }
}

pub fn geometry_type_name(geometry: &Geometry<f64>) -> &'static str {
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

pub fn line_length(line: &LineString<f64>) -> f64 {
    Euclidean.length(line)
}

fn segment_length(segment: &Line<f64>) -> f64 {
    Euclidean.distance(segment.start_point(), segment.end_point())
}

/// Where does `other` touch the base pipe?
///
/// Line geometries are intersected segment-pair-wise against the pipe; the
/// result may be empty (the spatial pre-filter can be generous), one point,
/// or several points for pipes that cross more than once. A point geometry
/// is an asset already known to lie within the join tolerance, so it passes
/// straight through. Everything else is a contract violation.
pub fn intersection_points(
    base: &LineString<f64>,
    other: &Geometry<f64>,
) -> Result<Vec<Point<f64>>, NetworkError> {
    let mut points = match other {
        Geometry::Point(p) => vec![*p],
        Geometry::LineString(line) => line_line_points(base, line),
        Geometry::MultiLineString(lines) => lines
            .0
            .iter()
            .flat_map(|line| line_line_points(base, line))
            .collect(),
        unsupported => {
            return Err(NetworkError::UnsupportedGeometryType {
                found: geometry_type_name(unsupported).to_string(),
                allowed: ALLOWED_INTERSECTION_TYPES,
            });
        }
    };

    points.sort_by(|a, b| a.x().total_cmp(&b.x()).then_with(|| a.y().total_cmp(&b.y())));
    points.dedup_by(|a, b| {
        (a.x() - b.x()).abs() < COINCIDENT_EPS && (a.y() - b.y()).abs() < COINCIDENT_EPS
    });

    Ok(points)
}

fn line_line_points(base: &LineString<f64>, other: &LineString<f64>) -> Vec<Point<f64>> {
    let mut points = Vec::new();

    for base_segment in base.lines() {
        for other_segment in other.lines() {
            match line_intersection(base_segment, other_segment) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    points.push(Point::from(intersection));
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    // Overlapping collinear runs contribute their endpoints;
                    // the topology changes exactly there.
                    points.push(intersection.start_point());
                    points.push(intersection.end_point());
                }
                None => {}
            }
        }
    }

    points
}

/// Project a point onto the pipe centerline and express it as a distance
/// from the pipe start.
pub fn locate_on_line(
    line: &LineString<f64>,
    point: &Point<f64>,
) -> Result<PointOnLine, NetworkError> {
    let total = line_length(line);
    let fraction = line
        .line_locate_point(point)
        .filter(|_| total > 0.0)
        .ok_or_else(|| {
            NetworkError::DegenerateGeometry("cannot project onto zero-length line".to_string())
        })?;

    let distance_m = fraction * total;
    let distance_cm = (distance_m * CM_PER_M).round() as i64;
    let position = 1.0 - ((total - distance_m) / total);

    Ok(PointOnLine {
        point: *point,
        distance_m,
        distance_cm,
        position,
    })
}

/// Extract the part of `line` between two normalized positions, keeping the
/// original vertices that fall inside the window and interpolating the cut
/// points at each end.
pub fn line_substring(line: &LineString<f64>, start_frac: f64, end_frac: f64) -> LineString<f64> {
    let total = line_length(line);
    let (low, high) = if start_frac <= end_frac {
        (start_frac, end_frac)
    } else {
        (end_frac, start_frac)
    };
    let start_dist = low.clamp(0.0, 1.0) * total;
    let end_dist = high.clamp(0.0, 1.0) * total;

    let interpolate = |segment: &Line<f64>, dist_on_segment: f64| -> Coord<f64> {
        let len = segment_length(segment);
        if len == 0.0 {
            return segment.start;
        }
        let t = dist_on_segment / len;
        Coord {
            x: segment.start.x + (segment.end.x - segment.start.x) * t,
            y: segment.start.y + (segment.end.y - segment.start.y) * t,
        }
    };

    let mut coords: Vec<Coord<f64>> = Vec::new();
    let mut current_dist = 0.0;
    let mut started = false;

    for segment in line.lines() {
        let next_dist = current_dist + segment_length(&segment);

        if !started {
            if next_dist >= start_dist {
                coords.push(interpolate(&segment, start_dist - current_dist));
                started = true;

                if next_dist >= end_dist {
                    coords.push(interpolate(&segment, end_dist - current_dist));
                    break;
                }
                coords.push(segment.end);
            }
        } else if next_dist >= end_dist {
            coords.push(interpolate(&segment, end_dist - current_dist));
            break;
        } else {
            coords.push(segment.end);
        }

        current_dist = next_dist;
    }

    coords.dedup_by(|a, b| {
        (a.x - b.x).abs() < COINCIDENT_EPS && (a.y - b.y).abs() < COINCIDENT_EPS
    });

    if coords.len() < 2 {
        // Degenerate window; emit a zero-length segment at the cut point so
        // the WKT stays a valid LINESTRING.
        let p = coords.first().copied().unwrap_or(line.0[0]);
        coords = vec![p, p];
    }

    LineString::new(coords)
}
