//! Exact visibility tests run on index candidates
//!
//! The index only knows bounding boxes, so every candidate it returns goes through
//! [`is_visible`] before being counted:
//!
//! - points are visible as soon as their box overlaps the viewport
//! - polygons are visible when their area intersects the viewport rectangle
//! - lines are visible when they cross the viewport boundary or lie within the viewport
//!
//! A line "crosses" or "lies within" only if some stretch of it passes through the open
//! interior of the rectangle. A line that just grazes an edge or a corner does not count.

use crate::BoundingBox;
use geo::{Coord, Geometry, Intersects, LineString, MultiLineString};

/// Whether a geometry is visible in the viewport
///
/// Kinds without a visibility rule (GeometryCollection and the `geo`-only Line, Rect, Triangle)
/// are never visible.
pub fn is_visible(geometry: &Geometry<f64>, viewport: &BoundingBox) -> bool {
    if !viewport.is_valid() {
        return false;
    }

    match geometry {
        Geometry::Point(_) | Geometry::MultiPoint(_) => true,
        Geometry::Polygon(polygon) => polygon.intersects(&viewport.to_rect()),
        Geometry::MultiPolygon(polygons) => polygons.intersects(&viewport.to_rect()),
        Geometry::LineString(line) => line_crosses(line, viewport) || line_within(line, viewport),
        Geometry::MultiLineString(lines) => multi_line_visible(lines, viewport),
        _ => false,
    }
}

/// Whether a line enters the viewport interior and also leaves the closed viewport
pub fn line_crosses(line: &LineString<f64>, viewport: &BoundingBox) -> bool {
    touches_interior(line, viewport) && !all_vertices_inside(line, viewport)
}

/// Whether a line lies in the closed viewport and passes through its interior
pub fn line_within(line: &LineString<f64>, viewport: &BoundingBox) -> bool {
    all_vertices_inside(line, viewport) && touches_interior(line, viewport)
}

/// Whether any part of a multi-line crosses or lies within the viewport
pub fn multi_line_visible(lines: &MultiLineString<f64>, viewport: &BoundingBox) -> bool {
    lines
        .iter()
        .any(|line| line_crosses(line, viewport) || line_within(line, viewport))
}

fn all_vertices_inside(line: &LineString<f64>, viewport: &BoundingBox) -> bool {
    !line.0.is_empty() && line.coords().all(|c| viewport.contains(*c))
}

fn touches_interior(line: &LineString<f64>, viewport: &BoundingBox) -> bool {
    match line.0.as_slice() {
        [] => false,
        [only] => viewport.contains_in_interior(*only),
        coords => coords
            .windows(2)
            .any(|pair| segment_touches_interior(pair[0], pair[1], viewport)),
    }
}

/// Cohen-Sutherland outcode of a coordinate relative to the rectangle
fn outcode(c: Coord<f64>, r: &BoundingBox) -> u8 {
    let mut code = 0u8;
    if c.x < r.min_x {
        code |= 1;
    } // left
    if c.x > r.max_x {
        code |= 2;
    } // right
    if c.y < r.min_y {
        code |= 4;
    } // bottom
    if c.y > r.max_y {
        code |= 8;
    } // top
    code
}

/// Whether a segment passes through the open interior of the rectangle
fn segment_touches_interior(a: Coord<f64>, b: Coord<f64>, r: &BoundingBox) -> bool {
    if a == b {
        return r.contains_in_interior(a);
    }

    // Both ends on the same outer side
    if outcode(a, r) & outcode(b, r) != 0 {
        return false;
    }

    // The clipped piece lies in the closed rectangle. Its midpoint is on the boundary only when
    // the whole piece runs along one edge (or collapses onto a corner).
    match clip_segment(a, b, r) {
        Some((p, q)) => r.contains_in_interior((p + q) / 2.0),
        None => false,
    }
}

/// Liang-Barsky clipping of segment `a -> b` against the closed rectangle
fn clip_segment(a: Coord<f64>, b: Coord<f64>, r: &BoundingBox) -> Option<(Coord<f64>, Coord<f64>)> {
    let d = b - a;
    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;

    for (p, q) in [
        (-d.x, a.x - r.min_x),
        (d.x, r.max_x - a.x),
        (-d.y, a.y - r.min_y),
        (d.y, r.max_y - a.y),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            if t > t1 {
                return None;
            }
            t0 = t0.max(t);
        } else {
            if t < t0 {
                return None;
            }
            t1 = t1.min(t);
        }
    }

    Some((a + d * t0, a + d * t1))
}
