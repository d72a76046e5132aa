//! Axis-aligned bounding boxes
//!
//! `BoundingBox` is the common currency between the viewport tracker, the spatial index and the
//! aggregation engine. Unlike [`geo::Rect`] it does not normalize its corners on construction, so
//! an inverted query box can be represented and rejected instead of silently flipped.

use geo::{BoundingRect, Coord, Geometry, Rect};
use rstar::AABB;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Rectangle given by its minimum and maximum corners
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a box from raw corner values, without reordering them
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Create a box spanning two arbitrary corners
    pub fn from_corners(a: Coord<f64>, b: Coord<f64>) -> Self {
        Self::new(a.x.min(b.x), a.y.min(b.y), a.x.max(b.x), a.y.max(b.y))
    }

    /// Smallest box containing every coordinate, or `None` for an empty iterator
    pub fn from_coords(coords: impl IntoIterator<Item = Coord<f64>>) -> Option<Self> {
        coords.into_iter().fold(None, |acc, c| match acc {
            None => Some(Self::new(c.x, c.y, c.x, c.y)),
            Some(b) => Some(b.expanded_to(c)),
        })
    }

    /// Bounding box of a geometry
    ///
    /// Returns `None` for empty geometries and for geometries containing non-finite coordinates.
    pub fn of_geometry(geometry: &Geometry<f64>) -> Option<Self> {
        let bbox = Self::from(geometry.bounding_rect()?);
        bbox.is_valid().then_some(bbox)
    }

    /// Whether the box is ordered (`min <= max` on both axes) and finite
    ///
    /// Zero-area boxes (single points) are valid.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    #[inline]
    pub fn center(&self) -> Coord<f64> {
        Coord {
            x: (self.min_x + self.max_x) / 2.0,
            y: (self.min_y + self.max_y) / 2.0,
        }
    }

    /// Whether the two boxes share at least one point (touching edges count)
    #[inline]
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(self.max_x < other.min_x
            || self.min_x > other.max_x
            || self.max_y < other.min_y
            || self.min_y > other.max_y)
    }

    /// Whether `other` lies completely inside this box (shared edges allowed)
    #[inline]
    pub fn contains_box(&self, other: &BoundingBox) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    /// Closed containment test for a coordinate
    #[inline]
    pub fn contains(&self, c: Coord<f64>) -> bool {
        c.x >= self.min_x && c.x <= self.max_x && c.y >= self.min_y && c.y <= self.max_y
    }

    /// Open containment test: the coordinate is strictly inside, not on an edge
    #[inline]
    pub fn contains_in_interior(&self, c: Coord<f64>) -> bool {
        c.x > self.min_x && c.x < self.max_x && c.y > self.min_y && c.y < self.max_y
    }

    /// Grow the box to include a coordinate
    #[inline]
    pub fn expanded_to(self, c: Coord<f64>) -> Self {
        Self::new(
            self.min_x.min(c.x),
            self.min_y.min(c.y),
            self.max_x.max(c.x),
            self.max_y.max(c.y),
        )
    }

    /// Smallest box containing both boxes
    #[inline]
    pub fn union(self, other: BoundingBox) -> Self {
        Self::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Convert to a [`geo::Rect`] for use with `geo` algorithms
    #[inline]
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.min_x,
                y: self.min_y,
            },
            Coord {
                x: self.max_x,
                y: self.max_y,
            },
        )
    }

    /// Convert to an `rstar` envelope
    #[inline]
    pub fn to_aabb(&self) -> AABB<[f64; 2]> {
        AABB::from_corners([self.min_x, self.min_y], [self.max_x, self.max_y])
    }

    /// Flat `[min_x, min_y, max_x, max_y]` representation
    #[inline]
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }
}

impl From<Rect<f64>> for BoundingBox {
    fn from(rect: Rect<f64>) -> Self {
        Self::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(b: [f64; 4]) -> Self {
        Self::new(b[0], b[1], b[2], b[3])
    }
}
