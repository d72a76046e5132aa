//! Feature storage
//!
//! A [`Feature`] is one immutable geometry with its property map. Its bounding box is computed
//! once during construction so index rebuilds never rescan coordinates.

use crate::{AttributeValue, BoundingBox, InsightsError, LayerId, Result};
use geo::Geometry;
use indexmap::IndexMap;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Position of a feature inside its layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeatureId(pub usize);

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Geometry kind, named as in GeoJSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GeometryKind {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
    /// GeometryCollection and the `geo`-only kinds (Line, Rect, Triangle)
    Other,
}

impl GeometryKind {
    pub fn of(geometry: &Geometry<f64>) -> Self {
        match geometry {
            Geometry::Point(_) => Self::Point,
            Geometry::MultiPoint(_) => Self::MultiPoint,
            Geometry::LineString(_) => Self::LineString,
            Geometry::MultiLineString(_) => Self::MultiLineString,
            Geometry::Polygon(_) => Self::Polygon,
            Geometry::MultiPolygon(_) => Self::MultiPolygon,
            _ => Self::Other,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Point => "Point",
            Self::MultiPoint => "MultiPoint",
            Self::LineString => "LineString",
            Self::MultiLineString => "MultiLineString",
            Self::Polygon => "Polygon",
            Self::MultiPolygon => "MultiPolygon",
            Self::Other => "Other",
        }
    }

    /// Parse a GeoJSON geometry type name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        [
            Self::Point,
            Self::MultiPoint,
            Self::LineString,
            Self::MultiLineString,
            Self::Polygon,
            Self::MultiPolygon,
        ]
        .into_iter()
        .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    #[inline]
    pub fn is_areal(&self) -> bool {
        matches!(self, Self::Polygon | Self::MultiPolygon)
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered attribute map of a feature
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Properties(IndexMap<String, AttributeValue>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a GeoJSON property object, keeping key order
    pub fn from_json(object: &serde_json::Map<String, serde_json::Value>) -> Self {
        Self(
            object
                .iter()
                .map(|(k, v)| (k.clone(), AttributeValue::from(v)))
                .collect(),
        )
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<AttributeValue>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A single geometry with properties, owned by one layer
#[derive(Debug, Clone)]
pub struct Feature {
    id: FeatureId,
    layer_id: LayerId,
    geometry: Geometry<f64>,
    kind: GeometryKind,
    properties: Properties,
    /// Precomputed bounding box of `geometry`
    bbox: BoundingBox,
}

impl Feature {
    /// Create a feature, computing its bounding box
    ///
    /// # Errors
    /// Returns [`InsightsError::InvalidGeometry`] when the geometry has no coordinates or
    /// contains non-finite ones.
    pub fn new(
        layer_id: LayerId,
        id: FeatureId,
        geometry: Geometry<f64>,
        properties: Properties,
    ) -> Result<Self> {
        let kind = GeometryKind::of(&geometry);
        let bbox = BoundingBox::of_geometry(&geometry).ok_or_else(|| {
            InsightsError::InvalidGeometry(format!(
                "{kind} feature {id} has no finite coordinates"
            ))
        })?;

        Ok(Self {
            id,
            layer_id,
            geometry,
            kind,
            properties,
            bbox,
        })
    }

    #[inline]
    pub fn id(&self) -> FeatureId {
        self.id
    }

    #[inline]
    pub fn layer_id(&self) -> LayerId {
        self.layer_id
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry<f64> {
        &self.geometry
    }

    #[inline]
    pub fn kind(&self) -> GeometryKind {
        self.kind
    }

    #[inline]
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Shorthand for `properties().get(name)`
    #[inline]
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.properties.get(name)
    }

    #[inline]
    pub fn bounding_box(&self) -> BoundingBox {
        self.bbox
    }
}
