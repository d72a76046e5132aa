//! Layer storage and display state
//!
//! A [`Layer`] owns its features (shared out to the index through `Arc`) together with the
//! display settings the user can change from the sidebar. Display settings never affect counts;
//! they only decide what gets drawn and how it is colored.

use crate::color::{ColorTarget, Rgb};
use crate::{
    AttributeValue, BoundingBox, CoordinateSpace, Feature, FeatureId, GeometryKind, Properties,
};
use geo::Geometry;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Stable identifier of a layer within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LayerId(pub u64);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer-{}", self.0)
    }
}

/// How a layer's fill or line color is chosen
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ColorMode {
    /// One color for every feature
    Solid(Rgb),
    /// Color derived from an attribute through a named scheme
    Attribute { attribute: String, scheme: String },
}

/// Inferred type of an attribute column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AttributeType {
    Number,
    String,
    Boolean,
    Unknown,
}

impl From<&AttributeValue> for AttributeType {
    fn from(value: &AttributeValue) -> Self {
        match value {
            AttributeValue::Number(_) => Self::Number,
            AttributeValue::Text(_) => Self::String,
            AttributeValue::Boolean(_) => Self::Boolean,
            AttributeValue::Null => Self::Unknown,
        }
    }
}

/// User-adjustable display state of a layer
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LayerStyle {
    /// Whether the layer is shown at all
    pub visible: bool,
    /// Opacity in `[0, 1]`
    pub opacity: f32,
    /// Line width scale
    pub line_width: f32,
    pub fill: ColorMode,
    pub line: ColorMode,
    /// Per-geometry-kind toggles; kinds not listed are shown
    pub hidden_kinds: SmallVec<[GeometryKind; 4]>,
    /// When set, only features of this kind are drawn
    pub geometry_filter: Option<GeometryKind>,
}

impl LayerStyle {
    /// Style with the given solid fill and line colors, fully opaque and visible
    pub fn with_colors(fill: Rgb, line: Rgb) -> Self {
        Self {
            visible: true,
            opacity: 1.0,
            line_width: 1.0,
            fill: ColorMode::Solid(fill),
            line: ColorMode::Solid(line),
            hidden_kinds: SmallVec::new(),
            geometry_filter: None,
        }
    }

    pub fn color_mode(&self, target: ColorTarget) -> &ColorMode {
        match target {
            ColorTarget::Fill => &self.fill,
            ColorTarget::Line => &self.line,
        }
    }

    pub fn set_color_mode(&mut self, target: ColorTarget, mode: ColorMode) {
        match target {
            ColorTarget::Fill => self.fill = mode,
            ColorTarget::Line => self.line = mode,
        }
    }

    /// Toggle visibility of one geometry kind
    pub fn set_kind_visible(&mut self, kind: GeometryKind, visible: bool) {
        self.hidden_kinds.retain(|k| *k != kind);
        if !visible {
            self.hidden_kinds.push(kind);
        }
    }

    #[inline]
    pub fn is_kind_visible(&self, kind: GeometryKind) -> bool {
        !self.hidden_kinds.contains(&kind)
    }

    /// Set opacity, clamped to `[0, 1]`
    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }
}

impl Default for LayerStyle {
    fn default() -> Self {
        Self::with_colors(Rgb::new(0, 128, 255), Rgb::new(0, 0, 0))
    }
}

/// A named collection of features plus display state
#[derive(Debug, Clone)]
pub struct Layer {
    id: LayerId,
    name: String,
    space: CoordinateSpace,
    /// Shared so that cloning a layer for an aggregation pass stays cheap
    features: Arc<[Arc<Feature>]>,
    /// Distinct geometry kinds, in first-seen order
    geometry_kinds: SmallVec<[GeometryKind; 4]>,
    /// Combined bounding box of all features (None if empty)
    extent: Option<BoundingBox>,
    style: LayerStyle,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Layer {
    /// Create a layer from geometries and their properties
    ///
    /// Geometries without finite coordinates are skipped with a warning, so the returned layer
    /// may hold fewer features than were passed in.
    pub fn from_geometries(
        id: LayerId,
        name: impl Into<String>,
        space: CoordinateSpace,
        items: impl IntoIterator<Item = (Geometry<f64>, Properties)>,
    ) -> Self {
        #[cfg(feature = "profiling")]
        profiling::scope!("layer::from_geometries");

        let name = name.into();
        let mut features = Vec::new();

        for (geometry, properties) in items {
            let feature_id = FeatureId(features.len());
            match Feature::new(id, feature_id, geometry, properties) {
                Ok(feature) => features.push(feature),
                Err(e) => tracing::warn!("Skipping feature in layer '{}': {}", name, e),
            }
        }

        Self::new(id, name, space, features)
    }

    /// Create a layer from already-built features
    pub fn new(
        id: LayerId,
        name: impl Into<String>,
        space: CoordinateSpace,
        features: Vec<Feature>,
    ) -> Self {
        let mut geometry_kinds = SmallVec::new();
        let mut extent: Option<BoundingBox> = None;

        for feature in &features {
            debug_assert_eq!(feature.layer_id(), id);
            if !geometry_kinds.contains(&feature.kind()) {
                geometry_kinds.push(feature.kind());
            }
            let bbox = feature.bounding_box();
            extent = Some(extent.map_or(bbox, |e| e.union(bbox)));
        }

        Self {
            id,
            name: name.into(),
            space,
            features: features.into_iter().map(Arc::new).collect::<Vec<_>>().into(),
            geometry_kinds,
            extent,
            style: LayerStyle::default(),
        }
    }

    #[inline]
    pub fn id(&self) -> LayerId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[inline]
    pub fn coordinate_space(&self) -> CoordinateSpace {
        self.space
    }

    #[inline]
    pub fn features(&self) -> &[Arc<Feature>] {
        &self.features
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Distinct geometry kinds present in the layer
    #[inline]
    pub fn geometry_kinds(&self) -> &[GeometryKind] {
        &self.geometry_kinds
    }

    /// Combined bounding box of all features
    #[inline]
    pub fn extent(&self) -> Option<BoundingBox> {
        self.extent
    }

    #[inline]
    pub fn style(&self) -> &LayerStyle {
        &self.style
    }

    #[inline]
    pub fn style_mut(&mut self) -> &mut LayerStyle {
        &mut self.style
    }

    pub fn with_style(mut self, style: LayerStyle) -> Self {
        self.style = style;
        self
    }

    #[inline]
    pub fn is_visible(&self) -> bool {
        self.style.visible
    }

    /// Attribute names, taken from the first feature
    pub fn attribute_names(&self) -> Vec<&str> {
        self.features
            .first()
            .map(|f| f.properties().keys().collect())
            .unwrap_or_default()
    }

    /// Attribute names with their type inferred from the first feature's values
    pub fn attribute_types(&self) -> Vec<(&str, AttributeType)> {
        self.features
            .first()
            .map(|f| {
                f.properties()
                    .iter()
                    .map(|(k, v)| (k, AttributeType::from(v)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether any feature carries the attribute
    pub fn has_attribute(&self, name: &str) -> bool {
        self.features.iter().any(|f| f.attribute(name).is_some())
    }

    /// Every present value of an attribute, in feature order
    pub fn attribute_values(&self, name: &str) -> Vec<AttributeValue> {
        self.features
            .iter()
            .filter_map(|f| f.attribute(name).cloned())
            .collect()
    }

    /// Property rows of the first `limit` features, for a data table preview
    pub fn preview_rows(&self, limit: usize) -> Vec<&Properties> {
        self.features
            .iter()
            .take(limit)
            .map(|f| f.properties())
            .collect()
    }

    /// Whether the renderer should draw this feature under the current display state
    pub fn is_feature_drawn(&self, feature: &Feature) -> bool {
        self.style.visible
            && self.style.is_kind_visible(feature.kind())
            && self
                .style
                .geometry_filter
                .is_none_or(|only| only == feature.kind())
    }
}
