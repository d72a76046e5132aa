//! Aggregation engine
//!
//! One pass per settled viewport: query the index, run the exact predicates on the candidates,
//! then count per layer and tally attribute values for every registered counter. Both tables
//! are derived from the same visible set, so they always agree with each other.

use crate::{
    BoundingBox, CoordinateSpace, Feature, GeometryKind, Layer, LayerId,
    SpatialIndex, predicates,
};
use geo::{Area, GeodesicArea, Geometry};
use indexmap::IndexMap;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of an attribute counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CounterId(pub u64);

impl fmt::Display for CounterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "counter-{}", self.0)
    }
}

/// Request to tally the values of one attribute over a layer's visible features
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AttributeCounter {
    pub id: CounterId,
    pub layer_id: LayerId,
    pub attribute: String,
}

/// Visible feature count of one layer
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LayerCount {
    pub layer_id: LayerId,
    pub layer_name: String,
    pub count: usize,
}

/// Value frequency table of one attribute counter
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AttributeCounts {
    pub counter_id: CounterId,
    pub layer_id: LayerId,
    pub attribute: String,
    /// Stringified value -> number of visible features, in first-seen order
    pub counts: IndexMap<String, usize>,
}

impl AttributeCounts {
    fn empty(counter: &AttributeCounter) -> Self {
        Self {
            counter_id: counter.id,
            layer_id: counter.layer_id,
            attribute: counter.attribute.clone(),
            counts: IndexMap::new(),
        }
    }

    /// Count for one value key, zero if absent
    pub fn get(&self, key: &str) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Number of features that carried the attribute
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Output of one aggregation pass
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AggregationResult {
    /// Rectangle both tables were computed against
    pub viewport: BoundingBox,
    /// One entry per layer, in layer order, zero counts included
    pub layer_counts: Vec<LayerCount>,
    /// One entry per counter, in registration order
    pub attribute_counts: Vec<AttributeCounts>,
}

impl AggregationResult {
    /// Total visible features across all layers
    pub fn total(&self) -> usize {
        self.layer_counts.iter().map(|c| c.count).sum()
    }

    pub fn count_for(&self, layer_id: LayerId) -> Option<usize> {
        self.layer_counts
            .iter()
            .find(|c| c.layer_id == layer_id)
            .map(|c| c.count)
    }

    pub fn counts_for(&self, counter_id: CounterId) -> Option<&AttributeCounts> {
        self.attribute_counts
            .iter()
            .find(|c| c.counter_id == counter_id)
    }

    /// Layer counts restricted to layers that are currently shown
    pub fn visible_layer_counts<'a>(&'a self, layers: &[Layer]) -> Vec<&'a LayerCount> {
        self.layer_counts
            .iter()
            .filter(|c| {
                layers
                    .iter()
                    .any(|l| l.id() == c.layer_id && l.is_visible())
            })
            .collect()
    }
}

/// Summary statistics over the visible set
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Insights {
    /// Visible features across all layers
    pub total_visible: usize,
    /// Visible polygon features in shown layers
    pub visible_polygons: usize,
    /// Mean area of those polygons: square meters for geographic layers, squared data units
    /// otherwise. `None` when no polygon is visible.
    pub average_polygon_area: Option<f64>,
    /// Visible features per geometry kind, in first-seen order
    pub visible_kinds: IndexMap<GeometryKind, usize>,
}

/// Features passing the exact visibility test for `viewport`
pub fn visible_features(index: &SpatialIndex, viewport: &BoundingBox) -> Vec<Arc<Feature>> {
    #[cfg(feature = "profiling")]
    profiling::scope!("aggregate::visible_features");

    let candidates = index.query(viewport);
    let mut visible: Vec<Arc<Feature>> = candidates
        .par_iter()
        .filter(|entry| predicates::is_visible(entry.feature().geometry(), viewport))
        .map(|entry| entry.feature().clone())
        .collect();
    // Tree order depends on the bulk load; feature order does not
    visible.par_sort_unstable_by_key(|f| (f.layer_id(), f.id()));

    tracing::debug!(
        "Viewport {:?}: {} candidates, {} visible",
        viewport.to_array(),
        candidates.len(),
        visible.len()
    );
    visible
}

/// Count visible features per layer and tally attribute values per counter
///
/// Every layer in `layers` gets an entry, zero included. Counters whose layer is not in `layers`
/// produce an empty table, and features without the counted attribute are not tallied.
pub fn aggregate(
    index: &SpatialIndex,
    viewport: &BoundingBox,
    layers: &[Layer],
    counters: &[AttributeCounter],
) -> AggregationResult {
    #[cfg(feature = "profiling")]
    profiling::scope!("aggregate::aggregate");

    let visible = visible_features(index, viewport);
    aggregate_visible(*viewport, &visible, layers, counters)
}

/// Build both tables from an already computed visible set
pub(crate) fn aggregate_visible(
    viewport: BoundingBox,
    visible: &[Arc<Feature>],
    layers: &[Layer],
    counters: &[AttributeCounter],
) -> AggregationResult {
    let mut by_layer: HashMap<LayerId, Vec<&Feature>> = HashMap::new();
    for feature in visible {
        by_layer
            .entry(feature.layer_id())
            .or_default()
            .push(feature.as_ref());
    }

    let layer_counts = layers
        .iter()
        .map(|layer| LayerCount {
            layer_id: layer.id(),
            layer_name: layer.name().to_string(),
            count: by_layer.get(&layer.id()).map_or(0, Vec::len),
        })
        .collect();

    let attribute_counts = counters
        .iter()
        .map(|counter| {
            let mut table = AttributeCounts::empty(counter);
            if !layers.iter().any(|l| l.id() == counter.layer_id) {
                return table;
            }
            let features = by_layer.get(&counter.layer_id).map_or(&[][..], Vec::as_slice);
            for value in features
                .iter()
                .filter_map(|f| f.attribute(&counter.attribute))
            {
                *table.counts.entry(value.to_key()).or_insert(0) += 1;
            }
            table
        })
        .collect();

    AggregationResult {
        viewport,
        layer_counts,
        attribute_counts,
    }
}

/// Totals and average polygon area over the visible set
///
/// Only layers that are shown contribute polygons to the average.
pub fn compute_insights(visible: &[Arc<Feature>], layers: &[Layer]) -> Insights {
    #[cfg(feature = "profiling")]
    profiling::scope!("aggregate::compute_insights");

    let shown: HashMap<LayerId, CoordinateSpace> = layers
        .iter()
        .filter(|l| l.is_visible())
        .map(|l| (l.id(), l.coordinate_space()))
        .collect();

    let areas: Vec<f64> = visible
        .par_iter()
        .filter(|f| f.kind().is_areal())
        .filter_map(|f| {
            shown
                .get(&f.layer_id())
                .map(|space| feature_area(f.geometry(), *space))
        })
        .collect();

    let average_polygon_area =
        (!areas.is_empty()).then(|| areas.iter().sum::<f64>() / areas.len() as f64);

    Insights {
        total_visible: visible.len(),
        visible_polygons: areas.len(),
        average_polygon_area,
        visible_kinds: kind_summary(visible),
    }
}

fn feature_area(geometry: &Geometry<f64>, space: CoordinateSpace) -> f64 {
    match (space, geometry) {
        (CoordinateSpace::Geographic, Geometry::Polygon(p)) => p.geodesic_area_unsigned(),
        (CoordinateSpace::Geographic, Geometry::MultiPolygon(p)) => p.geodesic_area_unsigned(),
        (CoordinateSpace::WebMercator, g) => g.unsigned_area(),
        _ => 0.0,
    }
}

fn kind_summary(visible: &[Arc<Feature>]) -> IndexMap<GeometryKind, usize> {
    let mut summary = IndexMap::new();
    for feature in visible {
        *summary.entry(feature.kind()).or_insert(0) += 1;
    }
    summary
}
