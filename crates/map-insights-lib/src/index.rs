//! R-tree index over feature bounding boxes
//!
//! The index is the broad phase of every aggregation pass: a range query returns every feature
//! whose box overlaps the viewport, and the exact predicates run on that candidate set only.
//! It is immutable once built; any change to the loaded layers builds a new one.

use crate::{BoundingBox, Feature, Layer};
use rayon::prelude::*;
use rstar::{AABB, RTree, RTreeObject};
use std::sync::Arc;

/// One indexed feature: a shared handle plus its bounding box
#[derive(Debug, Clone)]
pub struct IndexEntry {
    feature: Arc<Feature>,
    bbox: BoundingBox,
}

impl IndexEntry {
    fn new(feature: Arc<Feature>) -> Self {
        let bbox = feature.bounding_box();
        Self { feature, bbox }
    }

    #[inline]
    pub fn feature(&self) -> &Arc<Feature> {
        &self.feature
    }

    #[inline]
    pub fn bounding_box(&self) -> BoundingBox {
        self.bbox
    }
}

impl RTreeObject for IndexEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.bbox.to_aabb()
    }
}

/// Bulk-loaded spatial index over all features of a session
pub struct SpatialIndex {
    tree: RTree<IndexEntry>,
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self { tree: RTree::new() }
    }
}

impl std::fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("entries", &self.tree.size())
            .finish()
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl SpatialIndex {
    /// Empty index; every query returns nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build an index over standalone features
    pub fn build(features: &[Feature]) -> Self {
        Self::from_shared(features.iter().cloned().map(Arc::new).collect())
    }

    /// Build an index over every feature of the given layers
    ///
    /// Features are shared with the layers, not copied.
    pub fn from_layers<'a>(layers: impl IntoIterator<Item = &'a Layer>) -> Self {
        let features: Vec<Arc<Feature>> = layers
            .into_iter()
            .flat_map(|layer| layer.features().iter().cloned())
            .collect();
        Self::from_shared(features)
    }

    /// Build an index from shared feature handles
    pub fn from_shared(features: Vec<Arc<Feature>>) -> Self {
        #[cfg(feature = "profiling")]
        profiling::scope!("index::build");

        let entries: Vec<IndexEntry> = features
            .into_par_iter()
            .filter(|feature| {
                let valid = feature.bounding_box().is_valid();
                if !valid {
                    tracing::warn!(
                        "Not indexing feature {} of {}: unusable bounding box",
                        feature.id(),
                        feature.layer_id()
                    );
                }
                valid
            })
            .map(IndexEntry::new)
            .collect();

        tracing::debug!("Bulk loading spatial index with {} entries", entries.len());

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Every entry whose box intersects `rect`, touching edges included
    ///
    /// The result is a superset of the visible features. An inverted or non-finite `rect`
    /// yields an empty result.
    pub fn query(&self, rect: &BoundingBox) -> Vec<&IndexEntry> {
        #[cfg(feature = "profiling")]
        profiling::scope!("index::query");

        if !rect.is_valid() {
            return Vec::new();
        }
        self.tree
            .locate_in_envelope_intersecting(&rect.to_aabb())
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over all entries in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.tree.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CoordinateSpace, FeatureId, LayerId, Properties};
    use geo::{Geometry, Point, line_string, polygon};

    fn feature(id: usize, geometry: Geometry<f64>) -> Feature {
        Feature::new(LayerId(1), FeatureId(id), geometry, Properties::new()).unwrap()
    }

    fn sample() -> Vec<Feature> {
        vec![
            feature(0, Point::new(1.0, 1.0).into()),
            feature(1, line_string![(x: 5.0, y: 5.0), (x: 15.0, y: 5.0)].into()),
            feature(
                2,
                polygon![(x: 20.0, y: 20.0), (x: 30.0, y: 20.0), (x: 30.0, y: 30.0), (x: 20.0, y: 20.0)]
                    .into(),
            ),
        ]
    }

    fn ids(entries: &[&IndexEntry]) -> Vec<usize> {
        let mut ids: Vec<usize> = entries.iter().map(|e| e.feature().id().0).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn test_build_and_query() {
        let index = SpatialIndex::build(&sample());
        assert_eq!(index.len(), 3);

        let hits = index.query(&BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        assert_eq!(ids(&hits), vec![0, 1]);

        let hits = index.query(&BoundingBox::new(25.0, 25.0, 26.0, 26.0));
        assert_eq!(ids(&hits), vec![2]);
    }

    #[test]
    fn test_touching_boxes_are_returned() {
        let index = SpatialIndex::build(&sample());
        let hits = index.query(&BoundingBox::new(15.0, 0.0, 18.0, 5.0));
        assert_eq!(ids(&hits), vec![1]);
    }

    #[test]
    fn test_empty_index() {
        let index = SpatialIndex::build(&[]);
        assert!(index.is_empty());
        assert!(index.query(&BoundingBox::new(-1e9, -1e9, 1e9, 1e9)).is_empty());
        assert!(SpatialIndex::empty().is_empty());
    }

    #[test]
    fn test_inverted_query_is_empty() {
        let index = SpatialIndex::build(&sample());
        assert!(index.query(&BoundingBox::new(10.0, 0.0, 0.0, 10.0)).is_empty());
        assert!(index.query(&BoundingBox::new(0.0, 10.0, 10.0, 0.0)).is_empty());
    }

    #[test]
    fn test_entries_carry_boxes() {
        let index = SpatialIndex::build(&sample());
        let hits = index.query(&BoundingBox::new(0.5, 0.5, 1.5, 1.5));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].bounding_box(), BoundingBox::new(1.0, 1.0, 1.0, 1.0));
    }

    #[test]
    fn test_from_layers_shares_features() {
        let layer = Layer::from_geometries(
            LayerId(7),
            "points",
            CoordinateSpace::Geographic,
            (0..10).map(|i| (Point::new(i as f64, 0.0).into(), Properties::new())),
        );
        let index = SpatialIndex::from_layers([&layer]);
        assert_eq!(index.len(), 10);

        let hit = index.query(&BoundingBox::new(3.0, -1.0, 3.0, 1.0));
        assert_eq!(hit.len(), 1);
        assert!(Arc::ptr_eq(hit[0].feature(), &layer.features()[3]));
    }
}
