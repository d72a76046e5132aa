//! Map Insights Library - Viewport-Driven Feature Aggregation
//!
//! This library answers "what is on screen right now" for a set of GeoJSON layers. Every time
//! the map camera moves it works out which features are visible, counts them per layer and per
//! attribute value, and hands out color scales for attribute-driven styling.
//!
//! # Architecture
//!
//! - **[`Feature`]** / **[`Layer`]**: Immutable geometry records grouped into stylable layers
//! - **[`SpatialIndex`]**: R-tree over feature bounding boxes (broad phase)
//! - **[`predicates`]**: Exact per-geometry visibility tests (narrow phase)
//! - **[`viewport`]**: Camera state to ground-rectangle conversion
//! - **[`aggregate()`]**: Per-layer counts and per-attribute value tables
//! - **[`ColorScale`]**: Continuous and categorical attribute coloring
//! - **[`Debouncer`]**: Coalesces bursts of camera events
//! - **[`MapSession`]**: Owns the whole pipeline and pushes results to observers
//!
//! # Performance Characteristics
//!
//! - **Build Time**: O(N log N) bulk load, bounding boxes computed in parallel
//! - **Query Time**: O(log N + K) where K = candidates, predicates run only on candidates
//! - **Memory**: O(N) index entries sharing features through `Arc`

mod aggregate;
mod bounds;
pub mod color;
mod config;
mod feature;
mod index;
mod layer;
mod loader;
pub mod predicates;
mod scheduler;
mod session;
pub mod utils;
mod value;
pub mod viewport;

// Public API exports
pub use aggregate::{
    AggregationResult, AttributeCounter, AttributeCounts, CounterId, Insights, LayerCount,
    aggregate, compute_insights, visible_features,
};
pub use bounds::BoundingBox;
pub use color::{ColorScale, ColorTarget, Rgb, ScaleKind, build_scale};
pub use config::{Config, CoordinateSpace};
pub use feature::{Feature, FeatureId, GeometryKind, Properties};
pub use index::{IndexEntry, SpatialIndex};
pub use layer::{AttributeType, ColorMode, Layer, LayerId, LayerStyle};
pub use loader::{load_layer_from_file, load_layer_from_str};
pub use scheduler::Debouncer;
pub use session::{MapSession, SessionHandle, Snapshot, SnapshotObserver};
pub use value::AttributeValue;
pub use viewport::{ProjectedBounds, ViewState, viewport_to_bounds};

/// Error types for the insights engine
#[derive(Debug, thiserror::Error)]
pub enum InsightsError {
    #[error("GeoJSON parsing error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Unexpected viewport bounds format: {0}")]
    MalformedBounds(String),

    #[error("Invalid view state: {reason}")]
    InvalidViewState { reason: String },

    #[error("Unknown color scheme: {0}")]
    UnknownScheme(String),

    #[error("Invalid color '{value}': {reason}")]
    InvalidColor { value: String, reason: String },

    #[error("Unknown layer: {0}")]
    UnknownLayer(LayerId),

    #[error("Unknown attribute counter: {0}")]
    UnknownCounter(CounterId),

    #[error("Session has shut down")]
    SessionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, InsightsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that all public types are accessible
        let _: fn() -> Config = Config::default;
        let _: fn(&[Feature]) -> SpatialIndex = SpatialIndex::build;
        let _: fn(&ViewState) -> Result<BoundingBox> = viewport_to_bounds;
    }

    #[test]
    fn test_error_display() {
        let err = InsightsError::UnknownScheme("nope".to_string());
        assert_eq!(err.to_string(), "Unknown color scheme: nope");

        let err = InsightsError::MalformedBounds("[1, 2, 3]".to_string());
        assert!(err.to_string().contains("[1, 2, 3]"));
    }
}
