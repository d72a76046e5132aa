//! GeoJSON loading
//!
//! Accepts a FeatureCollection, a single Feature or a bare Geometry. Features without a usable
//! geometry are skipped with a warning rather than failing the whole document.

use crate::{CoordinateSpace, Layer, LayerId, Properties, Result};
use geo::Geometry;
use geojson::{GeoJson, JsonObject};
use std::path::Path;

/// Load a layer from GeoJSON text
///
/// # Errors
/// Returns an error if the text is not valid GeoJSON.
pub fn load_layer_from_str(id: LayerId, name: &str, geojson: &str) -> Result<Layer> {
    #[cfg(feature = "profiling")]
    profiling::scope!("loader::load_layer_from_str");

    let document = geojson.parse::<GeoJson>()?;

    let (space, raw_features) = match document {
        GeoJson::FeatureCollection(collection) => (
            detect_space(collection.foreign_members.as_ref()),
            collection
                .features
                .into_iter()
                .map(|f| (f.geometry, f.properties))
                .collect::<Vec<_>>(),
        ),
        GeoJson::Feature(feature) => (
            detect_space(feature.foreign_members.as_ref()),
            vec![(feature.geometry, feature.properties)],
        ),
        GeoJson::Geometry(geometry) => (
            detect_space(geometry.foreign_members.as_ref()),
            vec![(Some(geometry), None)],
        ),
    };

    let total = raw_features.len();
    let items: Vec<(Geometry<f64>, Properties)> = raw_features
        .into_iter()
        .enumerate()
        .filter_map(|(i, (geometry, properties))| {
            let Some(geometry) = geometry else {
                tracing::warn!("Skipping feature {} in '{}': missing geometry", i, name);
                return None;
            };
            match Geometry::<f64>::try_from(geometry) {
                Ok(geometry) => Some((
                    geometry,
                    properties
                        .as_ref()
                        .map(Properties::from_json)
                        .unwrap_or_default(),
                )),
                Err(e) => {
                    tracing::warn!("Skipping feature {} in '{}': {}", i, name, e);
                    None
                }
            }
        })
        .collect();

    let layer = Layer::from_geometries(id, name, space, items);
    tracing::info!(
        "Loaded layer '{}' ({}): {} of {} features, {:?}",
        layer.name(),
        id,
        layer.len(),
        total,
        space
    );
    Ok(layer)
}

/// Load a layer from a GeoJSON file, named after the file stem
///
/// # Errors
/// Returns an error if the file cannot be read or is not valid GeoJSON.
pub fn load_layer_from_file(id: LayerId, path: impl AsRef<Path>) -> Result<Layer> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| id.to_string());
    load_layer_from_str(id, &name, &text)
}

/// Read the legacy `crs` member; only Web Mercator is recognized
fn detect_space(members: Option<&JsonObject>) -> CoordinateSpace {
    let crs_name = members
        .and_then(|m| m.get("crs"))
        .and_then(|crs| crs.get("properties"))
        .and_then(|props| props.get("name"))
        .and_then(|name| name.as_str());

    match crs_name {
        Some(name) if is_web_mercator_name(name) => CoordinateSpace::WebMercator,
        _ => CoordinateSpace::Geographic,
    }
}

fn is_web_mercator_name(name: &str) -> bool {
    let name = name.to_ascii_uppercase();
    name == "EPSG:3857" || name.ends_with("EPSG::3857") || name == "EPSG:900913"
}
