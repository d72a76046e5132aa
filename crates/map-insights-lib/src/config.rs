//! Session configuration

use crate::color::{Rgb, palettes};
use crate::{InsightsError, LayerStyle, Result};
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Coordinate system of feature data and viewport rectangles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CoordinateSpace {
    /// Longitude/latitude in degrees (EPSG:4326)
    #[default]
    Geographic,
    /// Web Mercator meters (EPSG:3857)
    WebMercator,
}

/// Configuration for a map session
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Settling window for viewport events in milliseconds.
    /// Default: 200
    pub debounce_ms: u64,
    /// Categorical palette used when a layer has no scheme of its own.
    /// Default: "category10"
    pub default_palette: String,
    /// Continuous ramp used when a layer has no scheme of its own.
    /// Default: "viridis"
    pub default_ramp: String,
    /// Solid fill color for new layers, any CSS color
    pub fill_color: String,
    /// Solid line color for new layers, any CSS color
    pub line_color: String,
    /// Space that viewport rectangles are expressed in; should match the loaded data
    pub coordinate_space: CoordinateSpace,
    /// Row limit for data table previews
    pub preview_rows: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            default_palette: "category10".to_string(),
            default_ramp: "viridis".to_string(),
            fill_color: "#0080ff".to_string(),
            line_color: "#000000".to_string(),
            coordinate_space: CoordinateSpace::Geographic,
            preview_rows: 100,
        }
    }
}

impl Config {
    #[inline]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Check that every named scheme and color resolves
    pub fn validate(&self) -> Result<()> {
        for scheme in [&self.default_palette, &self.default_ramp] {
            if palettes::get_scheme(scheme).is_none() {
                return Err(InsightsError::UnknownScheme(scheme.clone()));
            }
        }
        self.default_style().map(|_| ())
    }

    /// Display state for a newly loaded layer
    pub fn default_style(&self) -> Result<LayerStyle> {
        Ok(LayerStyle::with_colors(
            Rgb::parse(&self.fill_color)?,
            Rgb::parse(&self.line_color)?,
        ))
    }

    /// Scheme to use for an attribute whose values are all numeric, or not
    pub fn default_scheme(&self, numeric: bool) -> &str {
        if numeric {
            &self.default_ramp
        } else {
            &self.default_palette
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ColorMode;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.debounce(), Duration::from_millis(200));
        assert_eq!(config.default_scheme(false), "category10");
        assert_eq!(config.default_scheme(true), "viridis");
        assert_eq!(config.coordinate_space, CoordinateSpace::Geographic);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_style_uses_colors() {
        let config = Config {
            fill_color: "red".to_string(),
            ..Config::default()
        };
        let style = config.default_style().unwrap();
        assert_eq!(style.fill, ColorMode::Solid(Rgb::new(255, 0, 0)));
        assert_eq!(style.line, ColorMode::Solid(Rgb::new(0, 0, 0)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_scheme = Config {
            default_ramp: "nope".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            bad_scheme.validate(),
            Err(InsightsError::UnknownScheme(_))
        ));

        let bad_color = Config {
            line_color: "#zz".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            bad_color.validate(),
            Err(InsightsError::InvalidColor { .. })
        ));
    }
}
