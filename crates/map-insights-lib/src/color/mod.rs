//! Attribute-driven coloring
//!
//! [`build_scale`] turns the values of one attribute into a [`ColorScale`]: continuous when every
//! value is a finite number, categorical otherwise. Scheme names resolve through [`palettes`].

pub mod palettes;
mod scale;

pub use scale::{ColorScale, ScaleKind, build_scale};

use crate::{InsightsError, Result};
use palette::Srgb;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 8-bit sRGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Color used for values a scale has no mapping for
    pub const MISSING: Rgb = Rgb::new(128, 128, 128);

    /// Parse any CSS color (`"red"`, `"#ff0000"`, `"rgb(255, 0, 0)"`, `"hsl(0, 100%, 50%)"`)
    ///
    /// Alpha is dropped.
    pub fn parse(value: &str) -> Result<Self> {
        let parsed = csscolorparser::parse(value).map_err(|e| InsightsError::InvalidColor {
            value: value.to_string(),
            reason: e.to_string(),
        })?;
        let [r, g, b, _] = parsed.to_rgba8();
        Ok(Self { r, g, b })
    }

    /// `#rrggbb` form
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    #[inline]
    pub fn to_array(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    pub(crate) fn to_srgb(self) -> Srgb<f32> {
        Srgb::new(self.r, self.g, self.b).into_format()
    }

    pub(crate) fn from_srgb(color: Srgb<f32>) -> Self {
        let channel = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::new(channel(color.red), channel(color.green), channel(color.blue))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Which part of a feature a color applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ColorTarget {
    Fill,
    Line,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_css_colors() {
        assert_eq!(Rgb::parse("red").unwrap(), Rgb::new(255, 0, 0));
        assert_eq!(Rgb::parse("#0080ff").unwrap(), Rgb::new(0, 128, 255));
        assert_eq!(Rgb::parse("rgb(1, 2, 3)").unwrap(), Rgb::new(1, 2, 3));
    }

    #[test]
    fn test_parse_invalid_color() {
        let err = Rgb::parse("not-a-color").unwrap_err();
        assert!(matches!(err, InsightsError::InvalidColor { .. }));
        assert!(err.to_string().contains("not-a-color"));
    }

    #[test]
    fn test_hex_roundtrip() {
        let c = Rgb::new(31, 119, 180);
        assert_eq!(c.to_hex(), "#1f77b4");
        assert_eq!(Rgb::parse(&c.to_hex()).unwrap(), c);
        assert_eq!(c.to_string(), "#1f77b4");
    }

    #[test]
    fn test_srgb_conversion() {
        let c = Rgb::new(10, 200, 255);
        assert_eq!(Rgb::from_srgb(c.to_srgb()), c);
    }
}
