use super::{Rgb, palettes};
use crate::{AttributeValue, InsightsError, Result};
use indexmap::IndexMap;
use palette::{FromColor, IntoColor, LinSrgb, Mix, Oklab};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Shape of a color scale
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ScaleKind {
    /// `[min, max]` mapped linearly onto the ramp
    Continuous { min: f64, max: f64 },
    /// Distinct value keys in first-seen order, each with a palette color
    Categorical,
}

/// Mapping from attribute values to colors
#[derive(Debug, Clone)]
pub struct ColorScale {
    scheme: String,
    kind: ScaleKind,
    colors: Vec<Rgb>,
    /// `colors` in Oklab, for continuous sampling
    stops: Vec<Oklab<f32>>,
    categories: IndexMap<String, Rgb>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ColorScale {
    #[inline]
    pub fn kind(&self) -> &ScaleKind {
        &self.kind
    }

    #[inline]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Color of one attribute value
    ///
    /// Values the scale has no mapping for (non-numeric on a continuous scale, unseen keys on a
    /// categorical one) get [`Rgb::MISSING`].
    pub fn color_for(&self, value: &AttributeValue) -> Rgb {
        match self.kind {
            ScaleKind::Continuous { min, max } => match value.as_number() {
                Some(n) => self.sample(Self::position(n, min, max)),
                None => Rgb::MISSING,
            },
            ScaleKind::Categorical => self
                .categories
                .get(&value.to_key())
                .copied()
                .unwrap_or(Rgb::MISSING),
        }
    }

    /// Color for a possibly absent value
    pub fn color_for_optional(&self, value: Option<&AttributeValue>) -> Rgb {
        value.map_or(Rgb::MISSING, |v| self.color_for(v))
    }

    /// Sample the ramp at `t` in `[0, 1]`
    pub fn sample(&self, t: f64) -> Rgb {
        match self.stops.as_slice() {
            [] => Rgb::MISSING,
            [_] => self.colors[0],
            stops => {
                let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.5 };
                let segments = stops.len() - 1;
                let position = t as f32 * segments as f32;
                let segment = (position.floor() as usize).min(segments - 1);
                let local = position - segment as f32;

                // Exact stops keep their original color
                if local <= 0.0 {
                    self.colors[segment]
                } else if local >= 1.0 {
                    self.colors[segment + 1]
                } else {
                    Rgb::from_oklab(stops[segment].mix(stops[segment + 1], local))
                }
            }
        }
    }

    /// Categories with their colors, in first-seen order
    pub fn categories(&self) -> impl Iterator<Item = (&str, Rgb)> {
        self.categories.iter().map(|(k, c)| (k.as_str(), *c))
    }

    /// Normalized position of `n` on `[min, max]`; the midpoint when the range is empty
    fn position(n: f64, min: f64, max: f64) -> f64 {
        if max > min {
            ((n - min) / (max - min)).clamp(0.0, 1.0)
        } else {
            0.5
        }
    }
}

impl Rgb {
    fn to_oklab(self) -> Oklab<f32> {
        let linear: LinSrgb<f32> = self.to_srgb().into_linear();
        Oklab::from_color(linear)
    }

    fn from_oklab(color: Oklab<f32>) -> Self {
        let linear: LinSrgb<f32> = color.into_color();
        Self::from_srgb(palette::Srgb::from_linear(linear))
    }
}

/// Build a color scale for a set of attribute values
///
/// Every value being a finite number gives a continuous scale over `[min, max]`; anything else
/// (text, booleans, nulls, an empty input) gives a categorical scale over the distinct value keys.
/// Any named scheme works for either kind.
///
/// # Errors
/// Returns [`InsightsError::UnknownScheme`] if `scheme` names no palette or ramp.
pub fn build_scale(values: &[AttributeValue], scheme: &str) -> Result<ColorScale> {
    #[cfg(feature = "profiling")]
    profiling::scope!("color::build_scale");

    let colors = palettes::get_scheme(scheme)
        .ok_or_else(|| InsightsError::UnknownScheme(scheme.to_string()))?
        .iter()
        .map(|hex| Rgb::parse(hex))
        .collect::<Result<Vec<_>>>()?;

    let numbers: Option<Vec<f64>> = values.iter().map(AttributeValue::as_number).collect();

    let stops: Vec<Oklab<f32>> = colors.iter().map(|c| c.to_oklab()).collect();

    let scale = match numbers.filter(|n| !n.is_empty()) {
        Some(numbers) => {
            let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
            let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            ColorScale {
                scheme: scheme.to_string(),
                kind: ScaleKind::Continuous { min, max },
                colors,
                stops,
                categories: IndexMap::new(),
            }
        }
        None => {
            let mut categories: IndexMap<String, Rgb> = IndexMap::new();
            for value in values {
                let next = colors[categories.len() % colors.len()];
                categories.entry(value.to_key()).or_insert(next);
            }
            ColorScale {
                scheme: scheme.to_string(),
                kind: ScaleKind::Categorical,
                colors,
                stops,
                categories,
            }
        }
    };

    tracing::debug!(
        "Built {:?} color scale '{}' over {} values",
        scale.kind,
        scheme,
        values.len()
    );
    Ok(scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::palettes::{CATEGORY10, VIRIDIS};

    fn numbers(values: &[f64]) -> Vec<AttributeValue> {
        values.iter().map(|n| AttributeValue::Number(*n)).collect()
    }

    fn hex(s: &str) -> Rgb {
        Rgb::parse(s).unwrap()
    }

    #[test]
    fn test_continuous_endpoints() {
        let scale = build_scale(&numbers(&[0.0, 5.0, 10.0]), "viridis").unwrap();
        assert_eq!(scale.kind(), &ScaleKind::Continuous { min: 0.0, max: 10.0 });
        assert_eq!(scale.color_for(&AttributeValue::Number(0.0)), hex(VIRIDIS[0]));
        assert_eq!(
            scale.color_for(&AttributeValue::Number(10.0)),
            hex(VIRIDIS[VIRIDIS.len() - 1])
        );
    }

    #[test]
    fn test_continuous_is_total_over_range() {
        let scale = build_scale(&numbers(&[-3.0, 7.0]), "plasma").unwrap();
        for i in 0..=100 {
            let v = -3.0 + 10.0 * i as f64 / 100.0;
            assert_ne!(scale.color_for(&AttributeValue::Number(v)), Rgb::MISSING);
        }
        // Out of range values clamp to the ends
        assert_eq!(
            scale.color_for(&AttributeValue::Number(100.0)),
            scale.color_for(&AttributeValue::Number(7.0))
        );
    }

    #[test]
    fn test_constant_values_use_midpoint() {
        let scale = build_scale(&numbers(&[4.0, 4.0, 4.0]), "viridis").unwrap();
        let mid = scale.sample(0.5);
        assert_eq!(scale.color_for(&AttributeValue::Number(4.0)), mid);
        assert_eq!(scale.color_for(&AttributeValue::Number(-1.0)), mid);
    }

    #[test]
    fn test_categorical_first_seen_order() {
        let values = vec![
            AttributeValue::from("b"),
            AttributeValue::from("a"),
            AttributeValue::from("b"),
            AttributeValue::Null,
        ];
        let scale = build_scale(&values, "category10").unwrap();
        assert_eq!(scale.kind(), &ScaleKind::Categorical);

        let cats: Vec<(&str, Rgb)> = scale.categories().collect();
        assert_eq!(
            cats,
            vec![
                ("b", hex(CATEGORY10[0])),
                ("a", hex(CATEGORY10[1])),
                ("null", hex(CATEGORY10[2])),
            ]
        );
        assert_eq!(scale.color_for(&AttributeValue::from("zzz")), Rgb::MISSING);
    }

    #[test]
    fn test_categorical_cycles() {
        let values: Vec<AttributeValue> = (0..12).map(|i| AttributeValue::from(format!("v{i}"))).collect();
        let scale = build_scale(&values, "category10").unwrap();
        assert_eq!(
            scale.color_for(&AttributeValue::from("v10")),
            scale.color_for(&AttributeValue::from("v0"))
        );
    }

    #[test]
    fn test_mixed_values_are_categorical() {
        let values = vec![AttributeValue::Number(1.0), AttributeValue::from("x")];
        let scale = build_scale(&values, "set1").unwrap();
        assert_eq!(scale.kind(), &ScaleKind::Categorical);
        assert_ne!(scale.color_for(&AttributeValue::Number(1.0)), Rgb::MISSING);
    }

    #[test]
    fn test_numeric_text_is_continuous() {
        let values: Vec<AttributeValue> = ["1", "5", " 10 "]
            .into_iter()
            .map(AttributeValue::from)
            .collect();
        let scale = build_scale(&values, "viridis").unwrap();
        assert_eq!(scale.kind(), &ScaleKind::Continuous { min: 1.0, max: 10.0 });
        assert_eq!(scale.color_for(&AttributeValue::Number(1.0)), hex(VIRIDIS[0]));
        assert_eq!(scale.color_for(&values[0]), hex(VIRIDIS[0]));

        let mut values = values;
        values.push(AttributeValue::from("NaN"));
        let scale = build_scale(&values, "viridis").unwrap();
        assert_eq!(scale.kind(), &ScaleKind::Categorical);
    }

    #[test]
    fn test_empty_values() {
        let scale = build_scale(&[], "viridis").unwrap();
        assert_eq!(scale.kind(), &ScaleKind::Categorical);
        assert_eq!(scale.categories().count(), 0);
    }

    #[test]
    fn test_unknown_scheme() {
        let result = build_scale(&numbers(&[1.0]), "rainbow-unicorn");
        assert!(matches!(result, Err(InsightsError::UnknownScheme(_))));
    }

    #[test]
    fn test_scale_is_pure() {
        let values = numbers(&[1.0, 2.0, 8.0]);
        let a = build_scale(&values, "magma").unwrap();
        let b = build_scale(&values, "magma").unwrap();
        for v in &values {
            assert_eq!(a.color_for(v), b.color_for(v));
        }
    }

    #[test]
    fn test_continuous_non_numeric_lookup() {
        let scale = build_scale(&numbers(&[1.0, 2.0]), "blues").unwrap();
        assert_eq!(scale.color_for(&AttributeValue::Null), Rgb::MISSING);
        assert_eq!(scale.color_for_optional(None), Rgb::MISSING);
        assert_ne!(scale.color_for(&AttributeValue::from("1.5")), Rgb::MISSING);
    }
}
