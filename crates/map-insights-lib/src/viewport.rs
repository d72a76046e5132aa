//! Camera state to ground rectangle
//!
//! The map camera is described the way web map libraries describe it: a center in degrees, a
//! zoom level where the whole world is 512 pixels wide at zoom 0, a pitch (tilt away from
//! straight down) and a bearing (clockwise rotation of the view from north). [`viewport_to_bounds`]
//! casts the four screen corners onto the ground plane and reduces them to an axis-aligned box.

use crate::utils::{
    EARTH_MERCATOR_MAX, EARTH_MERCATOR_MIN, EARTH_SIZE_METERS, lon_lat_to_mercator,
    mercator_to_lon_lat,
};
use crate::{BoundingBox, CoordinateSpace, InsightsError, Result};
use geo::Coord;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// World width in pixels at zoom 0
pub const TILE_SIZE: f64 = 512.0;

/// Highest pitch the camera accepts, in degrees
pub const MAX_PITCH: f64 = 85.0;

/// Camera distance from the center point, in viewport heights
const CAMERA_ALTITUDE: f64 = 1.5;

/// Rays close to the horizon are cut off at this many camera distances
const MAX_RAY_SCALE: f64 = 20.0;

/// Camera description of the current map view
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ViewState {
    /// Center longitude in degrees
    pub longitude: f64,
    /// Center latitude in degrees
    pub latitude: f64,
    pub zoom: f64,
    /// Tilt in degrees, 0 looks straight down
    #[cfg_attr(feature = "serde", serde(default))]
    pub pitch: f64,
    /// Rotation in degrees, clockwise from north
    #[cfg_attr(feature = "serde", serde(default))]
    pub bearing: f64,
    /// Viewport width in pixels
    pub width: f64,
    /// Viewport height in pixels
    pub height: f64,
}

impl ViewState {
    /// Top-down view of the given center
    pub fn new(longitude: f64, latitude: f64, zoom: f64, width: f64, height: f64) -> Self {
        Self {
            longitude,
            latitude,
            zoom,
            pitch: 0.0,
            bearing: 0.0,
            width,
            height,
        }
    }

    pub fn with_pitch(mut self, pitch: f64) -> Self {
        self.pitch = pitch;
        self
    }

    pub fn with_bearing(mut self, bearing: f64) -> Self {
        self.bearing = bearing;
        self
    }

    fn validate(&self) -> Result<()> {
        let fields = [
            ("longitude", self.longitude),
            ("latitude", self.latitude),
            ("zoom", self.zoom),
            ("pitch", self.pitch),
            ("bearing", self.bearing),
            ("width", self.width),
            ("height", self.height),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(InsightsError::InvalidViewState {
                reason: format!("{name} is not finite"),
            });
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(InsightsError::InvalidViewState {
                reason: format!("viewport size {}x{} is empty", self.width, self.height),
            });
        }
        Ok(())
    }

    /// Ground distance covered by one screen pixel at the center, in Web Mercator meters
    #[inline]
    pub fn meters_per_pixel(&self) -> f64 {
        EARTH_SIZE_METERS / (TILE_SIZE * self.zoom.exp2())
    }

    /// Ground offsets (east, north) in pixels of the four screen corners
    fn corner_offsets(&self) -> [Coord<f64>; 4] {
        let half_w = self.width / 2.0;
        let half_h = self.height / 2.0;
        [
            (-half_w, half_h),
            (half_w, half_h),
            (half_w, -half_h),
            (-half_w, -half_h),
        ]
        .map(|(dx, dy)| self.screen_to_ground(dx, dy))
    }

    /// Cast a screen offset (right, up) from the viewport center onto the ground plane
    ///
    /// The camera sits `CAMERA_ALTITUDE` viewport heights from the center along the view axis.
    /// Rays that would hit the ground beyond `MAX_RAY_SCALE` camera distances, or never hit it,
    /// are cut off there.
    fn screen_to_ground(&self, dx: f64, dy: f64) -> Coord<f64> {
        let distance = CAMERA_ALTITUDE * self.height;
        let pitch = self.pitch.clamp(0.0, MAX_PITCH).to_radians();
        let (sin_p, cos_p) = pitch.sin_cos();

        let denom = (distance * cos_p - dy * sin_p).max(distance * cos_p / MAX_RAY_SCALE);
        let t = distance * cos_p / denom;

        let right = t * dx;
        let forward = -distance * sin_p + t * (dy * cos_p + distance * sin_p);

        let (sin_b, cos_b) = self.bearing.to_radians().sin_cos();
        Coord {
            x: right * cos_b + forward * sin_b,
            y: -right * sin_b + forward * cos_b,
        }
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, 800.0, 600.0)
    }
}

/// Bounds as produced by a projection, before normalization
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum ProjectedBounds {
    /// `[[min_x, min_y], [max_x, max_y]]`
    Nested([[f64; 2]; 2]),
    /// `[min_x, min_y, max_x, max_y]`
    Flat([f64; 4]),
}

impl ProjectedBounds {
    /// Interpret a JSON value as projected bounds
    ///
    /// # Errors
    /// Returns [`InsightsError::MalformedBounds`] for any shape other than the nested or flat form.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let malformed = || InsightsError::MalformedBounds(value.to_string());
        let items = value.as_array().ok_or_else(malformed)?;

        let numbers = |values: &[serde_json::Value]| -> Option<Vec<f64>> {
            values.iter().map(serde_json::Value::as_f64).collect()
        };

        match items.as_slice() {
            [a, b] => {
                let a = a.as_array().and_then(|v| numbers(v.as_slice())).ok_or_else(malformed)?;
                let b = b.as_array().and_then(|v| numbers(v.as_slice())).ok_or_else(malformed)?;
                match (a.as_slice(), b.as_slice()) {
                    ([x0, y0], [x1, y1]) => Ok(Self::Nested([[*x0, *y0], [*x1, *y1]])),
                    _ => Err(malformed()),
                }
            }
            [_, _, _, _] => {
                let flat = numbers(items.as_slice()).ok_or_else(malformed)?;
                Ok(Self::Flat([flat[0], flat[1], flat[2], flat[3]]))
            }
            _ => Err(malformed()),
        }
    }

    /// Canonical box, rejecting non-finite values
    pub fn normalize(&self) -> Result<BoundingBox> {
        let bbox = match *self {
            Self::Nested([[min_x, min_y], [max_x, max_y]]) => {
                BoundingBox::new(min_x, min_y, max_x, max_y)
            }
            Self::Flat(values) => BoundingBox::from(values),
        };
        if bbox.to_array().iter().all(|v| v.is_finite()) {
            Ok(bbox)
        } else {
            Err(InsightsError::MalformedBounds(format!("{self:?}")))
        }
    }
}

/// Ground rectangle visible under the camera, in geographic degrees
///
/// # Errors
/// Returns [`InsightsError::InvalidViewState`] for non-finite camera values or an empty viewport.
pub fn viewport_to_bounds(view: &ViewState) -> Result<BoundingBox> {
    viewport_to_bounds_in(view, CoordinateSpace::Geographic)
}

/// Ground rectangle visible under the camera, in the requested coordinate space
///
/// The rectangle is clipped to the Web Mercator world.
pub fn viewport_to_bounds_in(view: &ViewState, space: CoordinateSpace) -> Result<BoundingBox> {
    view.validate()?;

    let center = lon_lat_to_mercator(view.longitude, view.latitude);
    let scale = view.meters_per_pixel();

    let corners = view.corner_offsets().map(|offset| Coord {
        x: (center.x + offset.x * scale).clamp(EARTH_MERCATOR_MIN, EARTH_MERCATOR_MAX),
        y: (center.y + offset.y * scale).clamp(EARTH_MERCATOR_MIN, EARTH_MERCATOR_MAX),
    });

    let mercator = BoundingBox::from_coords(corners).ok_or_else(|| {
        InsightsError::InvalidViewState {
            reason: "no ground corners".to_string(),
        }
    })?;

    tracing::debug!(
        "View ({:.5}, {:.5}) z{:.2} p{:.1} b{:.1} -> mercator {:?}",
        view.longitude,
        view.latitude,
        view.zoom,
        view.pitch,
        view.bearing,
        mercator.to_array()
    );

    Ok(match space {
        CoordinateSpace::WebMercator => mercator,
        CoordinateSpace::Geographic => {
            let min = mercator_to_lon_lat(mercator.min_x, mercator.min_y);
            let max = mercator_to_lon_lat(mercator.max_x, mercator.max_y);
            BoundingBox::new(min.x, min.y, max.x, max.y)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn approx(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn test_top_down_bounds() {
        // 512 px at zoom 1 is half the world
        let view = ViewState::new(0.0, 0.0, 1.0, 512.0, 512.0);
        let b = viewport_to_bounds(&view).unwrap();
        assert!(approx(b.min_x, -90.0, 1e-9));
        assert!(approx(b.max_x, 90.0, 1e-9));
        assert!(approx(b.max_y, 66.51326, 1e-4));
        assert!(approx(b.min_y, -66.51326, 1e-4));
    }

    #[test]
    fn test_mercator_output() {
        let view = ViewState::new(0.0, 0.0, 2.0, 512.0, 256.0);
        let b = viewport_to_bounds_in(&view, CoordinateSpace::WebMercator).unwrap();
        assert!(approx(b.width(), EARTH_SIZE_METERS / 4.0, 1e-3));
        assert!(approx(b.height(), EARTH_SIZE_METERS / 8.0, 1e-3));
        assert!(approx(b.center().x, 0.0, 1e-6));
    }

    #[test]
    fn test_whole_world_is_clipped() {
        let view = ViewState::new(0.0, 0.0, 0.0, 4096.0, 4096.0);
        let b = viewport_to_bounds(&view).unwrap();
        assert!(approx(b.min_x, -180.0, 1e-6));
        assert!(approx(b.max_x, 180.0, 1e-6));
        assert!(b.max_y < 85.1);
    }

    #[test]
    fn test_bearing_rotates_box() {
        let flat = ViewState::new(10.0, 10.0, 8.0, 600.0, 600.0);
        let b0 = viewport_to_bounds_in(&flat, CoordinateSpace::WebMercator).unwrap();

        let quarter = viewport_to_bounds_in(&flat.with_bearing(90.0), CoordinateSpace::WebMercator)
            .unwrap();
        assert!(approx(quarter.width(), b0.width(), 1e-6));

        let diagonal = viewport_to_bounds_in(&flat.with_bearing(45.0), CoordinateSpace::WebMercator)
            .unwrap();
        assert!(approx(
            diagonal.width(),
            b0.width() * std::f64::consts::SQRT_2,
            1e-3
        ));
    }

    #[test]
    fn test_pitch_extends_far_edge() {
        let flat = ViewState::new(0.0, 0.0, 10.0, 800.0, 600.0);
        let b0 = viewport_to_bounds_in(&flat, CoordinateSpace::WebMercator).unwrap();
        let tilted = viewport_to_bounds_in(&flat.with_pitch(60.0), CoordinateSpace::WebMercator)
            .unwrap();

        assert!(tilted.max_y > b0.max_y);
        assert!(tilted.contains(Coord { x: 0.0, y: 0.0 }));
        // The far edge is wider than the near edge under perspective
        assert!(tilted.width() > b0.width());
    }

    #[test]
    fn test_extreme_pitch_stays_finite() {
        let view = ViewState::new(0.0, 0.0, 12.0, 800.0, 600.0).with_pitch(89.0);
        let b = viewport_to_bounds(&view).unwrap();
        assert!(b.is_valid());
    }

    #[test]
    fn test_invalid_view_state() {
        let empty = ViewState::new(0.0, 0.0, 1.0, 0.0, 600.0);
        assert!(matches!(
            viewport_to_bounds(&empty),
            Err(InsightsError::InvalidViewState { .. })
        ));

        let nan = ViewState::new(f64::NAN, 0.0, 1.0, 800.0, 600.0);
        assert!(matches!(
            viewport_to_bounds(&nan),
            Err(InsightsError::InvalidViewState { .. })
        ));
    }

    #[test]
    fn test_projected_bounds_shapes() {
        let nested = ProjectedBounds::from_json(&json!([[1.0, 2.0], [3.0, 4.0]])).unwrap();
        let flat = ProjectedBounds::from_json(&json!([1.0, 2.0, 3.0, 4.0])).unwrap();
        assert_eq!(nested.normalize().unwrap(), flat.normalize().unwrap());
        assert_eq!(
            flat.normalize().unwrap(),
            BoundingBox::new(1.0, 2.0, 3.0, 4.0)
        );
    }

    #[test]
    fn test_malformed_bounds() {
        for bad in [
            json!([1.0, 2.0, 3.0]),
            json!({"min": 1}),
            json!([[1.0], [2.0, 3.0]]),
            json!([1.0, "a", 3.0, 4.0]),
            json!(null),
        ] {
            assert!(matches!(
                ProjectedBounds::from_json(&bad),
                Err(InsightsError::MalformedBounds(_))
            ));
        }

        let inf = ProjectedBounds::Flat([0.0, 0.0, f64::INFINITY, 1.0]);
        assert!(inf.normalize().is_err());
    }
}
