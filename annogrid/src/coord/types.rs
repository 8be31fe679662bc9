//! Geographic and projected value types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::normalize_longitude;

/// Minimum latitude representable in the Web Mercator projection.
pub const MIN_MERCATOR_LAT: f64 = -85.05112878;

/// Maximum latitude representable in the Web Mercator projection.
pub const MAX_MERCATOR_LAT: f64 = 85.05112878;

/// Width and height of the projected world square, in projected units.
///
/// 256-unit tiles at the deepest zoom level: `256 * 2^20`.
pub const WORLD_SIZE: f64 = 268_435_456.0;

/// Span padding applied by [`Region::containing`] so fitted regions leave
/// a margin around the outermost coordinates.
pub const FIT_PADDING_FACTOR: f64 = 1.3;

/// Errors produced when constructing geographic values.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CoordError {
    /// Latitude outside [-90, 90].
    #[error("invalid latitude: {0}")]
    InvalidLatitude(f64),

    /// Longitude outside [-180, 180).
    #[error("invalid longitude: {0}")]
    InvalidLongitude(f64),

    /// Negative or non-finite span.
    #[error("invalid span: {0}")]
    InvalidSpan(f64),
}

/// A geographic coordinate: latitude in [-90, 90], longitude in [-180, 180).
///
/// Construction validates the ranges, so every `Coordinate` in the pipeline
/// is known to be valid. Records whose coordinate fields fail validation are
/// excluded upstream rather than carried as invalid values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawCoordinate {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = CoordError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Coordinate::new(raw.latitude, raw.longitude)
    }
}

impl Coordinate {
    /// Create a validated coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordError::InvalidLatitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..180.0).contains(&longitude) {
            return Err(CoordError::InvalidLongitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Create a coordinate from possibly out-of-range values by clamping the
    /// latitude and wrapping the longitude.
    ///
    /// Used for derived coordinates (centroids, unprojections) where the
    /// inputs are already near-valid and an error would be unrecoverable.
    pub(crate) fn clamped(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: latitude.clamp(-90.0, 90.0),
            longitude: normalize_longitude(longitude),
        }
    }

    /// Latitude in degrees.
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees.
    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// A rectangular search area: center coordinate plus latitude/longitude spans.
///
/// A region may extend past the antimeridian when
/// `center.longitude() ± longitude_span / 2` leaves [-180, 180); the region
/// predicate builder splits such regions into two longitude ranges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRegion")]
pub struct Region {
    center: Coordinate,
    latitude_span: f64,
    longitude_span: f64,
}

#[derive(Deserialize)]
struct RawRegion {
    center: Coordinate,
    latitude_span: f64,
    longitude_span: f64,
}

impl TryFrom<RawRegion> for Region {
    type Error = CoordError;

    fn try_from(raw: RawRegion) -> Result<Self, Self::Error> {
        Region::new(raw.center, raw.latitude_span, raw.longitude_span)
    }
}

impl Region {
    /// Create a region with non-negative spans.
    pub fn new(
        center: Coordinate,
        latitude_span: f64,
        longitude_span: f64,
    ) -> Result<Self, CoordError> {
        if !latitude_span.is_finite() || latitude_span < 0.0 {
            return Err(CoordError::InvalidSpan(latitude_span));
        }
        if !longitude_span.is_finite() || longitude_span < 0.0 {
            return Err(CoordError::InvalidSpan(longitude_span));
        }
        Ok(Self {
            center,
            latitude_span,
            longitude_span,
        })
    }

    /// The region's center coordinate.
    pub fn center(&self) -> Coordinate {
        self.center
    }

    /// Latitude span in degrees.
    pub fn latitude_span(&self) -> f64 {
        self.latitude_span
    }

    /// Longitude span in degrees.
    pub fn longitude_span(&self) -> f64 {
        self.longitude_span
    }

    /// Southern latitude bound, clamped to -90.
    pub fn south(&self) -> f64 {
        (self.center.latitude() - self.latitude_span / 2.0).max(-90.0)
    }

    /// Northern latitude bound, clamped to 90.
    pub fn north(&self) -> f64 {
        (self.center.latitude() + self.latitude_span / 2.0).min(90.0)
    }

    /// Western longitude bound. May be below -180 for a wrapping region.
    pub fn west(&self) -> f64 {
        self.center.longitude() - self.longitude_span / 2.0
    }

    /// Eastern longitude bound. May be above 180 for a wrapping region.
    pub fn east(&self) -> f64 {
        self.center.longitude() + self.longitude_span / 2.0
    }

    /// Whether the region extends past the ±180° meridian.
    pub fn crosses_antimeridian(&self) -> bool {
        self.west() < -180.0 || self.east() > 180.0
    }

    /// Smallest region containing all coordinates, with both spans padded by
    /// [`FIT_PADDING_FACTOR`] for a zoom-to-fit margin.
    ///
    /// Bounds are taken in plain geographic space, matching a projected-rect
    /// union: a coordinate set straddling the antimeridian yields a
    /// near-world-wide region rather than a wrapping one.
    ///
    /// Returns `None` for an empty coordinate set.
    pub fn containing<I>(coordinates: I) -> Option<Region>
    where
        I: IntoIterator<Item = Coordinate>,
    {
        let mut iter = coordinates.into_iter();
        let first = iter.next()?;

        let mut south = first.latitude();
        let mut north = first.latitude();
        let mut west = first.longitude();
        let mut east = first.longitude();
        for coordinate in iter {
            south = south.min(coordinate.latitude());
            north = north.max(coordinate.latitude());
            west = west.min(coordinate.longitude());
            east = east.max(coordinate.longitude());
        }

        let center = Coordinate::clamped((south + north) / 2.0, (west + east) / 2.0);
        let latitude_span = ((north - south) * FIT_PADDING_FACTOR).min(180.0);
        let longitude_span = ((east - west) * FIT_PADDING_FACTOR).min(360.0);

        Region::new(center, latitude_span, longitude_span).ok()
    }
}

/// A point in the projected world square, in projected units.
///
/// `x` grows eastward from -180° longitude; `y` grows southward from the
/// northern Mercator limit. Both lie in `[0, WORLD_SIZE)` for valid
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldPoint {
    x: f64,
    y: f64,
}

impl WorldPoint {
    /// Create a world point.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Horizontal position in projected units.
    pub fn x(&self) -> f64 {
        self.x
    }

    /// Vertical position in projected units.
    pub fn y(&self) -> f64 {
        self.y
    }
}

/// An axis-aligned rectangle in projected units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedRect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl ProjectedRect {
    /// Create a rectangle from its northwest origin and size.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Origin x in projected units.
    pub fn x(&self) -> f64 {
        self.x
    }

    /// Origin y in projected units.
    pub fn y(&self) -> f64 {
        self.y
    }

    /// Width in projected units.
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Height in projected units.
    pub fn height(&self) -> f64 {
        self.height
    }
}
