//! Coordinate types, Web Mercator projection, and spherical distance.
//!
//! Provides the geographic value types used throughout the pipeline
//! ([`Coordinate`], [`Region`]) and the projection into a fixed world pixel
//! space ([`WorldPoint`], [`WORLD_SIZE`]) that the cluster grid and zoom
//! calculations are built on. The projected world is a square of
//! [`WORLD_SIZE`] units; cell and zoom math derives from powers of two of
//! that size, so grid assignment is stable across viewport pans.

mod types;

pub use types::{
    Coordinate, CoordError, ProjectedRect, Region, WorldPoint, FIT_PADDING_FACTOR,
    MAX_MERCATOR_LAT, MIN_MERCATOR_LAT, WORLD_SIZE,
};

use std::f64::consts::PI;

/// Mean Earth radius in meters, used for great-circle distances.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Wrap a longitude into [-180, 180).
pub fn normalize_longitude(longitude: f64) -> f64 {
    (longitude + 180.0).rem_euclid(360.0) - 180.0
}

/// Project a coordinate into the world pixel space.
///
/// Latitudes beyond the Mercator limits are clamped to the nearest
/// representable row, so polar records still land in a grid cell.
pub fn project(coordinate: Coordinate) -> WorldPoint {
    WorldPoint::new(
        world_x(coordinate.longitude()),
        world_y(coordinate.latitude()),
    )
}

/// Map a world point back to the coordinate at its position.
pub fn unproject(point: WorldPoint) -> Coordinate {
    let longitude = point.x() / WORLD_SIZE * 360.0 - 180.0;
    let y = (point.y() / WORLD_SIZE).clamp(0.0, 1.0);
    let latitude = (PI * (1.0 - 2.0 * y)).sinh().atan().to_degrees();
    Coordinate::clamped(latitude, longitude)
}

/// Great-circle distance between two coordinates in meters (haversine).
pub fn great_circle_distance(a: Coordinate, b: Coordinate) -> f64 {
    let lat_a = a.latitude().to_radians();
    let lat_b = b.latitude().to_radians();
    let d_lat = (b.latitude() - a.latitude()).to_radians();
    let d_lon = (b.longitude() - a.longitude()).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

pub(crate) fn world_x(longitude: f64) -> f64 {
    (longitude + 180.0) / 360.0 * WORLD_SIZE
}

pub(crate) fn world_y(latitude: f64) -> f64 {
    let latitude = latitude.clamp(MIN_MERCATOR_LAT, MAX_MERCATOR_LAT);
    let lat_rad = latitude.to_radians();
    (1.0 - lat_rad.tan().asinh() / PI) / 2.0 * WORLD_SIZE
}
