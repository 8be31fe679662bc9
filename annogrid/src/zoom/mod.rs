//! Viewport geometry and discrete zoom levels.
//!
//! A [`Viewport`] pairs the visible projected rectangle with the width of
//! the rendering surface in pixels. From those two values it derives the
//! zoom scale (projected units per pixel) and the discrete zoom level in
//! [0, 20], where 0 shows the entire world and 20 is maximum magnification.

use crate::coord::{world_x, world_y, ProjectedRect, Region, WORLD_SIZE};

/// Discrete map zoom level: 0 = entire world visible, 20 = maximum zoom.
pub type ZoomLevel = u8;

/// The shallowest zoom level.
pub const MIN_ZOOM_LEVEL: ZoomLevel = 0;

/// The deepest zoom level.
pub const MAX_ZOOM_LEVEL: ZoomLevel = 20;

/// The visible portion of the projected world plus the surface width it is
/// rendered into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    visible: ProjectedRect,
    pixel_width: f64,
}

impl Viewport {
    /// Create a viewport from a visible projected rectangle and the pixel
    /// width of the rendering surface.
    pub fn new(visible: ProjectedRect, pixel_width: f64) -> Self {
        Self {
            visible,
            pixel_width,
        }
    }

    /// Create a viewport showing `region`, rendered `pixel_width` pixels wide.
    pub fn from_region(region: &Region, pixel_width: f64) -> Self {
        let x = world_x(region.west());
        let y = world_y(region.north());
        let width = region.longitude_span() / 360.0 * WORLD_SIZE;
        let height = world_y(region.south()) - y;
        Self::new(ProjectedRect::new(x, y, width, height), pixel_width)
    }

    /// The visible projected rectangle.
    pub fn visible(&self) -> ProjectedRect {
        self.visible
    }

    /// Width of the rendering surface in pixels.
    pub fn pixel_width(&self) -> f64 {
        self.pixel_width
    }

    /// Projected units per rendered pixel.
    pub fn zoom_scale(&self) -> f64 {
        self.visible.width() / self.pixel_width
    }

    /// Discrete zoom level for the visible rectangle:
    /// `floor(log2(WORLD_SIZE / visible_width))`, clamped to [0, 20].
    ///
    /// Monotonic: narrowing the visible rectangle never decreases the level.
    /// Degenerate widths (non-positive or non-finite) clamp to the deepest
    /// level.
    pub fn zoom_level(&self) -> ZoomLevel {
        let width = self.visible.width();
        if !width.is_finite() || width <= 0.0 {
            return MAX_ZOOM_LEVEL;
        }
        let level = (WORLD_SIZE / width).log2().floor();
        if level <= f64::from(MIN_ZOOM_LEVEL) {
            MIN_ZOOM_LEVEL
        } else if level >= f64::from(MAX_ZOOM_LEVEL) {
            MAX_ZOOM_LEVEL
        } else {
            level as ZoomLevel
        }
    }
}
