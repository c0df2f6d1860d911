//! Coordinate conversions between pixel, normalized, and angular space.
//!
//! The capture region is a square cut from the center of a larger display
//! whose horizontal field of view is known. All conversions are pure given a
//! fixed [`FrameConfig`]; derived quantities (center, aspect ratio, vertical
//! and per-axis effective field of view) are computed once at construction.

use nalgebra::Vector2;

use crate::config::FrameConfig;
use crate::error::ConfigError;

/// Stateless converter between pixel, normalized, and angular offsets.
#[derive(Debug, Clone)]
pub struct CoordinateFrame {
    config: FrameConfig,
    center: f64,
    aspect_ratio: f64,
    fov_vertical_deg: f64,
    effective_fov_h: f64,
    effective_fov_v: f64,
}

impl CoordinateFrame {
    /// Build a frame from validated geometry.
    pub fn new(config: FrameConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let center = config.capture_size as f64 / 2.0;
        let aspect_ratio = config.display_width as f64 / config.display_height as f64;

        // Vertical FOV from the horizontal one, corrected for aspect ratio.
        let half_h = (config.fov_horizontal_deg / 2.0).to_radians();
        let fov_vertical_deg = 2.0 * (half_h.tan() / aspect_ratio).atan().to_degrees();

        // The capture region covers only a slice of the display, and thus a
        // proportional slice of each FOV axis.
        let capture_ratio_h = config.capture_size as f64 / config.display_width as f64;
        let capture_ratio_v = config.capture_size as f64 / config.display_height as f64;

        Ok(Self {
            config,
            center,
            aspect_ratio,
            fov_vertical_deg,
            effective_fov_h: config.fov_horizontal_deg * capture_ratio_h,
            effective_fov_v: fov_vertical_deg * capture_ratio_v,
        })
    }

    /// The geometry this frame was built from.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Center of the capture region in pixel coordinates.
    pub fn center_point(&self) -> Vector2<f64> {
        Vector2::new(self.center, self.center)
    }

    /// Display aspect ratio (width over height).
    pub fn aspect_ratio(&self) -> f64 {
        self.aspect_ratio
    }

    /// Vertical field of view of the full display, degrees.
    pub fn fov_vertical_deg(&self) -> f64 {
        self.fov_vertical_deg
    }

    /// Angular extent covered by the capture region, degrees, per axis.
    pub fn effective_fov(&self) -> (f64, f64) {
        (self.effective_fov_h, self.effective_fov_v)
    }

    /// Map capture-pixel coordinates to normalized coordinates in roughly
    /// [-1, 1] relative to the frame center.
    ///
    /// A zero-sized center yields a zero offset rather than a division by
    /// zero; construction validation makes that unreachable in practice.
    pub fn pixel_to_normalized(&self, x: f64, y: f64) -> (f64, f64) {
        if self.center == 0.0 {
            return (0.0, 0.0);
        }
        ((x - self.center) / self.center, (y - self.center) / self.center)
    }

    /// Inverse of [`pixel_to_normalized`](Self::pixel_to_normalized).
    pub fn normalized_to_pixel(&self, nx: f64, ny: f64) -> (f64, f64) {
        (nx * self.center + self.center, ny * self.center + self.center)
    }

    /// Map normalized coordinates to angular offsets in degrees.
    pub fn normalized_to_angle(&self, nx: f64, ny: f64) -> (f64, f64) {
        (
            nx * (self.effective_fov_h / 2.0),
            ny * (self.effective_fov_v / 2.0),
        )
    }

    /// Map angular offsets back to normalized coordinates.
    pub fn angle_to_normalized(&self, angle_h: f64, angle_v: f64) -> (f64, f64) {
        (
            angle_h / (self.effective_fov_h / 2.0),
            angle_v / (self.effective_fov_v / 2.0),
        )
    }

    /// Map capture-pixel coordinates directly to angular offsets.
    pub fn pixel_to_angle(&self, x: f64, y: f64) -> (f64, f64) {
        let (nx, ny) = self.pixel_to_normalized(x, y);
        self.normalized_to_angle(nx, ny)
    }

    /// Translate an angular correction back into a pixel-space delta, the
    /// unit the actuator consumes.
    pub fn angle_to_pixel_delta(&self, angle_h: f64, angle_v: f64) -> Vector2<f64> {
        let (nx, ny) = self.angle_to_normalized(angle_h, angle_v);
        Vector2::new(nx * self.center, ny * self.center)
    }

    /// Scale a capture-pixel offset up to display pixels.
    pub fn capture_to_display_delta(&self, delta: Vector2<f64>) -> Vector2<f64> {
        let scale_x = self.config.display_width as f64 / self.config.capture_size as f64;
        let scale_y = self.config.display_height as f64 / self.config.capture_size as f64;
        Vector2::new(delta.x * scale_x, delta.y * scale_y)
    }

    /// Express the offset from `origin` to `target` in all three spaces at
    /// once, so downstream consumers can pick whichever representation their
    /// threshold mode uses.
    pub fn compose_offset(&self, target: Vector2<f64>, origin: Vector2<f64>) -> TargetOffset {
        let pixel = target - origin;
        let normalized = if self.center == 0.0 {
            Vector2::zeros()
        } else {
            pixel / self.center
        };
        let angle = Vector2::new(
            normalized.x * (self.effective_fov_h / 2.0),
            normalized.y * (self.effective_fov_v / 2.0),
        );
        TargetOffset {
            pixel,
            normalized,
            angle,
        }
    }
}

/// One offset expressed in pixel, normalized, and angular space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetOffset {
    /// Offset in capture pixels.
    pub pixel: Vector2<f64>,
    /// Offset in normalized coordinates relative to the frame center.
    pub normalized: Vector2<f64>,
    /// Offset in degrees (horizontal, vertical).
    pub angle: Vector2<f64>,
}

impl TargetOffset {
    /// Scalar pixel distance.
    pub fn pixel_distance(&self) -> f64 {
        self.pixel.norm()
    }

    /// Scalar normalized distance.
    pub fn normalized_distance(&self) -> f64 {
        self.normalized.norm()
    }

    /// Scalar angular distance in degrees.
    pub fn angle_distance(&self) -> f64 {
        self.angle.norm()
    }
}
