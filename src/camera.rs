// src/camera.rs - pinhole camera model and image -> world mapping
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::landmarks::{LandmarkFrame, MIDDLE_MCP, WRIST};
use crate::error::TryOnError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraModel {
    /// Vertical field of view in degrees.
    pub fov_degrees: f64,
    pub aspect: f64,
    pub frame_width: u32,
    pub frame_height: u32,
    pub near: f64,
    pub far: f64,
}

impl Default for CameraModel {
    fn default() -> Self {
        Self {
            fov_degrees: 50.0,
            aspect: 16.0 / 9.0,
            frame_width: 1280,
            frame_height: 720,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl CameraModel {
    pub fn fov_radians(&self) -> f64 {
        self.fov_degrees.to_radians()
    }

    pub fn view_height_at(&self, depth: f64) -> f64 {
        2.0 * (self.fov_radians() / 2.0).tan() * depth
    }

    pub fn view_width_at(&self, depth: f64) -> f64 {
        self.view_height_at(depth) * self.aspect
    }

    /// Adopts the real stream resolution once the camera is open.
    pub fn set_resolution(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.frame_width = width;
        self.frame_height = height;
        self.aspect = width as f64 / height as f64;
    }

    /// Pixel distance between two normalized image points.
    pub fn pixel_distance(&self, a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
        let dx = (a.x - b.x) * self.frame_width as f64;
        let dy = (a.y - b.y) * self.frame_height as f64;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn validate(&self) -> Result<(), TryOnError> {
        if !(self.fov_degrees > 0.0 && self.fov_degrees < 180.0) {
            return Err(TryOnError::InvalidConfig(format!(
                "fov_degrees must be in (0, 180), got {}",
                self.fov_degrees
            )));
        }
        if !(self.aspect > 0.0) {
            return Err(TryOnError::InvalidConfig("aspect must be positive".into()));
        }
        if !(self.near > 0.0 && self.far > self.near) {
            return Err(TryOnError::InvalidConfig("expected 0 < near < far".into()));
        }
        Ok(())
    }
}

/// How far the hand is assumed to be from the camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DepthMode {
    Fixed {
        depth: f64,
    },
    /// Depth scales inversely with the wrist to middle-knuckle pixel span.
    Estimated {
        reference_width_px: f64,
        reference_depth: f64,
    },
}

impl Default for DepthMode {
    fn default() -> Self {
        DepthMode::Fixed { depth: 5.0 }
    }
}

impl DepthMode {
    pub fn validate(&self) -> Result<(), TryOnError> {
        let ok = match *self {
            DepthMode::Fixed { depth } => depth > 0.0,
            DepthMode::Estimated {
                reference_width_px,
                reference_depth,
            } => reference_width_px > 0.0 && reference_depth > 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(TryOnError::InvalidConfig(format!("non-positive depth setting {:?}", self)))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthEstimate {
    pub depth: f64,
    /// The reference landmarks coincided and the denominator was replaced by 1.
    pub guard_triggered: bool,
}

/// Substitutes 1 for a zero (or otherwise unusable) denominator.
pub fn safe_denominator(value: f64) -> (f64, bool) {
    if value > 0.0 && value.is_finite() {
        (value, false)
    } else {
        (1.0, true)
    }
}

pub fn estimate_depth(
    frame: &LandmarkFrame,
    camera: &CameraModel,
    mode: &DepthMode,
) -> Result<DepthEstimate, TryOnError> {
    match *mode {
        DepthMode::Fixed { depth } => Ok(DepthEstimate {
            depth,
            guard_triggered: false,
        }),
        DepthMode::Estimated {
            reference_width_px,
            reference_depth,
        } => {
            let (wrist, knuckle) = frame.pair((WRIST, MIDDLE_MCP))?;
            let observed = camera.pixel_distance(&wrist, &knuckle);
            let (observed, guard_triggered) = safe_denominator(observed);
            Ok(DepthEstimate {
                depth: reference_width_px / observed * reference_depth,
                guard_triggered,
            })
        }
    }
}

/// Maps a normalized landmark into camera-relative world space.
///
/// The camera sits at the origin looking down -Z, with +Y up. `relative_depth_gain`
/// lets the landmark's own z push it nearer or further; zero pins every point to
/// the plane at `-depth`.
pub fn map_to_world(
    point: &Vector3<f64>,
    camera: &CameraModel,
    depth: f64,
    relative_depth_gain: f64,
) -> Vector3<f64> {
    let view_height = camera.view_height_at(depth);
    let view_width = view_height * camera.aspect;

    Vector3::new(
        (point.x - 0.5) * view_width,
        -(point.y - 0.5) * view_height,
        -depth - point.z * view_width * relative_depth_gain,
    )
}
