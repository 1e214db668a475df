// src/pose.rs - target ring / occluder transforms from one landmark frame
use nalgebra::{Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::basis::{solve_basis, HandBasis};
use crate::camera::{estimate_depth, map_to_world, CameraModel, DepthEstimate, DepthMode};
use crate::error::TryOnError;
use crate::landmarks::{FingerDescriptor, LandmarkFrame};

/// Smallest scale handed to the renderer; a zero scale collapses the mesh.
pub const MIN_SCALE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
    pub scale: Vector3<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            scale: Vector3::repeat(1.0),
        }
    }
}

impl Pose {
    pub fn uniform(position: Vector3<f64>, orientation: UnitQuaternion<f64>, scale: f64) -> Self {
        Self {
            position,
            orientation,
            scale: Vector3::repeat(scale),
        }
    }

    /// Applies this transform to a point in the object's local space.
    pub fn transform_point(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.position + self.orientation * local.component_mul(&self.scale)
    }

    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|c| c.is_finite())
            && self.scale.iter().all(|c| c.is_finite())
            && self.orientation.coords.iter().all(|c| c.is_finite())
    }
}

/// Fixed rotation aligning the authored ring asset with the hand basis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub axis: [f64; 3],
    pub degrees: f64,
}

impl Default for Correction {
    fn default() -> Self {
        // ring authored in its XY plane, finger through local Z
        Self {
            axis: [1.0, 0.0, 0.0],
            degrees: 90.0,
        }
    }
}

impl Correction {
    pub fn quaternion(&self) -> Result<UnitQuaternion<f64>, TryOnError> {
        let axis = Unit::try_new(Vector3::from(self.axis), 1e-9).ok_or_else(|| {
            TryOnError::InvalidConfig("correction axis must be non-zero".into())
        })?;
        Ok(UnitQuaternion::from_axis_angle(&axis, self.degrees.to_radians()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub scale_adjustment: f64,
    pub occluder_radius_factor: f64,
    pub occluder_length_factor: f64,
    /// Push into the finger along the palm normal, in finger widths.
    pub occluder_normal_offset: f64,
    pub relative_depth_gain: f64,
    pub correction: Correction,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            scale_adjustment: 1.0,
            occluder_radius_factor: 1.2,
            occluder_length_factor: 1.5,
            occluder_normal_offset: 0.0,
            relative_depth_gain: 0.0,
            correction: Correction::default(),
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), TryOnError> {
        for (name, value) in [
            ("scale_adjustment", self.scale_adjustment),
            ("occluder_radius_factor", self.occluder_radius_factor),
            ("occluder_length_factor", self.occluder_length_factor),
        ] {
            if !(value > 0.0) {
                return Err(TryOnError::InvalidConfig(format!("{} must be positive", name)));
            }
        }
        self.correction.quaternion().map(|_| ())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetPoses {
    pub ring: Pose,
    pub occluder: Pose,
    pub basis: HandBasis,
    pub depth: DepthEstimate,
    pub finger_width: f64,
}

pub struct PoseEstimator {
    config: EstimatorConfig,
    depth_mode: DepthMode,
    correction: UnitQuaternion<f64>,
}

impl PoseEstimator {
    pub fn new(config: EstimatorConfig, depth_mode: DepthMode) -> Result<Self, TryOnError> {
        config.validate()?;
        depth_mode.validate()?;
        let correction = config.correction.quaternion()?;
        Ok(Self {
            config,
            depth_mode,
            correction,
        })
    }

    pub fn depth_mode(&self) -> &DepthMode {
        &self.depth_mode
    }

    pub fn estimate(
        &self,
        frame: &LandmarkFrame,
        finger: &FingerDescriptor,
        camera: &CameraModel,
    ) -> Result<TargetPoses, TryOnError> {
        let depth = estimate_depth(frame, camera, &self.depth_mode)?;
        let gain = self.config.relative_depth_gain;
        let to_world = |p: &Vector3<f64>| map_to_world(p, camera, depth.depth, gain);

        let (pos_a, pos_b) = frame.pair(finger.position_landmarks)?;
        let (width_a, width_b) = frame.pair(finger.width_landmarks)?;
        let basis = solve_basis(frame, finger, camera.aspect)?;

        let anchor = to_world(&((pos_a + pos_b) * 0.5));
        let finger_width = (to_world(&width_a) - to_world(&width_b)).norm();
        let finger_length = (to_world(&pos_a) - to_world(&pos_b)).norm();

        let ring_scale = (finger_width * self.config.scale_adjustment).max(MIN_SCALE);
        let ring = Pose::uniform(anchor, basis.rotation() * self.correction, ring_scale);

        // the cylinder is symmetric about its local +Y, only the finger direction matters
        let occluder_orientation = UnitQuaternion::rotation_between(&Vector3::y(), &basis.finger_axis)
            .unwrap_or_else(|| UnitQuaternion::from_axis_angle(&Vector3::x_axis(), PI));
        let radius = (finger_width / 2.0 * self.config.occluder_radius_factor).max(MIN_SCALE);
        let length = (finger_length * self.config.occluder_length_factor).max(MIN_SCALE);
        let occluder = Pose {
            position: anchor - basis.normal_axis * (finger_width * self.config.occluder_normal_offset),
            orientation: occluder_orientation,
            scale: Vector3::new(radius, length, radius),
        };

        Ok(TargetPoses {
            ring,
            occluder,
            basis,
            depth,
            finger_width,
        })
    }
}
