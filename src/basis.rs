// src/basis.rs - orthonormal hand frame anchored on the selected finger
use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

use crate::error::TryOnError;
use crate::landmarks::{FingerDescriptor, Handedness, LandmarkFrame, INDEX_MCP, PINKY_MCP, WRIST};

// below this the cross products carry no usable direction
const MIN_AXIS_NORM: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandBasis {
    /// Along the finger, base toward tip.
    pub finger_axis: Vector3<f64>,
    pub side_axis: Vector3<f64>,
    /// Palm normal made exactly orthogonal to the finger axis.
    pub normal_axis: Vector3<f64>,
    /// Palm normal as measured from the knuckle triangle, after mirroring.
    pub palm_normal: Vector3<f64>,
}

impl HandBasis {
    /// Rotation whose columns are (side, finger, normal).
    pub fn rotation(&self) -> UnitQuaternion<f64> {
        let m = Matrix3::from_columns(&[self.side_axis, self.finger_axis, self.normal_axis]);
        UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(m))
    }
}

/// Lifts a normalized landmark into camera-aligned axes: x and z rescaled to the
/// image height unit, y and z flipped so the frame is right-handed with +Y up and
/// +Z toward the viewer.
pub fn to_camera_axes(p: &Vector3<f64>, aspect: f64) -> Vector3<f64> {
    Vector3::new(p.x * aspect, -p.y, -p.z * aspect)
}

fn unit(v: Vector3<f64>, what: &'static str) -> Result<Vector3<f64>, TryOnError> {
    v.try_normalize(MIN_AXIS_NORM)
        .ok_or(TryOnError::DegenerateBasis(what))
}

pub fn solve_basis(
    frame: &LandmarkFrame,
    finger: &FingerDescriptor,
    aspect: f64,
) -> Result<HandBasis, TryOnError> {
    let lift = |index: usize| frame.get(index).map(|p| to_camera_axes(&p, aspect));

    let (base, mid) = finger.position_landmarks;
    let base = lift(base)?;
    let mid = lift(mid)?;
    let wrist = lift(WRIST)?;
    let index_mcp = lift(INDEX_MCP)?;
    let pinky_mcp = lift(PINKY_MCP)?;

    let finger_axis = unit(mid - base, "finger joints coincide")?;

    // the knuckle triangle winds the other way on a left hand
    let mirror = match frame.handedness() {
        Handedness::Left => -1.0,
        Handedness::Right => 1.0,
    };

    let from_palm = ((index_mcp - wrist).cross(&(pinky_mcp - wrist)) * mirror)
        .try_normalize(MIN_AXIS_NORM)
        .and_then(|palm_normal| {
            finger_axis
                .cross(&palm_normal)
                .try_normalize(MIN_AXIS_NORM)
                .map(|side| (side, palm_normal))
        });

    let (side_axis, palm_normal) = match from_palm {
        Some(axes) => axes,
        None => {
            // edge-on or partial palm: the width pair runs across the finger
            let (width_a, width_b) = finger.width_landmarks;
            let across = (lift(width_b)? - lift(width_a)?) * mirror;
            let side = unit(
                across - finger_axis * across.dot(&finger_axis),
                "palm and width landmarks give no side direction",
            )?;
            (side, side.cross(&finger_axis))
        }
    };
    let normal_axis = side_axis.cross(&finger_axis);

    Ok(HandBasis {
        finger_axis,
        side_axis,
        normal_axis,
        palm_normal,
    })
}
