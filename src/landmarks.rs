// src/landmarks.rs - detector output and the per-frame landmark contract
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TryOnError;

// MediaPipe hand landmark indices
pub const WRIST: usize = 0;
pub const THUMB_CMC: usize = 1;
pub const THUMB_MCP: usize = 2;
pub const THUMB_IP: usize = 3;
pub const THUMB_TIP: usize = 4;
pub const INDEX_MCP: usize = 5;
pub const INDEX_PIP: usize = 6;
pub const INDEX_DIP: usize = 7;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_DIP: usize = 11;
pub const MIDDLE_TIP: usize = 12;
pub const RING_MCP: usize = 13;
pub const RING_PIP: usize = 14;
pub const RING_DIP: usize = 15;
pub const RING_TIP: usize = 16;
pub const PINKY_MCP: usize = 17;
pub const PINKY_PIP: usize = 18;
pub const PINKY_DIP: usize = 19;
pub const PINKY_TIP: usize = 20;

pub const HAND_LANDMARK_COUNT: usize = 21;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3D {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Point3D {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl From<Point3D> for Vector3<f64> {
    fn from(p: Point3D) -> Self {
        Vector3::new(p.x, p.y, p.z)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandednessCategory {
    pub category: Handedness,
    #[serde(default)]
    pub confidence: f64,
}

/// Raw detector output for one video frame. An empty landmark list means no hand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub landmarks: Vec<Point3D>,
    #[serde(default)]
    pub handedness: Vec<HandednessCategory>,
}

impl Detection {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn hand(landmarks: Vec<Point3D>, handedness: Handedness) -> Self {
        Self {
            landmarks,
            handedness: vec![HandednessCategory {
                category: handedness,
                confidence: 1.0,
            }],
        }
    }

    pub fn is_hand_present(&self) -> bool {
        !self.landmarks.is_empty()
    }

    /// Converts into the pipeline's frame type; `None` when no hand was detected.
    pub fn to_frame(&self) -> Option<LandmarkFrame> {
        if !self.is_hand_present() {
            return None;
        }
        // the detector always labels a found hand; fall back to Right if it didn't
        let handedness = self
            .handedness
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            .map(|c| c.category)
            .unwrap_or(Handedness::Right);

        Some(LandmarkFrame {
            landmarks: self.landmarks.iter().map(|&p| p.into()).collect(),
            handedness,
        })
    }
}

/// One hand's landmarks in normalized image coordinates with relative depth.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkFrame {
    landmarks: Vec<Vector3<f64>>,
    handedness: Handedness,
}

impl LandmarkFrame {
    pub fn new(landmarks: Vec<Vector3<f64>>, handedness: Handedness) -> Self {
        Self { landmarks, handedness }
    }

    pub fn handedness(&self) -> Handedness {
        self.handedness
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<Vector3<f64>, TryOnError> {
        self.landmarks
            .get(index)
            .copied()
            .ok_or(TryOnError::MissingLandmark {
                index,
                available: self.landmarks.len(),
            })
    }

    pub fn pair(&self, (a, b): (usize, usize)) -> Result<(Vector3<f64>, Vector3<f64>), TryOnError> {
        Ok((self.get(a)?, self.get(b)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerKind {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl FingerKind {
    pub const ALL: [FingerKind; 5] = [
        FingerKind::Thumb,
        FingerKind::Index,
        FingerKind::Middle,
        FingerKind::Ring,
        FingerKind::Pinky,
    ];

    pub fn descriptor(self) -> &'static FingerDescriptor {
        &FINGERS[self as usize]
    }
}

impl fmt::Display for FingerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FingerKind::Thumb => "thumb",
            FingerKind::Index => "index",
            FingerKind::Middle => "middle",
            FingerKind::Ring => "ring",
            FingerKind::Pinky => "pinky",
        };
        f.write_str(name)
    }
}

impl FromStr for FingerKind {
    type Err = TryOnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "thumb" => Ok(FingerKind::Thumb),
            "index" => Ok(FingerKind::Index),
            "middle" => Ok(FingerKind::Middle),
            "ring" => Ok(FingerKind::Ring),
            "pinky" | "little" => Ok(FingerKind::Pinky),
            other => Err(TryOnError::InvalidConfig(format!("unknown finger '{}'", other))),
        }
    }
}

/// Landmark pairs that anchor and size the ring on one finger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerDescriptor {
    pub kind: FingerKind,
    /// Base and middle joint; the ring sits on their midpoint.
    pub position_landmarks: (usize, usize),
    /// Distance between these approximates the finger width.
    pub width_landmarks: (usize, usize),
}

// indexed by `FingerKind as usize`
pub static FINGERS: [FingerDescriptor; 5] = [
    FingerDescriptor {
        kind: FingerKind::Thumb,
        position_landmarks: (THUMB_MCP, THUMB_IP),
        width_landmarks: (THUMB_MCP, THUMB_IP),
    },
    FingerDescriptor {
        kind: FingerKind::Index,
        position_landmarks: (INDEX_MCP, INDEX_PIP),
        width_landmarks: (INDEX_MCP, MIDDLE_MCP),
    },
    FingerDescriptor {
        kind: FingerKind::Middle,
        position_landmarks: (MIDDLE_MCP, MIDDLE_PIP),
        width_landmarks: (MIDDLE_MCP, INDEX_MCP),
    },
    FingerDescriptor {
        kind: FingerKind::Ring,
        position_landmarks: (RING_MCP, RING_PIP),
        width_landmarks: (RING_MCP, MIDDLE_MCP),
    },
    FingerDescriptor {
        kind: FingerKind::Pinky,
        position_landmarks: (PINKY_MCP, PINKY_PIP),
        width_landmarks: (PINKY_MCP, RING_MCP),
    },
];
