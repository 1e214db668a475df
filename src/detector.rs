// src/detector.rs - hand landmark detector interface and the bundled stand-ins
use anyhow::{Context, Result};
use image::DynamicImage;
use std::path::Path;
use tracing::info;

use crate::landmarks::{Detection, Handedness, Point3D, HAND_LANDMARK_COUNT};

/// The landmark model. Returns at most one hand per frame.
pub trait HandDetector {
    fn name(&self) -> String;
    fn detect(&mut self, frame: &DynamicImage, timestamp_ms: u64) -> Result<Detection>;
}

impl<T: HandDetector + ?Sized> HandDetector for Box<T> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn detect(&mut self, frame: &DynamicImage, timestamp_ms: u64) -> Result<Detection> {
        (**self).detect(frame, timestamp_ms)
    }
}

/// Plays back recorded detections, one JSON object per line, looping at the end.
pub struct ReplayDetector {
    detections: Vec<Detection>,
    cursor: usize,
}

impl ReplayDetector {
    pub fn from_detections(detections: Vec<Detection>) -> Result<Self> {
        if detections.is_empty() {
            anyhow::bail!("replay contains no detections");
        }
        Ok(Self { detections, cursor: 0 })
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut detections = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let detection: Detection = serde_json::from_str(line)
                .with_context(|| format!("invalid detection on line {}", line_no + 1))?;
            detections.push(detection);
        }
        Self::from_detections(detections)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read replay file {}", path.display()))?;
        let detector = Self::parse(&content)?;
        info!("Loaded {} recorded detections from {}", detector.len(), path.display());
        Ok(detector)
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

impl HandDetector for ReplayDetector {
    fn name(&self) -> String {
        format!("Replay ({} frames)", self.detections.len())
    }

    fn detect(&mut self, _frame: &DynamicImage, _timestamp_ms: u64) -> Result<Detection> {
        let detection = self.detections[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.detections.len();
        Ok(detection)
    }
}

// Upright open right hand, palm toward the camera, in normalized image coordinates.
static OPEN_HAND: [Point3D; HAND_LANDMARK_COUNT] = [
    Point3D::new(0.50, 0.85, 0.0),    // wrist
    Point3D::new(0.58, 0.80, -0.02),  // thumb
    Point3D::new(0.64, 0.72, -0.03),
    Point3D::new(0.68, 0.65, -0.04),
    Point3D::new(0.71, 0.59, -0.05),
    Point3D::new(0.56, 0.58, -0.01),  // index
    Point3D::new(0.57, 0.48, -0.02),
    Point3D::new(0.57, 0.42, -0.03),
    Point3D::new(0.57, 0.37, -0.03),
    Point3D::new(0.50, 0.57, -0.01),  // middle
    Point3D::new(0.50, 0.46, -0.02),
    Point3D::new(0.50, 0.40, -0.03),
    Point3D::new(0.50, 0.34, -0.03),
    Point3D::new(0.44, 0.59, -0.01),  // ring
    Point3D::new(0.43, 0.49, -0.02),
    Point3D::new(0.43, 0.43, -0.03),
    Point3D::new(0.43, 0.38, -0.03),
    Point3D::new(0.39, 0.63, -0.01),  // pinky
    Point3D::new(0.37, 0.55, -0.02),
    Point3D::new(0.36, 0.50, -0.02),
    Point3D::new(0.35, 0.46, -0.03),
];

/// Synthetic hand drifting in a slow circle, dropping out for part of every cycle.
pub struct SimulatedDetector {
    frame_count: u64,
    cycle_frames: u64,
    absent_frames: u64,
}

impl SimulatedDetector {
    pub fn new() -> Self {
        Self {
            frame_count: 0,
            cycle_frames: 180,
            absent_frames: 20,
        }
    }

    fn hand_at(&self, t: f64) -> Vec<Point3D> {
        let dx = 0.12 * (t * 0.05).cos();
        let dy = 0.06 * (t * 0.05).sin();
        // slight tilt toward and away from the camera
        let dz = 0.02 * (t * 0.03).sin();

        OPEN_HAND
            .iter()
            .map(|p| {
                let lift = (0.85 - p.y) * dz;
                Point3D::new(p.x + dx, p.y + dy, p.z + lift)
            })
            .collect()
    }
}

impl Default for SimulatedDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl HandDetector for SimulatedDetector {
    fn name(&self) -> String {
        "Simulated hand".to_string()
    }

    fn detect(&mut self, _frame: &DynamicImage, _timestamp_ms: u64) -> Result<Detection> {
        let t = self.frame_count as f64;
        self.frame_count += 1;

        if self.frame_count % self.cycle_frames >= self.cycle_frames - self.absent_frames {
            return Ok(Detection::absent());
        }
        Ok(Detection::hand(self.hand_at(t), Handedness::Right))
    }
}
