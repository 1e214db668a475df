// src/tracking.rs - per-frame pipeline: detection -> target poses -> smoothed scene
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;
use tracing::{debug, warn};

use crate::camera::{CameraModel, DepthMode};
use crate::error::TryOnError;
use crate::landmarks::{Detection, FingerKind};
use crate::occlusion::RingScene;
use crate::pose::{EstimatorConfig, Pose, PoseEstimator};
use crate::smoothing::{validate_factor, PoseSmoother};

const METRICS_WINDOW: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub smoothing_factor: f64,
    pub occluder_smoothing_factor: f64,
    pub default_finger: FingerKind,
    /// Consecutive skipped frames before the failure is logged as a warning.
    pub missing_landmark_warn_after: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            smoothing_factor: 0.25,
            occluder_smoothing_factor: 0.25,
            default_finger: FingerKind::Ring,
            missing_landmark_warn_after: 30,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), TryOnError> {
        validate_factor("smoothing_factor", self.smoothing_factor)?;
        validate_factor("occluder_smoothing_factor", self.occluder_smoothing_factor)?;
        if self.missing_landmark_warn_after == 0 {
            return Err(TryOnError::InvalidConfig(
                "missing_landmark_warn_after must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PerformanceMetrics {
    /// Processed frames per second, from the spacing of recent frames.
    pub avg_fps: f32,
    /// Mean pipeline time per frame in seconds.
    pub avg_processing_time: f32,
    /// Share of recent frames with a hand in view.
    pub detection_rate: f32,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub depth_guard_hits: u64,
    frame_times: VecDeque<f32>,
    frame_starts: VecDeque<Instant>,
    detections: VecDeque<bool>,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            avg_fps: 0.0,
            avg_processing_time: 0.0,
            detection_rate: 0.0,
            frames_processed: 0,
            frames_skipped: 0,
            depth_guard_hits: 0,
            frame_times: VecDeque::with_capacity(METRICS_WINDOW),
            frame_starts: VecDeque::with_capacity(METRICS_WINDOW),
            detections: VecDeque::with_capacity(METRICS_WINDOW),
        }
    }

    fn record(&mut self, started: Instant, elapsed: f32, hand_present: bool) {
        self.frames_processed += 1;

        self.frame_times.push_front(elapsed);
        if self.frame_times.len() > METRICS_WINDOW {
            self.frame_times.pop_back();
        }
        self.frame_starts.push_front(started);
        if self.frame_starts.len() > METRICS_WINDOW {
            self.frame_starts.pop_back();
        }
        self.detections.push_front(hand_present);
        if self.detections.len() > METRICS_WINDOW {
            self.detections.pop_back();
        }

        self.avg_processing_time =
            self.frame_times.iter().sum::<f32>() / self.frame_times.len() as f32;
        self.avg_fps = match (self.frame_starts.front(), self.frame_starts.back()) {
            (Some(newest), Some(oldest)) if self.frame_starts.len() > 1 => {
                let span = newest.saturating_duration_since(*oldest).as_secs_f32();
                if span > 0.0 {
                    (self.frame_starts.len() - 1) as f32 / span
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };
        self.detection_rate = self.detections.iter().filter(|d| **d).count() as f32
            / self.detections.len() as f32;
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// What one processed frame did to the scene.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Hand found and both objects moved toward their new targets.
    Updated { ring: Pose, occluder: Pose },
    /// No hand: objects hidden, poses frozen.
    HandAbsent,
    /// Hand found but unusable this frame; previous poses kept.
    Skipped(String),
}

pub struct RingTracker {
    config: TrackerConfig,
    estimator: PoseEstimator,
    finger: FingerKind,
    ring: PoseSmoother,
    occluder: PoseSmoother,
    scene: RingScene,
    metrics: PerformanceMetrics,
    consecutive_skips: u32,
}

impl RingTracker {
    pub fn new(
        config: TrackerConfig,
        estimator_config: EstimatorConfig,
        depth_mode: DepthMode,
    ) -> Result<Self, TryOnError> {
        config.validate()?;
        let estimator = PoseEstimator::new(estimator_config, depth_mode)?;
        Ok(Self {
            finger: config.default_finger,
            ring: PoseSmoother::new(config.smoothing_factor),
            occluder: PoseSmoother::new(config.occluder_smoothing_factor),
            scene: RingScene::new(),
            metrics: PerformanceMetrics::new(),
            consecutive_skips: 0,
            estimator,
            config,
        })
    }

    pub fn finger(&self) -> FingerKind {
        self.finger
    }

    /// Switches the anchor finger; the smoothers carry the ring across.
    pub fn select_finger(&mut self, finger: FingerKind) {
        if finger != self.finger {
            debug!("Finger selection changed: {} -> {}", self.finger, finger);
            self.finger = finger;
        }
    }

    pub fn scene(&self) -> &RingScene {
        &self.scene
    }

    pub fn ring_pose(&self) -> Option<&Pose> {
        self.ring.current()
    }

    pub fn occluder_pose(&self) -> Option<&Pose> {
        self.occluder.current()
    }

    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.metrics
    }

    pub fn process(&mut self, detection: &Detection, camera: &CameraModel) -> FrameOutcome {
        let start = Instant::now();
        let outcome = self.process_inner(detection, camera);
        let hand_present = !matches!(outcome, FrameOutcome::HandAbsent);
        self.metrics.record(start, start.elapsed().as_secs_f32(), hand_present);
        outcome
    }

    fn process_inner(&mut self, detection: &Detection, camera: &CameraModel) -> FrameOutcome {
        let Some(frame) = detection.to_frame() else {
            self.scene.set_visible(false);
            self.consecutive_skips = 0;
            return FrameOutcome::HandAbsent;
        };

        let targets = match self.estimator.estimate(&frame, self.finger.descriptor(), camera) {
            Ok(targets) => targets,
            Err(e) => {
                self.note_skip(&e);
                return FrameOutcome::Skipped(e.to_string());
            }
        };
        self.consecutive_skips = 0;

        if targets.depth.guard_triggered {
            self.metrics.depth_guard_hits += 1;
            debug!("Depth reference landmarks coincide, using unit denominator");
        }

        let ring = self.ring.update(&targets.ring);
        let occluder = self.occluder.update(&targets.occluder);
        self.scene.apply(&ring, &occluder);
        self.scene.set_visible(true);

        FrameOutcome::Updated { ring, occluder }
    }

    fn note_skip(&mut self, error: &TryOnError) {
        self.metrics.frames_skipped += 1;
        self.consecutive_skips += 1;
        if self.consecutive_skips == self.config.missing_landmark_warn_after {
            warn!(
                "Pose skipped for {} consecutive frames: {}",
                self.consecutive_skips, error
            );
        } else {
            debug!("Pose skipped this frame: {}", error);
        }
    }
}
