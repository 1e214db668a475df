// src/lib.rs
//! Turns per-frame hand landmarks into a smoothed ring pose and a finger
//! occluder, ready to be composited over the camera image.

pub mod basis;
pub mod camera;
pub mod config;
pub mod detector;
pub mod error;
pub mod landmarks;
pub mod materials;
pub mod occlusion;
pub mod pose;
pub mod render;
pub mod scheduler;
pub mod smoothing;
pub mod tracking;
pub mod video;

pub use camera::{CameraModel, DepthMode};
pub use config::TryOnConfig;
pub use detector::{HandDetector, ReplayDetector, SimulatedDetector};
pub use error::{InitStage, TryOnError};
pub use landmarks::{Detection, FingerKind, Handedness, LandmarkFrame, Point3D};
pub use occlusion::RingScene;
pub use pose::{EstimatorConfig, Pose, PoseEstimator};
pub use render::{OverlayRenderer, Renderer};
pub use scheduler::{CancelHandle, FrameScheduler, SchedulerConfig, SchedulerState, TickOutcome};
pub use tracking::{FrameOutcome, RingTracker, TrackerConfig};
pub use video::{CameraSettings, CameraSource, FrameSource, SyntheticSource};
