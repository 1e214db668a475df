// src/scheduler.rs - session lifecycle and the throttled per-frame loop
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, warn, Span};
use uuid::Uuid;

use crate::camera::CameraModel;
use crate::detector::HandDetector;
use crate::error::{InitStage, TryOnError};
use crate::landmarks::FingerKind;
use crate::render::Renderer;
use crate::tracking::{FrameOutcome, RingTracker};
use crate::video::FrameSource;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on processed frames per second.
    pub target_fps: f64,
    /// Rate at which `run` polls `tick`.
    pub display_hz: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            target_fps: 30.0,
            display_hz: 60.0,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), TryOnError> {
        if !(self.target_fps.is_finite() && self.target_fps > 0.0) {
            return Err(TryOnError::InvalidConfig(format!(
                "target_fps must be positive, got {}",
                self.target_fps
            )));
        }
        if !(self.display_hz.is_finite() && self.display_hz > 0.0) {
            return Err(TryOnError::InvalidConfig(format!(
                "display_hz must be positive, got {}",
                self.display_hz
            )));
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerState {
    Uninitialized,
    Initializing,
    Running,
    Paused,
    Stopped,
    Failed(String),
}

/// Shared stop flag. Cloning shares the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Stopped,
    NotRunning,
    Throttled,
    Processed { hand_visible: bool },
    /// The frame was dropped; the session keeps running.
    FrameError(String),
}

pub struct FrameScheduler<D, R, S>
where
    D: HandDetector,
    R: Renderer,
    S: FrameSource,
{
    state: SchedulerState,
    config: SchedulerConfig,
    camera: CameraModel,
    tracker: RingTracker,
    detector: Option<D>,
    renderer: Option<R>,
    source: Option<S>,
    cancel: CancelHandle,
    session_id: Uuid,
    span: Span,
    started_at: Option<Instant>,
    last_processed: Option<Instant>,
    released: bool,
}

impl<D, R, S> FrameScheduler<D, R, S>
where
    D: HandDetector,
    R: Renderer,
    S: FrameSource,
{
    pub fn new(
        config: SchedulerConfig,
        camera: CameraModel,
        tracker: RingTracker,
    ) -> Result<Self, TryOnError> {
        config.validate()?;
        camera.validate()?;
        let session_id = Uuid::new_v4();
        Ok(Self {
            state: SchedulerState::Uninitialized,
            config,
            camera,
            tracker,
            detector: None,
            renderer: None,
            source: None,
            cancel: CancelHandle::new(),
            span: info_span!("session", id = %session_id),
            session_id,
            started_at: None,
            last_processed: None,
            released: false,
        })
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }

    pub fn tracker(&self) -> &RingTracker {
        &self.tracker
    }

    pub fn renderer(&self) -> Option<&R> {
        self.renderer.as_ref()
    }

    /// Runs the three start-up stages in order.
    ///
    /// The stop flag is checked after every stage; a stop that arrives mid-way
    /// releases whatever was already acquired and leaves the scheduler `Stopped`.
    /// A failing stage leaves it `Failed` with nothing half-built kept around.
    pub async fn initialize<FD, FR, FS>(
        &mut self,
        detector_loader: FD,
        renderer_loader: FR,
        source_loader: FS,
    ) -> Result<(), TryOnError>
    where
        FD: Future<Output = anyhow::Result<D>>,
        FR: Future<Output = anyhow::Result<R>>,
        FS: Future<Output = anyhow::Result<S>>,
    {
        if self.state != SchedulerState::Uninitialized {
            warn!(session = %self.session_id, "Initialize called in state {:?}, ignoring", self.state);
            return Ok(());
        }
        self.state = SchedulerState::Initializing;
        info!(session = %self.session_id, "Initializing try-on session");

        let detector = detector_loader.await;
        if self.cancel.is_cancelled() {
            return Err(self.cancelled(InitStage::DetectorLoad));
        }
        let detector = self.stage_result(InitStage::DetectorLoad, detector)?;
        info!(session = %self.session_id, "Hand detector ready: {}", detector.name());
        self.detector = Some(detector);

        let renderer = renderer_loader.await;
        if self.cancel.is_cancelled() {
            if let Ok(mut renderer) = renderer {
                renderer.dispose();
            }
            return Err(self.cancelled(InitStage::RendererSetup));
        }
        self.renderer = Some(self.stage_result(InitStage::RendererSetup, renderer)?);
        debug!(session = %self.session_id, "Renderer ready");

        let source = source_loader.await;
        if self.cancel.is_cancelled() {
            if let Ok(mut source) = source {
                source.release();
            }
            return Err(self.cancelled(InitStage::CameraStream));
        }
        let source = self.stage_result(InitStage::CameraStream, source)?;
        let (width, height) = source.resolution();
        self.camera.set_resolution(width, height);
        self.source = Some(source);

        self.started_at = Some(Instant::now());
        self.state = SchedulerState::Running;
        info!(session = %self.session_id, "Session running at {}x{}", width, height);
        Ok(())
    }

    /// Releases what earlier stages acquired and ends in `Stopped`.
    fn cancelled(&mut self, stage: InitStage) -> TryOnError {
        info!(session = %self.session_id, "Stopped while {}", stage);
        self.release_resources();
        self.state = SchedulerState::Stopped;
        TryOnError::Cancelled { stage }
    }

    fn stage_result<T>(&mut self, stage: InitStage, result: anyhow::Result<T>) -> Result<T, TryOnError> {
        result.map_err(|e| {
            let err = TryOnError::initialization(stage, e);
            error!(session = %self.session_id, "{}", err);
            self.release_resources();
            self.state = SchedulerState::Failed(err.to_string());
            err
        })
    }

    /// One scheduling step. Never fails: per-frame problems are logged and the
    /// frame is dropped.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        let span = self.span.clone();
        let _guard = span.enter();

        if self.cancel.is_cancelled() {
            self.stop();
        }
        match self.state {
            SchedulerState::Running => {}
            SchedulerState::Stopped => return TickOutcome::Stopped,
            _ => return TickOutcome::NotRunning,
        }

        if let Some(last) = self.last_processed {
            if now.saturating_duration_since(last) < self.config.frame_interval() {
                return TickOutcome::Throttled;
            }
        }
        self.last_processed = Some(now);

        let (Some(detector), Some(renderer), Some(source)) = (
            self.detector.as_mut(),
            self.renderer.as_mut(),
            self.source.as_mut(),
        ) else {
            return TickOutcome::NotRunning;
        };

        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Frame capture failed: {:#}", e);
                return TickOutcome::FrameError(e.to_string());
            }
        };

        let timestamp_ms = self
            .started_at
            .map(|start| now.saturating_duration_since(start).as_millis() as u64)
            .unwrap_or(0);
        let detection = match detector.detect(&frame, timestamp_ms) {
            Ok(detection) => detection,
            Err(e) => {
                warn!("Hand detection failed: {:#}", e);
                return TickOutcome::FrameError(e.to_string());
            }
        };

        if let FrameOutcome::Skipped(reason) = self.tracker.process(&detection, &self.camera) {
            debug!("Frame {} kept previous pose: {}", timestamp_ms, reason);
        }

        if let Err(e) = renderer.render(self.tracker.scene(), &self.camera, &frame) {
            warn!("Render failed: {:#}", e);
            return TickOutcome::FrameError(e.to_string());
        }

        TickOutcome::Processed {
            hand_visible: self.tracker.scene().is_visible(),
        }
    }

    /// Polls `tick` at the display rate until the session stops. With
    /// `max_frames` set it returns once that many frames went through; the
    /// session is left running for the caller to inspect and stop.
    pub async fn run(&mut self, max_frames: Option<u64>) {
        if !matches!(self.state, SchedulerState::Running | SchedulerState::Paused) {
            warn!(session = %self.session_id, "Run called in state {:?}", self.state);
            return;
        }

        let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / self.config.display_hz));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut processed = 0u64;

        loop {
            let now = interval.tick().await.into_std();
            match self.tick(now) {
                TickOutcome::Stopped => break,
                TickOutcome::Processed { .. } | TickOutcome::FrameError(_) => {
                    processed += 1;
                    if max_frames.is_some_and(|max| processed >= max) {
                        info!(session = %self.session_id, "Frame limit of {} reached", processed);
                        break;
                    }
                }
                TickOutcome::NotRunning | TickOutcome::Throttled => {}
            }
            if matches!(self.state, SchedulerState::Failed(_)) {
                break;
            }
        }
    }

    pub fn pause(&mut self) {
        if self.state == SchedulerState::Running {
            self.state = SchedulerState::Paused;
            info!(session = %self.session_id, "Session paused");
        }
    }

    pub fn resume(&mut self) {
        if self.state == SchedulerState::Paused {
            self.state = SchedulerState::Running;
            info!(session = %self.session_id, "Session resumed");
        }
    }

    pub fn select_finger(&mut self, finger: FingerKind) {
        self.tracker.select_finger(finger);
    }

    /// Releases the camera stream and renderer. Only the first call does anything.
    pub fn stop(&mut self) {
        if self.released {
            return;
        }
        self.cancel.cancel();
        self.release_resources();
        if !matches!(self.state, SchedulerState::Failed(_)) {
            self.state = SchedulerState::Stopped;
        }

        let metrics = self.tracker.metrics();
        info!(
            session = %self.session_id,
            "Session stopped after {} frames ({} skipped, detection rate {:.0}%)",
            metrics.frames_processed,
            metrics.frames_skipped,
            metrics.detection_rate * 100.0
        );
    }

    fn release_resources(&mut self) {
        self.released = true;
        if let Some(mut source) = self.source.take() {
            source.release();
        }
        if let Some(mut renderer) = self.renderer.take() {
            renderer.dispose();
        }
        self.detector = None;
    }
}

impl<D, R, S> Drop for FrameScheduler<D, R, S>
where
    D: HandDetector,
    R: Renderer,
    S: FrameSource,
{
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::DepthMode;
    use crate::detector::SimulatedDetector;
    use crate::landmarks::Detection;
    use crate::occlusion::RingScene;
    use crate::pose::EstimatorConfig;
    use crate::tracking::TrackerConfig;
    use crate::video::SyntheticSource;
    use image::DynamicImage;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default, Clone)]
    struct Counters {
        renders: Arc<AtomicUsize>,
        disposes: Arc<AtomicUsize>,
        releases: Arc<AtomicUsize>,
    }

    struct CountingRenderer(Counters);

    impl Renderer for CountingRenderer {
        fn render(&mut self, _: &RingScene, _: &CameraModel, _: &DynamicImage) -> anyhow::Result<()> {
            self.0.renders.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn dispose(&mut self) {
            self.0.disposes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CountingSource {
        inner: SyntheticSource,
        counters: Counters,
    }

    impl FrameSource for CountingSource {
        fn next_frame(&mut self) -> anyhow::Result<DynamicImage> {
            self.inner.next_frame()
        }

        fn resolution(&self) -> (u32, u32) {
            self.inner.resolution()
        }

        fn release(&mut self) {
            self.counters.releases.fetch_add(1, Ordering::SeqCst);
            self.inner.release();
        }
    }

    struct FailingDetector;

    impl HandDetector for FailingDetector {
        fn name(&self) -> String {
            "failing".to_string()
        }

        fn detect(&mut self, _: &DynamicImage, _: u64) -> anyhow::Result<Detection> {
            anyhow::bail!("inference crashed")
        }
    }

    type TestScheduler<D> = FrameScheduler<D, CountingRenderer, CountingSource>;

    fn scheduler<D: HandDetector>() -> TestScheduler<D> {
        let tracker = RingTracker::new(
            TrackerConfig::default(),
            EstimatorConfig::default(),
            DepthMode::default(),
        )
        .unwrap();
        FrameScheduler::new(SchedulerConfig::default(), CameraModel::default(), tracker).unwrap()
    }

    async fn running<D: HandDetector>(detector: D, counters: &Counters) -> TestScheduler<D> {
        let mut scheduler = scheduler();
        let renderer = CountingRenderer(counters.clone());
        let source = CountingSource {
            inner: SyntheticSource::new(320, 180),
            counters: counters.clone(),
        };
        scheduler
            .initialize(
                async move { anyhow::Ok(detector) },
                async move { anyhow::Ok(renderer) },
                async move { anyhow::Ok(source) },
            )
            .await
            .unwrap();
        scheduler
    }

    #[tokio::test]
    async fn initialization_reaches_running_and_adopts_resolution() {
        let counters = Counters::default();
        let scheduler = running(SimulatedDetector::new(), &counters).await;
        assert_eq!(*scheduler.state(), SchedulerState::Running);
        assert_eq!(scheduler.camera().frame_width, 320);
        assert_eq!(scheduler.camera().frame_height, 180);
    }

    #[tokio::test]
    async fn ticks_are_throttled_to_target_fps() {
        let counters = Counters::default();
        let mut scheduler = running(SimulatedDetector::new(), &counters).await;
        let start = Instant::now();
        let processed = (0..100)
            .map(|ms| scheduler.tick(start + Duration::from_millis(ms)))
            .filter(|o| matches!(o, TickOutcome::Processed { .. }))
            .count();
        assert!(processed >= 3 && processed <= 4, "processed {}", processed);
        assert_eq!(counters.renders.load(Ordering::SeqCst), processed);
    }

    #[tokio::test]
    async fn failing_stage_leaves_scheduler_failed() {
        let counters = Counters::default();
        let mut scheduler: TestScheduler<SimulatedDetector> = scheduler();
        let renderer = CountingRenderer(counters.clone());
        let err = scheduler
            .initialize(
                async { anyhow::Ok(SimulatedDetector::new()) },
                async move { anyhow::Ok(renderer) },
                async { Err::<CountingSource, _>(anyhow::anyhow!("camera permission denied")) },
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TryOnError::Initialization { stage: InitStage::CameraStream, .. }
        ));
        assert!(matches!(scheduler.state(), SchedulerState::Failed(_)));
        // renderer from the earlier stage is not kept
        assert_eq!(counters.disposes.load(Ordering::SeqCst), 1);
        assert!(scheduler.renderer().is_none());
        assert_eq!(scheduler.tick(Instant::now()), TickOutcome::NotRunning);
    }

    #[tokio::test]
    async fn stop_during_initialization_releases_and_stops() {
        let counters = Counters::default();
        let mut scheduler: TestScheduler<SimulatedDetector> = scheduler();
        let cancel = scheduler.cancel_handle();
        let renderer = CountingRenderer(counters.clone());
        let source = CountingSource {
            inner: SyntheticSource::new(64, 36),
            counters: counters.clone(),
        };

        let err = scheduler
            .initialize(
                async { anyhow::Ok(SimulatedDetector::new()) },
                async move {
                    cancel.cancel();
                    anyhow::Ok(renderer)
                },
                async move { anyhow::Ok(source) },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TryOnError::Cancelled { stage: InitStage::RendererSetup }));
        assert_eq!(*scheduler.state(), SchedulerState::Stopped);
        assert!(scheduler.renderer().is_none());
        // the renderer handed back by the cancelled stage is disposed, not just dropped
        assert_eq!(counters.disposes.load(Ordering::SeqCst), 1);
        assert_eq!(counters.renders.load(Ordering::SeqCst), 0);
        assert_eq!(counters.releases.load(Ordering::SeqCst), 0);

        drop(scheduler);
        assert_eq!(counters.disposes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_while_opening_camera_releases_the_stream() {
        let counters = Counters::default();
        let mut scheduler: TestScheduler<SimulatedDetector> = scheduler();
        let cancel = scheduler.cancel_handle();
        let renderer = CountingRenderer(counters.clone());
        let source = CountingSource {
            inner: SyntheticSource::new(64, 36),
            counters: counters.clone(),
        };

        let err = scheduler
            .initialize(
                async { anyhow::Ok(SimulatedDetector::new()) },
                async move { anyhow::Ok(renderer) },
                async move {
                    cancel.cancel();
                    anyhow::Ok(source)
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TryOnError::Cancelled { stage: InitStage::CameraStream }));
        assert_eq!(*scheduler.state(), SchedulerState::Stopped);
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
        assert_eq!(counters.disposes.load(Ordering::SeqCst), 1);

        drop(scheduler);
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
        assert_eq!(counters.disposes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_releases_exactly_once() {
        let counters = Counters::default();
        let mut scheduler = running(SimulatedDetector::new(), &counters).await;
        scheduler.stop();
        scheduler.stop();
        assert_eq!(*scheduler.state(), SchedulerState::Stopped);
        assert_eq!(scheduler.tick(Instant::now()), TickOutcome::Stopped);
        drop(scheduler);
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
        assert_eq!(counters.disposes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drop_releases_a_running_session() {
        let counters = Counters::default();
        let scheduler = running(SimulatedDetector::new(), &counters).await;
        drop(scheduler);
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_flag_stops_on_next_tick() {
        let counters = Counters::default();
        let mut scheduler = running(SimulatedDetector::new(), &counters).await;
        scheduler.cancel_handle().cancel();
        assert_eq!(scheduler.tick(Instant::now()), TickOutcome::Stopped);
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn detector_errors_are_contained() {
        let counters = Counters::default();
        let mut scheduler = running(FailingDetector, &counters).await;
        let start = Instant::now();
        assert!(matches!(scheduler.tick(start), TickOutcome::FrameError(_)));
        assert!(matches!(
            scheduler.tick(start + Duration::from_millis(50)),
            TickOutcome::FrameError(_)
        ));
        assert_eq!(*scheduler.state(), SchedulerState::Running);
    }

    #[tokio::test]
    async fn paused_session_skips_frames() {
        let counters = Counters::default();
        let mut scheduler = running(SimulatedDetector::new(), &counters).await;
        scheduler.pause();
        assert_eq!(scheduler.tick(Instant::now()), TickOutcome::NotRunning);
        scheduler.resume();
        assert!(matches!(scheduler.tick(Instant::now()), TickOutcome::Processed { .. }));
    }

    #[tokio::test]
    async fn run_returns_after_frame_limit() {
        let counters = Counters::default();
        let mut scheduler = running(SimulatedDetector::new(), &counters).await;
        scheduler.run(Some(3)).await;
        assert_eq!(*scheduler.state(), SchedulerState::Running);
        assert_eq!(counters.renders.load(Ordering::SeqCst), 3);
        assert!(scheduler.tracker().metrics().frames_processed >= 3);
    }

    #[tokio::test]
    async fn run_ends_when_cancelled() {
        let counters = Counters::default();
        let mut scheduler = running(SimulatedDetector::new(), &counters).await;
        let cancel = scheduler.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });
        scheduler.run(None).await;
        assert_eq!(*scheduler.state(), SchedulerState::Stopped);
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_target_fps_is_rejected() {
        let config = SchedulerConfig {
            target_fps: 0.0,
            ..SchedulerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
