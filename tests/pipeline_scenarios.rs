// tests/pipeline_scenarios.rs - whole-pipeline behaviour on scripted hands
use approx::assert_relative_eq;
use nalgebra::Vector3;
use std::time::{Duration, Instant};

use ring_tryon::basis::solve_basis;
use ring_tryon::camera::estimate_depth;
use ring_tryon::landmarks::{
    INDEX_MCP, MIDDLE_MCP, PINKY_MCP, RING_MCP, RING_PIP, WRIST,
};
use ring_tryon::smoothing::smooth;
use ring_tryon::{
    CameraModel, DepthMode, Detection, EstimatorConfig, FingerKind, FrameOutcome, FrameScheduler,
    Handedness, LandmarkFrame, OverlayRenderer, Point3D, PoseEstimator, ReplayDetector,
    RingTracker, SchedulerConfig, SchedulerState, SyntheticSource, TickOutcome, TrackerConfig,
};

fn scenario_points() -> Vec<Point3D> {
    let mut points = vec![Point3D::new(0.5, 0.5, 0.0); 21];
    points[WRIST] = Point3D::new(0.5, 0.9, 0.0);
    points[INDEX_MCP] = Point3D::new(0.57, 0.62, 0.0);
    points[MIDDLE_MCP] = Point3D::new(0.5, 0.6, 0.0);
    points[RING_MCP] = Point3D::new(0.45, 0.5, 0.0);
    points[RING_PIP] = Point3D::new(0.45, 0.4, 0.0);
    points[PINKY_MCP] = Point3D::new(0.4, 0.64, 0.0);
    points
}

fn scenario_detection() -> Detection {
    Detection::hand(scenario_points(), Handedness::Right)
}

fn as_frame(points: &[Point3D], handedness: Handedness) -> LandmarkFrame {
    LandmarkFrame::new(points.iter().map(|p| Vector3::from(*p)).collect(), handedness)
}

fn tracker() -> RingTracker {
    RingTracker::new(
        TrackerConfig::default(),
        EstimatorConfig::default(),
        DepthMode::Fixed { depth: 5.0 },
    )
    .unwrap()
}

#[test]
fn ring_lands_on_ring_finger_in_front_of_camera() {
    let camera = CameraModel::default();
    let mut tracker = tracker();

    let FrameOutcome::Updated { ring, occluder } = tracker.process(&scenario_detection(), &camera)
    else {
        panic!("expected the ring to be placed");
    };

    assert_relative_eq!(ring.position.z, -5.0, epsilon = 1e-9);
    assert!(ring.position.y > 0.0, "ring above the image centre, got {}", ring.position.y);
    assert!(ring.position.x < 0.0);
    assert!(ring.scale.x > 0.0);
    assert!(ring.is_finite() && occluder.is_finite());
    assert!(tracker.scene().is_visible());
    assert_eq!(tracker.scene().draw_list().len(), 2);
}

#[test]
fn resting_hand_keeps_pose_bit_identical() {
    let camera = CameraModel::default();
    let mut tracker = tracker();
    tracker.process(&scenario_detection(), &camera);
    let first = *tracker.ring_pose().unwrap();
    for _ in 0..10 {
        tracker.process(&scenario_detection(), &camera);
    }
    assert_eq!(*tracker.ring_pose().unwrap(), first);

    assert_eq!(smooth(&first, &first, 0.3), first);
}

#[test]
fn hand_loss_and_return() {
    let camera = CameraModel::default();
    let mut tracker = tracker();

    tracker.process(&scenario_detection(), &camera);
    tracker.process(&scenario_detection(), &camera);
    let frozen = *tracker.ring_pose().unwrap();
    assert!(tracker.scene().is_visible());

    assert_eq!(tracker.process(&Detection::absent(), &camera), FrameOutcome::HandAbsent);
    assert!(!tracker.scene().is_visible());
    assert_eq!(*tracker.ring_pose().unwrap(), frozen);

    // the hand comes back somewhere else
    let moved: Vec<Point3D> = scenario_points()
        .iter()
        .map(|p| Point3D::new(p.x - 0.1, p.y + 0.05, p.z))
        .collect();
    let target = PoseEstimator::new(EstimatorConfig::default(), DepthMode::Fixed { depth: 5.0 })
        .unwrap()
        .estimate(
            &as_frame(&moved, Handedness::Right),
            FingerKind::Ring.descriptor(),
            &camera,
        )
        .unwrap()
        .ring;

    let FrameOutcome::Updated { ring, .. } =
        tracker.process(&Detection::hand(moved, Handedness::Right), &camera)
    else {
        panic!("expected the ring to follow the returning hand");
    };
    assert!(tracker.scene().is_visible());
    assert_eq!(ring, smooth(&frozen, &target, TrackerConfig::default().smoothing_factor));
    assert_ne!(ring.position, target.position);
    assert_eq!(tracker.metrics().frames_processed, 4);
}

#[test]
fn finger_landmarks_alone_are_enough_to_place_the_ring() {
    let mut points = vec![Point3D::new(0.0, 0.0, 0.0); 21];
    points[WRIST] = Point3D::new(0.5, 0.9, 0.0);
    points[MIDDLE_MCP] = Point3D::new(0.5, 0.6, 0.0);
    points[RING_MCP] = Point3D::new(0.45, 0.5, 0.0);
    points[RING_PIP] = Point3D::new(0.45, 0.4, 0.0);

    let camera = CameraModel::default();
    let mut tracker = tracker();
    let FrameOutcome::Updated { ring, occluder } =
        tracker.process(&Detection::hand(points, Handedness::Right), &camera)
    else {
        panic!("expected the ring to be placed");
    };

    assert_relative_eq!(ring.position.z, -5.0, epsilon = 1e-9);
    assert!(ring.position.y > 0.0);
    assert!(ring.scale.x > 0.0);
    assert!(ring.is_finite() && occluder.is_finite());
    assert!(tracker.scene().is_visible());
}

#[test]
fn left_hand_mirrors_palm_normal() {
    let points = scenario_points();
    let finger = FingerKind::Ring.descriptor();
    let aspect = 16.0 / 9.0;
    let right = solve_basis(&as_frame(&points, Handedness::Right), finger, aspect).unwrap();
    let left = solve_basis(&as_frame(&points, Handedness::Left), finger, aspect).unwrap();
    assert_relative_eq!(left.palm_normal, -right.palm_normal, epsilon = 1e-12);
    assert_relative_eq!(left.finger_axis, right.finger_axis, epsilon = 1e-12);
}

#[test]
fn coincident_depth_references_do_not_blow_up() {
    let mut points = scenario_points();
    points[MIDDLE_MCP] = points[WRIST];
    let frame = as_frame(&points, Handedness::Right);
    let camera = CameraModel::default();
    let mode = DepthMode::Estimated {
        reference_width_px: 300.0,
        reference_depth: 50.0,
    };

    let depth = estimate_depth(&frame, &camera, &mode).unwrap();
    assert!(depth.guard_triggered);
    assert!(depth.depth.is_finite());

    let mut tracker = RingTracker::new(TrackerConfig::default(), EstimatorConfig::default(), mode).unwrap();
    let outcome = tracker.process(&Detection::hand(points, Handedness::Right), &camera);
    assert!(matches!(outcome, FrameOutcome::Updated { .. }));
    assert_eq!(tracker.metrics().depth_guard_hits, 1);
}

#[test]
fn wider_finger_means_bigger_ring() {
    let camera = CameraModel::default();
    let estimator = PoseEstimator::new(EstimatorConfig::default(), DepthMode::Fixed { depth: 5.0 }).unwrap();
    let finger = FingerKind::Ring.descriptor();

    let scales: Vec<f64> = [0.46, 0.49, 0.52, 0.56]
        .iter()
        .map(|&middle_x| {
            let mut points = scenario_points();
            points[MIDDLE_MCP] = Point3D::new(middle_x, 0.5, 0.0);
            let frame = as_frame(&points, Handedness::Right);
            estimator.estimate(&frame, finger, &camera).unwrap().ring.scale.x
        })
        .collect();
    assert!(scales.windows(2).all(|w| w[0] < w[1]), "{:?}", scales);
}

#[tokio::test]
async fn replayed_session_composites_ring_over_video() {
    let detections = vec![
        scenario_detection(),
        scenario_detection(),
        Detection::absent(),
    ];
    let tracker = tracker();
    let mut session: FrameScheduler<ReplayDetector, OverlayRenderer, SyntheticSource> =
        FrameScheduler::new(SchedulerConfig::default(), CameraModel::default(), tracker).unwrap();

    session
        .initialize(
            async move { ReplayDetector::from_detections(detections) },
            async { anyhow::Ok(OverlayRenderer::new()) },
            async { anyhow::Ok(SyntheticSource::new(320, 180)) },
        )
        .await
        .unwrap();
    assert_eq!(*session.state(), SchedulerState::Running);

    let start = Instant::now();
    assert_eq!(
        session.tick(start),
        TickOutcome::Processed { hand_visible: true }
    );
    let composite = session.renderer().unwrap().last_composite().unwrap();
    let ring_color = session.renderer().unwrap().ring_color;
    assert!(composite.pixels().any(|p| *p == ring_color));

    assert_eq!(session.tick(start + Duration::from_millis(10)), TickOutcome::Throttled);
    assert_eq!(
        session.tick(start + Duration::from_millis(40)),
        TickOutcome::Processed { hand_visible: true }
    );
    assert_eq!(
        session.tick(start + Duration::from_millis(80)),
        TickOutcome::Processed { hand_visible: false }
    );

    session.select_finger(FingerKind::Middle);
    assert_eq!(session.tracker().finger(), FingerKind::Middle);

    session.stop();
    assert_eq!(*session.state(), SchedulerState::Stopped);
    assert!(session.renderer().is_none());
}
