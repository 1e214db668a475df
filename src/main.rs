// src/main.rs
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use ring_tryon::{
    CameraSettings, CameraSource, FingerKind, FrameScheduler, FrameSource, HandDetector,
    OverlayRenderer, ReplayDetector, RingTracker, SimulatedDetector, SyntheticSource, TryOnConfig,
};

type Session = FrameScheduler<Box<dyn HandDetector>, OverlayRenderer, Box<dyn FrameSource>>;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Camera index
    #[arg(short, long, default_value_t = 0)]
    camera: u32,

    /// Finger to wear the ring on (thumb, index, middle, ring, pinky)
    #[arg(short, long)]
    finger: Option<FingerKind>,

    /// Recorded detections, one JSON object per line
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Use blank frames instead of a camera
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// Stop after this many processed frames
    #[arg(long)]
    frames: Option<u64>,

    /// Mirror the camera image
    #[arg(long, default_value_t = false)]
    mirror: bool,

    /// Write the last composited frame to this PNG on exit
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

async fn load_detector(replay: Option<PathBuf>) -> Result<Box<dyn HandDetector>> {
    Ok(match replay {
        Some(path) => Box::new(ReplayDetector::load(path).await?),
        None => Box::new(SimulatedDetector::new()),
    })
}

async fn open_source(args: &Args, config: &TryOnConfig) -> Result<Box<dyn FrameSource>> {
    if args.synthetic {
        return Ok(Box::new(SyntheticSource::new(
            config.camera.frame_width,
            config.camera.frame_height,
        )));
    }
    let settings = CameraSettings {
        index: args.camera,
        width: config.camera.frame_width,
        height: config.camera.frame_height,
        fps: config.scheduler.target_fps.round() as u32,
        mirror: args.mirror,
    };
    Ok(Box::new(CameraSource::open(settings)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut config = TryOnConfig::load_or_default(args.config.as_deref()).await?;
    if let Some(finger) = args.finger {
        config.tracker.default_finger = finger;
    }
    config.validate()?;

    let tracker = RingTracker::new(config.tracker.clone(), config.estimator.clone(), config.depth)?;
    let mut session: Session = FrameScheduler::new(config.scheduler.clone(), config.camera, tracker)?;
    info!("Session {} wearing ring on {}", session.session_id(), config.tracker.default_finger);

    let cancel = session.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping");
            cancel.cancel();
        }
    });

    if let Err(e) = session
        .initialize(
            load_detector(args.replay.clone()),
            async { anyhow::Ok(OverlayRenderer::new()) },
            open_source(&args, &config),
        )
        .await
    {
        error!("Could not start try-on session: {}", e);
        return Err(e.into());
    }

    session.run(args.frames).await;

    if let Some(path) = &args.snapshot {
        match session.renderer().and_then(|r| r.last_composite()) {
            Some(image) => {
                image.save(path)?;
                info!("Saved composite to {}", path.display());
            }
            None => info!("No composited frame to save"),
        }
    }

    let metrics = session.tracker().metrics();
    info!(
        "Processed {} frames, avg {:.1} ms, detection rate {:.0}%, {} skipped, {} depth guard hits",
        metrics.frames_processed,
        metrics.avg_processing_time * 1000.0,
        metrics.detection_rate * 100.0,
        metrics.frames_skipped,
        metrics.depth_guard_hits
    );

    session.stop();
    Ok(())
}
