// src/bin/camera_probe.rs - checks that a camera can be opened and streamed
use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use ring_tryon::{CameraSettings, CameraSource, FrameSource};

#[derive(Parser, Debug)]
#[command(author, version, about = "List cameras and grab a frame from one", long_about = None)]
struct Args {
    /// Camera index to open
    #[arg(short, long, default_value_t = 0)]
    camera: u32,

    /// Only list cameras
    #[arg(long)]
    list: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    match nokhwa::query(nokhwa::utils::ApiBackend::Auto) {
        Ok(cameras) => {
            info!("Found {} camera(s)", cameras.len());
            for (i, camera) in cameras.iter().enumerate() {
                info!("  [{}] {}", i, camera.human_name());
            }
        }
        Err(e) => warn!("Failed to query cameras: {}", e),
    }
    if args.list {
        return Ok(());
    }

    let settings = CameraSettings {
        index: args.camera,
        ..CameraSettings::default()
    };
    let mut source = match CameraSource::open(settings) {
        Ok(source) => source,
        Err(e) => {
            error!("{:#}", e);
            error!("Check that no other app holds the camera and that camera access is granted");
            return Err(e);
        }
    };

    let frame = source.next_frame()?;
    info!("Captured a {}x{} frame", frame.width(), frame.height());
    source.release();
    Ok(())
}
