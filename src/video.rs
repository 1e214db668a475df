// src/video.rs - video frame sources
use anyhow::{Context, Result};
use image::{DynamicImage, ImageBuffer, RgbImage, Rgba, RgbaImage};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use tracing::{debug, info, warn};

pub trait FrameSource {
    fn next_frame(&mut self) -> Result<DynamicImage>;
    fn resolution(&self) -> (u32, u32);
    /// Gives the device back. Safe to call more than once.
    fn release(&mut self);
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn next_frame(&mut self) -> Result<DynamicImage> {
        (**self).next_frame()
    }

    fn resolution(&self) -> (u32, u32) {
        (**self).resolution()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CameraSettings {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub mirror: bool,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            index: 0,
            width: 1280,
            height: 720,
            fps: 30,
            mirror: false,
        }
    }
}

/// Live webcam stream. The stream is stopped on release or drop.
pub struct CameraSource {
    camera: Option<Camera>,
    mirror: bool,
    resolution: (u32, u32),
}

impl CameraSource {
    pub fn open(settings: CameraSettings) -> Result<Self> {
        debug!("Opening camera index {}", settings.index);

        let format = CameraFormat::new(
            Resolution::new(settings.width, settings.height),
            FrameFormat::MJPEG,
            settings.fps,
        );
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

        let mut camera = Camera::new(CameraIndex::Index(settings.index), requested)
            .map_err(|e| anyhow::anyhow!("failed to open camera {}: {}", settings.index, e))?;
        camera
            .open_stream()
            .map_err(|e| anyhow::anyhow!("failed to start camera stream: {}", e))?;

        let res = camera.resolution();
        info!(
            "Camera {} streaming at {}x{} @ {} fps",
            settings.index,
            res.width(),
            res.height(),
            camera.frame_rate()
        );

        Ok(Self {
            camera: Some(camera),
            mirror: settings.mirror,
            resolution: (res.width(), res.height()),
        })
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<DynamicImage> {
        let camera = self
            .camera
            .as_mut()
            .context("camera stream already released")?;

        let frame = camera
            .frame()
            .map_err(|e| anyhow::anyhow!("failed to capture frame: {}", e))?;
        let decoded = frame
            .decode_image::<RgbFormat>()
            .map_err(|e| anyhow::anyhow!("failed to decode frame: {}", e))?;

        let (width, height) = (decoded.width(), decoded.height());
        let rgb = RgbImage::from_raw(width, height, decoded.into_vec())
            .context("decoded frame has an unexpected size")?;

        let image = DynamicImage::ImageRgb8(rgb);
        Ok(if self.mirror { image.fliph() } else { image })
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn release(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            match camera.stop_stream() {
                Ok(()) => info!("Camera stream released"),
                Err(e) => warn!("Camera stream did not stop cleanly: {}", e),
            }
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Plain frames for running without a camera (replays, simulation, tests).
pub struct SyntheticSource {
    frame: RgbaImage,
    released: bool,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            frame: ImageBuffer::from_pixel(width, height, Rgba([40, 40, 48, 255])),
            released: false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<DynamicImage> {
        if self.released {
            anyhow::bail!("synthetic source already released");
        }
        Ok(DynamicImage::ImageRgba8(self.frame.clone()))
    }

    fn resolution(&self) -> (u32, u32) {
        self.frame.dimensions()
    }

    fn release(&mut self) {
        self.released = true;
    }
}
