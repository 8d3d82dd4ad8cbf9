use anyhow::{Context, Result};
use image::ImageBuffer;
use tracing::{debug, info, warn};

use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    utils::{CameraIndex, RequestedFormat, RequestedFormatType},
};

use crate::frame::Frame;
use crate::source::FrameSource;

pub struct WebcamCapture {
    camera: Camera,
    width: u32,
    height: u32,
    fps: u32,
    frame_count: u64,
}

impl WebcamCapture {
    pub fn new(index: u32) -> Result<Self> {
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

        let mut camera = Camera::new(CameraIndex::Index(index), requested)
            .with_context(|| format!("Failed to create camera {}", index))?;

        camera.open_stream()
            .context("Failed to open camera stream")?;

        let resolution = camera.resolution();
        let width = resolution.width();
        let height = resolution.height();
        let fps = camera.frame_rate();

        info!("Successfully opened webcam {} ({}x{} @ {} fps)", index, width, height, fps);

        Ok(Self {
            camera,
            width,
            height,
            fps,
            frame_count: 0,
        })
    }

    pub fn capture_frame(&mut self) -> Result<Frame> {
        let frame = self.camera.frame()
            .context("Failed to capture camera frame")?;

        let rgb_data = frame.decode_image::<RgbFormat>()
            .context("Failed to decode camera frame")?;

        let buffer = ImageBuffer::from_raw(self.width, self.height, rgb_data.into_raw())
            .context("Failed to create image buffer from camera data")?;

        self.frame_count += 1;
        debug!("Captured camera frame {}: {}x{}", self.frame_count, self.width, self.height);

        Ok(buffer)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.camera.stop_stream()
            .context("Failed to stop camera stream")?;
        info!("Camera stream stopped after {} frames", self.frame_count);
        Ok(())
    }
}

impl FrameSource for WebcamCapture {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        self.capture_frame().map(Some)
    }

    fn fps(&self) -> f64 {
        self.fps as f64
    }
}

impl Drop for WebcamCapture {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop camera during drop: {}", e);
        }
    }
}
