use anyhow::{Context, Result};
use image::RgbImage;
use opencv::{
    core::Size,
    prelude::*,
    videoio::VideoWriter,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::frame::{BlendMask, ColorMask, frame_to_mat};

pub const COLOR_SUFFIX: &str = ".segmentation-color";
pub const BLEND_SUFFIX: &str = ".segmentation-blend";

/// Codec of the recorded mask videos.
pub const FOURCC: [char; 4] = ['M', 'J', 'P', 'G'];

/// Encoded video output.
pub trait FrameSink {
    fn is_open(&self) -> bool;

    fn write(&mut self, image: &RgbImage) -> Result<()>;
}

/// Creates sinks once the output size is known.
pub trait SinkFactory {
    fn create(&mut self, path: &Path, fps: f64, size: (u32, u32)) -> Result<Box<dyn FrameSink>>;
}

/// Inserts `suffix` in front of the extension: `a/b.mp4` becomes `a/b<suffix>.mp4`.
pub fn output_path(video: &Path, suffix: &str) -> PathBuf {
    let suffix = suffix.trim_start_matches('.');
    match video.extension() {
        Some(ext) => {
            let mut extension = std::ffi::OsString::from(suffix);
            extension.push(".");
            extension.push(ext);
            video.with_extension(extension)
        }
        None => video.with_extension(suffix),
    }
}

/// OpenCV `VideoWriter`, released when dropped.
pub struct VideoSink {
    writer: VideoWriter,
    path: PathBuf,
    frames: u64,
}

impl VideoSink {
    pub fn open(path: &Path, fps: f64, (width, height): (u32, u32)) -> Result<Self> {
        let name = path.to_str()
            .with_context(|| format!("Output path is not valid UTF-8: {:?}", path))?;
        let [c1, c2, c3, c4] = FOURCC;
        let fourcc = VideoWriter::fourcc(c1, c2, c3, c4)?;

        let writer = VideoWriter::new(name, fourcc, fps, Size::new(width as i32, height as i32), true)
            .with_context(|| format!("Failed to create video writer for {}", path.display()))?;

        if writer.is_opened()? {
            info!("Recording {}x{} @ {:.2} fps to {}", width, height, fps, path.display());
        } else {
            warn!("Video writer for {} did not open, frames will not be recorded", path.display());
        }

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            frames: 0,
        })
    }
}

impl FrameSink for VideoSink {
    fn is_open(&self) -> bool {
        self.writer.is_opened().unwrap_or(false)
    }

    fn write(&mut self, image: &RgbImage) -> Result<()> {
        let mat = frame_to_mat(image)?;
        self.writer.write(&mat)
            .with_context(|| format!("Failed to write frame to {}", self.path.display()))?;
        self.frames += 1;
        Ok(())
    }
}

impl Drop for VideoSink {
    fn drop(&mut self) {
        if !self.is_open() {
            return;
        }
        match self.writer.release() {
            Ok(()) => info!("Finalized {} ({} frames)", self.path.display(), self.frames),
            Err(e) => warn!("Failed to finalize {}: {}", self.path.display(), e),
        }
    }
}

/// Creates OpenCV video sinks.
#[derive(Debug, Default)]
pub struct OpenCvSinks;

impl SinkFactory for OpenCvSinks {
    fn create(&mut self, path: &Path, fps: f64, size: (u32, u32)) -> Result<Box<dyn FrameSink>> {
        Ok(Box::new(VideoSink::open(path, fps, size)?))
    }
}

/// The color and blend outputs of one video file.
pub struct Recording {
    color: Box<dyn FrameSink>,
    blend: Box<dyn FrameSink>,
}

impl Recording {
    pub fn open(
        sinks: &mut dyn SinkFactory,
        video: &Path,
        fps: f64,
        color_size: (u32, u32),
        blend_size: (u32, u32),
    ) -> Result<Self> {
        let color = sinks.create(&output_path(video, COLOR_SUFFIX), fps, color_size)?;
        let blend = sinks.create(&output_path(video, BLEND_SUFFIX), fps, blend_size)?;
        Ok(Self { color, blend })
    }

    /// Appends to every sink that opened.
    pub fn write(&mut self, color_mask: &ColorMask, blend_mask: &BlendMask) -> Result<()> {
        if self.color.is_open() {
            self.color.write(color_mask)?;
        }
        if self.blend.is_open() {
            self.blend.write(blend_mask)?;
        }
        Ok(())
    }
}
