use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::frame::Frame;
use crate::video_file::VideoFile;
use crate::webcam::WebcamCapture;

/// Camera used when no video file is given.
pub const DEFAULT_CAMERA_INDEX: u32 = 0;

/// Supplies frames to the driver loop.
pub trait FrameSource {
    /// Next frame, or `None` once the source has no more data.
    fn read_frame(&mut self) -> Result<Option<Frame>>;

    /// Frame rate reported by the source.
    fn fps(&self) -> f64;

    /// Path of the decoded file. Live sources return `None` and are never recorded.
    fn file_path(&self) -> Option<&Path> {
        None
    }
}

/// Opens the video file if one was given, the default camera otherwise.
pub fn open_source(video: Option<&Path>) -> Result<Box<dyn FrameSource>> {
    match video {
        Some(path) => {
            info!("Opening video {} for prediction.", path.display());
            Ok(Box::new(VideoFile::open(path)?))
        }
        None => {
            info!("Opening webcam for prediction.");
            Ok(Box::new(WebcamCapture::new(DEFAULT_CAMERA_INDEX)?))
        }
    }
}
