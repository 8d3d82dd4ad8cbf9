use anyhow::{Context, Result};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture},
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::frame::{Frame, mat_to_frame};
use crate::source::FrameSource;

/// Decodes a video file with OpenCV.
pub struct VideoFile {
    cap: VideoCapture,
    path: PathBuf,
    fps: f64,
    total_frames: i64,
    current_frame: u64,
}

impl VideoFile {
    pub fn open(path: &Path) -> Result<Self> {
        let name = path.to_str()
            .with_context(|| format!("Video path is not valid UTF-8: {:?}", path))?;
        let cap = VideoCapture::from_file(name, videoio::CAP_ANY)?;

        if !cap.is_opened()? {
            anyhow::bail!("Failed to open video file {}", path.display());
        }

        let fps = cap.get(videoio::CAP_PROP_FPS)?;
        let total_frames = cap.get(videoio::CAP_PROP_FRAME_COUNT)? as i64;
        let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32;

        info!("Opened {} ({}x{}, {:.2} fps, {} frames)", path.display(), width, height, fps, total_frames);

        Ok(Self {
            cap,
            path: path.to_path_buf(),
            fps,
            total_frames,
            current_frame: 0,
        })
    }

    pub fn progress(&self) -> f32 {
        if self.total_frames <= 0 {
            return 0.0;
        }
        (self.current_frame as f32 / self.total_frames as f32) * 100.0
    }
}

impl FrameSource for VideoFile {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let mut mat = Mat::default();
        if !self.cap.read(&mut mat)? || mat.empty() {
            return Ok(None);
        }

        self.current_frame += 1;
        debug!("Decoded frame {} ({:.1}%)", self.current_frame, self.progress());

        mat_to_frame(&mat).map(Some)
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn file_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(VideoFile::open(&dir.path().join("missing.mp4")).is_err());
    }
}
