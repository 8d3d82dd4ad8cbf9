use thiserror::Error;
use tracing::{debug, info, warn};

use crate::display::Viewer;
use crate::net::Net;
use crate::recorder::{Recording, SinkFactory};
use crate::source::FrameSource;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Line printed around the configuration summary and every frame.
pub const SEPARATOR: &str = "================================================================================";

/// Why the driver loop stopped. Every variant is fatal.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No image in frame! Source ran out after {frames} frames")]
    EndOfStream { frames: u64 },

    #[error("Failed to capture frame {frame}")]
    Capture {
        frame: u64,
        #[source]
        source: BoxError,
    },

    #[error("Segmentation failed on frame {frame}")]
    Inference {
        frame: u64,
        #[source]
        source: BoxError,
    },

    #[error("Failed to record frame {frame}")]
    Output {
        frame: u64,
        #[source]
        source: BoxError,
    },
}

/// Single-threaded driver: capture, infer, color, blend, show, record.
///
/// Owns the source, the network, the display and the recording; all of them
/// are released when the pipeline is dropped, whichever way the loop ended.
pub struct SegmentationPipeline {
    source: Box<dyn FrameSource>,
    net: Box<dyn Net>,
    sinks: Box<dyn SinkFactory>,
    viewer: Option<Box<dyn Viewer>>,
    recording: Option<Recording>,
    frame_counter: u64,
}

impl SegmentationPipeline {
    pub fn new(source: Box<dyn FrameSource>, net: Box<dyn Net>, sinks: Box<dyn SinkFactory>) -> Self {
        Self {
            source,
            net,
            sinks,
            viewer: None,
            recording: None,
            frame_counter: 0,
        }
    }

    pub fn with_viewer(mut self, viewer: Box<dyn Viewer>) -> Self {
        self.viewer = Some(viewer);
        self
    }

    /// Processes frames until one of them fails. There is no successful exit.
    pub fn run(&mut self) -> PipelineError {
        info!("Starting segmentation pipeline");
        loop {
            if let Err(e) = self.process_frame() {
                info!("Segmentation pipeline stopped after {} frames", self.frame_counter);
                return e;
            }
        }
    }

    /// Runs one iteration of the loop.
    pub fn process_frame(&mut self) -> Result<(), PipelineError> {
        let index = self.frame_counter;
        info!("{}", SEPARATOR);
        info!("Predicting frame: {}", index);

        let frame = match self.source.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return Err(PipelineError::EndOfStream { frames: index }),
            Err(e) => return Err(PipelineError::Capture { frame: index, source: e.into() }),
        };
        debug!("Captured frame {} ({}x{})", index, frame.width(), frame.height());

        let inference = move |e: anyhow::Error| PipelineError::Inference { frame: index, source: e.into() };

        let label_map = self.net.infer(&frame).map_err(inference)?;
        debug!("Inferred label map for frame {}", index);

        let color_mask = self.net.color(&label_map).map_err(inference)?;
        debug!("Colored label map for frame {}", index);

        let blend_mask = self.net.blend(&frame, &color_mask).map_err(inference)?;
        debug!("Blended frame {}", index);

        if let Some(viewer) = self.viewer.as_mut() {
            if let Err(e) = viewer.show(&frame, &color_mask, &blend_mask) {
                warn!("Failed to display frame {}: {}", index, e);
            }
        }

        let output = move |e: anyhow::Error| PipelineError::Output { frame: index, source: e.into() };

        if self.recording.is_none() {
            if let Some(video) = self.source.file_path() {
                let recording = Recording::open(
                    self.sinks.as_mut(),
                    video,
                    self.source.fps(),
                    color_mask.dimensions(),
                    blend_mask.dimensions(),
                )
                .map_err(output)?;
                self.recording = Some(recording);
            }
        }

        if let Some(recording) = self.recording.as_mut() {
            recording.write(&color_mask, &blend_mask).map_err(output)?;
        }

        info!("{}", SEPARATOR);
        self.frame_counter += 1;
        Ok(())
    }

    pub fn frames_processed(&self) -> u64 {
        self.frame_counter
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }
}
