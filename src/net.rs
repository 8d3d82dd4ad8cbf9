use anyhow::Result;
use std::fmt;
use std::path::Path;

use crate::frame::{BlendMask, ColorMask, Frame, LabelMap};
use crate::segmentation::SegmentationModel;

/// Execution engine used to run the segmentation network.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backend {
    /// ONNX Runtime on CUDA, falling back to the CPU.
    #[default]
    Pytorch,
    /// ONNX Runtime with the TensorRT execution provider in front of CUDA and CPU.
    TensorRt,
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Pytorch => "pytorch",
            Backend::TensorRt => "tensorrt",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything the driver loop needs from a segmentation network.
pub trait Net {
    /// Enables per-stage timing output.
    fn set_verbosity(&mut self, verbose: bool);

    /// Runs the network on a frame and returns one class id per pixel.
    fn infer(&mut self, frame: &Frame) -> Result<LabelMap>;

    /// Renders a label map into display colors.
    fn color(&self, label_map: &LabelMap) -> Result<ColorMask>;

    /// Composites the color mask over the frame.
    fn blend(&self, frame: &Frame, color_mask: &ColorMask) -> Result<BlendMask>;
}

/// Builds the network stored in `model_dir` for the requested backend.
pub fn make_net(model_dir: &Path, backend: Backend) -> Result<Box<dyn Net>> {
    let model = SegmentationModel::new(model_dir, backend)?;
    Ok(Box::new(model))
}
