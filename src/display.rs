use anyhow::Result;
use opencv::highgui;
use tracing::{debug, warn};

use crate::frame::{BlendMask, ColorMask, Frame, frame_to_mat};

pub const FRAME_WINDOW: &str = "Frame";
pub const MASK_WINDOW: &str = "Mask";
pub const BLEND_WINDOW: &str = "Blend";

/// Shows each processed frame to the operator.
pub trait Viewer {
    fn show(&mut self, frame: &Frame, color_mask: &ColorMask, blend_mask: &BlendMask) -> Result<()>;
}

/// Three `highgui` windows, closed when dropped.
pub struct HighGuiViewer;

impl HighGuiViewer {
    pub fn new() -> Result<Self> {
        for name in [FRAME_WINDOW, MASK_WINDOW, BLEND_WINDOW] {
            highgui::named_window(name, highgui::WINDOW_AUTOSIZE)?;
        }
        debug!("Created display windows");
        Ok(Self)
    }
}

impl Viewer for HighGuiViewer {
    fn show(&mut self, frame: &Frame, color_mask: &ColorMask, blend_mask: &BlendMask) -> Result<()> {
        highgui::imshow(FRAME_WINDOW, &frame_to_mat(frame)?)?;
        highgui::imshow(MASK_WINDOW, &frame_to_mat(color_mask)?)?;
        highgui::imshow(BLEND_WINDOW, &frame_to_mat(blend_mask)?)?;
        // Keys are ignored, the poll only lets the windows repaint
        highgui::wait_key(1)?;
        Ok(())
    }
}

impl Drop for HighGuiViewer {
    fn drop(&mut self) {
        if let Err(e) = highgui::destroy_all_windows() {
            warn!("Failed to close display windows: {}", e);
        }
    }
}
