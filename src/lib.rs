pub mod cli;
pub mod config;
pub mod display;
pub mod frame;
pub mod legend;
pub mod net;
pub mod pipeline;
pub mod recorder;
pub mod segmentation;
pub mod source;
pub mod video_file;
pub mod webcam;
