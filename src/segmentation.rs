use anyhow::{Context, Result};
use image::{imageops::FilterType, Rgb, RgbImage};
use std::path::Path;
use std::time::Instant;

use ort::{
    execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{Session, builder::GraphOptimizationLevel},
    value::Value,
};

use crate::config::{ModelConfig, Palette};
use crate::frame::{BlendMask, ColorMask, Frame, LabelMap};
use crate::net::{Backend, Net};

/// File name of the exported network inside the model directory.
pub const MODEL_FILE: &str = "model.onnx";

/// Weight of the color mask in the blend.
pub const BLEND_ALPHA: f32 = 0.5;

pub struct SegmentationModel {
    session: Session,
    input_width: u32,
    input_height: u32,
    means: Vec<f32>,
    stds: Vec<f32>,
    palette: Palette,
    input_buffer: Vec<f32>,
    verbose: bool,
}

impl SegmentationModel {
    pub fn new(model_dir: &Path, backend: Backend) -> Result<Self> {
        let config = ModelConfig::load(model_dir)?;
        let model_path = model_dir.join(MODEL_FILE);

        tracing::info!("Loading segmentation model from: {:?} (backend: {})", model_path, backend);

        if !model_path.exists() {
            anyhow::bail!("Model file does not exist at path: {:?}", model_path);
        }

        let session = Self::create_session(&model_path, backend)?;

        tracing::debug!("Model inputs: {:?}", session.inputs.iter().map(|i| &i.name).collect::<Vec<_>>());
        tracing::debug!("Model outputs: {:?}", session.outputs.iter().map(|o| &o.name).collect::<Vec<_>>());

        let prop = config.dataset.img_prop;
        tracing::info!(
            "Segmentation model loaded. Input size: {}x{}, {} classes",
            prop.width,
            prop.height,
            config.num_classes()
        );

        Ok(Self {
            session,
            input_width: prop.width,
            input_height: prop.height,
            means: config.dataset.img_means.clone(),
            stds: config.dataset.img_stds.clone(),
            palette: config.palette(),
            input_buffer: Vec::with_capacity(3 * prop.width as usize * prop.height as usize),
            verbose: false,
        })
    }

    fn create_session(model_path: &Path, backend: Backend) -> Result<Session> {
        tracing::info!("Creating {} ONNX session with {} threads", backend, num_cpus::get());

        let providers = match backend {
            Backend::Pytorch => vec![
                CUDAExecutionProvider::default().build(),
                CPUExecutionProvider::default().build(),
            ],
            Backend::TensorRt => vec![
                TensorRTExecutionProvider::default().build(),
                CUDAExecutionProvider::default().build(),
                CPUExecutionProvider::default().build(),
            ],
        };

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(num_cpus::get())?
            .with_execution_providers(providers)?
            .commit_from_file(model_path)
            .context("Failed to load ONNX model - make sure the model file is valid")?;

        Ok(session)
    }

    fn run_network(&mut self) -> Result<LabelMap> {
        let input_tensor = Value::from_array((
            [1, 3, self.input_height as usize, self.input_width as usize],
            self.input_buffer.clone(),
        ))?;

        let input_name = self.session.inputs[0].name.clone();
        let outputs = self
            .session
            .run(vec![(input_name, input_tensor)])
            .context("Segmentation network inference failed")?;

        let output = outputs
            .values()
            .next()
            .context("Segmentation network produced no outputs")?;

        if let Ok((shape, logits)) = output.try_extract_tensor::<f32>() {
            let dims: Vec<i64> = shape.iter().copied().collect();
            argmax_logits(&dims, logits)
        } else {
            let (shape, ids) = output
                .try_extract_tensor::<i64>()
                .context("Unsupported network output, expected f32 logits or i64 class ids")?;
            let dims: Vec<i64> = shape.iter().copied().collect();
            class_ids(&dims, ids)
        }
    }

    fn log_timing(&self, stage: &str, started: Instant) {
        let ms = started.elapsed().as_secs_f64() * 1000.0;
        if self.verbose {
            tracing::info!("{}: {:.2}ms", stage, ms);
        } else {
            tracing::trace!("{}: {:.2}ms", stage, ms);
        }
    }
}

impl Net for SegmentationModel {
    fn set_verbosity(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    fn infer(&mut self, frame: &Frame) -> Result<LabelMap> {
        let total = Instant::now();

        let started = Instant::now();
        let resized = image::imageops::resize(frame, self.input_width, self.input_height, FilterType::Triangle);
        preprocess(&resized, &self.means, &self.stds, &mut self.input_buffer);
        self.log_timing("Preprocess", started);

        let started = Instant::now();
        let labels = self.run_network()?;
        self.log_timing("Network", started);

        let started = Instant::now();
        let (width, height) = frame.dimensions();
        let labels = scale_nearest(&labels, width, height);
        self.log_timing("Postprocess", started);

        self.log_timing("Total inference", total);
        Ok(labels)
    }

    fn color(&self, label_map: &LabelMap) -> Result<ColorMask> {
        Ok(colorize(&self.palette, label_map))
    }

    fn blend(&self, frame: &Frame, color_mask: &ColorMask) -> Result<BlendMask> {
        alpha_blend(frame, color_mask, BLEND_ALPHA)
    }
}

/// Writes the image into `buffer` as normalized NCHW floats.
pub fn preprocess(image: &RgbImage, means: &[f32], stds: &[f32], buffer: &mut Vec<f32>) {
    buffer.clear();
    let (width, height) = image.dimensions();

    for c in 0..3 {
        for y in 0..height {
            for x in 0..width {
                let value = image.get_pixel(x, y)[c] as f32 / 255.0;
                buffer.push((value - means[c]) / stds[c]);
            }
        }
    }
}

/// Picks the highest scoring class per pixel from `[1, C, H, W]` or `[C, H, W]` logits.
pub fn argmax_logits(dims: &[i64], logits: &[f32]) -> Result<LabelMap> {
    let (classes, height, width) = match dims {
        [1, c, h, w] | [c, h, w] => (*c, *h, *w),
        _ => anyhow::bail!("Unexpected logits shape {:?}", dims),
    };
    if classes <= 0 || height <= 0 || width <= 0 {
        anyhow::bail!("Unexpected logits shape {:?}", dims);
    }

    let classes = classes as usize;
    let plane = (height * width) as usize;
    if logits.len() != classes * plane {
        anyhow::bail!("Logits hold {} values, shape {:?} needs {}", logits.len(), dims, classes * plane);
    }

    let labels = (0..plane)
        .map(|i| {
            let mut best = 0;
            let mut best_score = f32::NEG_INFINITY;
            for c in 0..classes {
                let score = logits[c * plane + i];
                if score > best_score {
                    best_score = score;
                    best = c;
                }
            }
            best as u32
        })
        .collect();

    LabelMap::from_raw(width as u32, height as u32, labels).context("Failed to create label map")
}

/// Accepts networks that already end in an argmax.
pub fn class_ids(dims: &[i64], ids: &[i64]) -> Result<LabelMap> {
    let (height, width) = match dims {
        [1, 1, h, w] | [1, h, w] | [h, w] => (*h, *w),
        _ => anyhow::bail!("Unexpected class id shape {:?}", dims),
    };
    if height <= 0 || width <= 0 || ids.len() != (height * width) as usize {
        anyhow::bail!("Class ids hold {} values, shape is {:?}", ids.len(), dims);
    }

    // Negative ids fall outside every palette and render as unknown
    let labels = ids.iter().map(|id| u32::try_from(*id).unwrap_or(u32::MAX)).collect();

    LabelMap::from_raw(width as u32, height as u32, labels).context("Failed to create label map")
}

/// Nearest-neighbour resize, labels must never be interpolated.
pub fn scale_nearest(labels: &LabelMap, width: u32, height: u32) -> LabelMap {
    let (src_width, src_height) = labels.dimensions();
    if (src_width, src_height) == (width, height) {
        return labels.clone();
    }

    LabelMap::from_fn(width, height, |x, y| {
        let src_x = ((x as u64 * src_width as u64 / width as u64) as u32).min(src_width - 1);
        let src_y = ((y as u64 * src_height as u64 / height as u64) as u32).min(src_height - 1);
        *labels.get_pixel(src_x, src_y)
    })
}

pub fn colorize(palette: &Palette, labels: &LabelMap) -> ColorMask {
    let (width, height) = labels.dimensions();
    RgbImage::from_fn(width, height, |x, y| palette.lookup(labels.get_pixel(x, y)[0]))
}

pub fn alpha_blend(frame: &Frame, mask: &ColorMask, alpha: f32) -> Result<BlendMask> {
    if frame.dimensions() != mask.dimensions() {
        anyhow::bail!(
            "Cannot blend a {:?} color mask over a {:?} frame",
            mask.dimensions(),
            frame.dimensions()
        );
    }

    let (width, height) = frame.dimensions();
    Ok(RgbImage::from_fn(width, height, |x, y| {
        let f = frame.get_pixel(x, y);
        let m = mask.get_pixel(x, y);
        let mix = |c: usize| (f[c] as f32 * (1.0 - alpha) + m[c] as f32 * alpha).round().clamp(0.0, 255.0) as u8;
        Rgb([mix(0), mix(1), mix(2)])
    }))
}
