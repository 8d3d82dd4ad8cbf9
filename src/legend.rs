use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use opencv::{
    core::{Point, Scalar},
    imgproc,
};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::ModelConfig;
use crate::frame::{frame_to_mat, mat_to_frame};

pub const SWATCH_WIDTH: u32 = 200;
pub const SWATCH_HEIGHT: u32 = 30;

/// Height to width proportion the legend sheet aims for.
const SHEET_RATIO: (f64, f64) = (3.0, 4.0);

/// Sheet background, nearly black.
const SHEET_BACKGROUND: Rgb<u8> = Rgb([1, 1, 1]);

/// Black text on light colors, white text on dark ones.
pub fn text_color(color: Rgb<u8>) -> Rgb<u8> {
    let mean = color.0.iter().map(|c| *c as f64).sum::<f64>() / 3.0;
    if mean > 128.0 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) }
}

/// A solid swatch with the label written on it.
pub fn render_swatch(label: &str, color: Rgb<u8>) -> Result<RgbImage> {
    let swatch = RgbImage::from_pixel(SWATCH_WIDTH, SWATCH_HEIGHT, color);
    let mut mat = frame_to_mat(&swatch)?;

    let text = text_color(color);
    imgproc::put_text(
        &mut mat,
        label,
        Point::new(5, SWATCH_HEIGHT as i32 - 5),
        imgproc::FONT_HERSHEY_SIMPLEX,
        1.0,
        Scalar::new(text[2] as f64, text[1] as f64, text[0] as f64, 0.0),
        1,
        imgproc::LINE_8,
        false,
    )?;

    mat_to_frame(&mat)
}

/// Rows and columns of swatches for a sheet close to `SHEET_RATIO`.
pub fn grid_shape(count: usize) -> (u32, u32) {
    if count == 0 {
        return (0, 0);
    }

    let row_ratio = SHEET_RATIO.0 / SWATCH_HEIGHT as f64;
    let col_ratio = SHEET_RATIO.1 / SWATCH_WIDTH as f64;
    let scale = (count as f64 / (row_ratio * col_ratio)).sqrt();

    ((row_ratio * scale).ceil() as u32, (col_ratio * scale).ceil() as u32)
}

/// Lays the swatches out row-major, `None` when there is nothing to lay out.
pub fn compose_sheet(swatches: &[RgbImage]) -> Option<RgbImage> {
    if swatches.is_empty() {
        return None;
    }

    let (rows, cols) = grid_shape(swatches.len());
    let mut sheet = RgbImage::from_pixel(cols * SWATCH_WIDTH, rows * SWATCH_HEIGHT, SHEET_BACKGROUND);

    for (idx, swatch) in swatches.iter().enumerate() {
        let row = idx as u32 / cols;
        let col = idx as u32 % cols;
        image::imageops::replace(
            &mut sheet,
            swatch,
            (col * SWATCH_WIDTH) as i64,
            (row * SWATCH_HEIGHT) as i64,
        );
    }

    Some(sheet)
}

/// `cfg.yaml` with label `road` becomes `cfgroad.png`.
pub fn swatch_path(config_path: &Path, label: &str) -> PathBuf {
    sibling(config_path, &format!("{}.png", label))
}

/// `cfg.yaml` becomes `cfg_legend.png`.
pub fn sheet_path(config_path: &Path) -> PathBuf {
    sibling(config_path, "_legend.png")
}

fn sibling(config_path: &Path, tail: &str) -> PathBuf {
    let mut name = OsString::from(config_path.with_extension(""));
    name.push(tail);
    PathBuf::from(name)
}

/// Writes one swatch per label and the combined sheet. Returns the written files.
pub fn generate_legends(config_path: &Path) -> Result<Vec<PathBuf>> {
    let config = ModelConfig::from_file(config_path)?;
    let mut written = Vec::new();
    let mut swatches = Vec::new();

    for (id, label) in &config.dataset.labels {
        let color = config
            .color(*id)
            .with_context(|| format!("Label {} ({}) has no color in color_map", id, label))?;

        let swatch = render_swatch(label, color)?;
        let path = swatch_path(config_path, label);
        swatch.save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote legend for {} to {}", label, path.display());

        written.push(path);
        swatches.push(swatch);
    }

    if let Some(sheet) = compose_sheet(&swatches) {
        let path = sheet_path(config_path);
        sheet.save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote legend sheet ({}x{}) to {}", sheet.width(), sheet.height(), path.display());
        written.push(path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_color_contrasts() {
        assert_eq!(text_color(Rgb([255, 255, 255])), Rgb([0, 0, 0]));
        assert_eq!(text_color(Rgb([0, 0, 142])), Rgb([255, 255, 255]));
        assert_eq!(text_color(Rgb([128, 128, 128])), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_grid_shape() {
        assert_eq!(grid_shape(0), (0, 0));
        assert_eq!(grid_shape(1), (3, 1));
        assert_eq!(grid_shape(3), (4, 1));
        assert_eq!(grid_shape(12), (8, 2));
    }

    #[test]
    fn test_grid_always_fits_every_swatch() {
        for count in 1..100 {
            let (rows, cols) = grid_shape(count);
            assert!((rows * cols) as usize >= count, "{} swatches", count);
        }
    }

    #[test]
    fn test_compose_sheet_places_row_major() {
        let red = RgbImage::from_pixel(SWATCH_WIDTH, SWATCH_HEIGHT, Rgb([255, 0, 0]));
        let green = RgbImage::from_pixel(SWATCH_WIDTH, SWATCH_HEIGHT, Rgb([0, 255, 0]));
        let mut swatches = vec![red.clone(), green];
        swatches.extend(std::iter::repeat_n(red, 4));
        let sheet = compose_sheet(&swatches).unwrap();

        // 6 swatches: 6 rows x 2 columns
        assert_eq!(grid_shape(6), (6, 2));
        assert_eq!(sheet.dimensions(), (2 * SWATCH_WIDTH, 6 * SWATCH_HEIGHT));
        assert_eq!(*sheet.get_pixel(0, 0), Rgb([255, 0, 0]));
        assert_eq!(*sheet.get_pixel(SWATCH_WIDTH, 0), Rgb([0, 255, 0]));
        assert_eq!(*sheet.get_pixel(0, SWATCH_HEIGHT), Rgb([255, 0, 0]));
        assert_eq!(*sheet.get_pixel(0, 5 * SWATCH_HEIGHT), SHEET_BACKGROUND);
        assert!(compose_sheet(&[]).is_none());
    }

    #[test]
    fn test_output_names() {
        let config = Path::new("models/city/cfg.yaml");
        assert_eq!(swatch_path(config, "road"), PathBuf::from("models/city/cfgroad.png"));
        assert_eq!(sheet_path(config), PathBuf::from("models/city/cfg_legend.png"));
    }

    #[test]
    fn test_render_swatch_keeps_background() {
        let swatch = render_swatch("car", Rgb([0, 0, 142])).unwrap();
        assert_eq!(swatch.dimensions(), (SWATCH_WIDTH, SWATCH_HEIGHT));
        assert_eq!(*swatch.get_pixel(SWATCH_WIDTH - 1, 0), Rgb([0, 0, 142]));
        assert!(swatch.pixels().any(|p| *p == Rgb([255, 255, 255])));
    }

    #[test]
    fn test_generate_legends_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("cfg.yaml");
        std::fs::write(
            &config,
            "dataset:\n  img_prop: {width: 8, height: 8}\n  img_means: [0, 0, 0]\n  img_stds: [1, 1, 1]\n  labels: {0: road, 1: car}\n  color_map: {0: [128, 64, 128], 1: [142, 0, 0]}\n",
        )
        .unwrap();

        let written = generate_legends(&config).unwrap();

        assert_eq!(written.len(), 3);
        assert!(dir.path().join("cfgroad.png").exists());
        assert!(dir.path().join("cfgcar.png").exists());
        assert!(dir.path().join("cfg_legend.png").exists());
    }

    #[test]
    fn test_generate_legends_requires_colors() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("cfg.yaml");
        std::fs::write(
            &config,
            "dataset:\n  img_prop: {width: 8, height: 8}\n  img_means: [0, 0, 0]\n  img_stds: [1, 1, 1]\n  labels: {0: road, 7: sky}\n  color_map: {0: [128, 64, 128]}\n",
        )
        .unwrap();

        assert!(generate_legends(&config).is_err());
    }
}
