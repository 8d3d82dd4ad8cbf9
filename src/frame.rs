use anyhow::{Context, Result};
use image::{ImageBuffer, Luma, RgbImage};
use opencv::{
    core::{CV_8UC3, Mat, Scalar},
    prelude::*,
};

/// One decoded image from the camera or the video file.
pub type Frame = RgbImage;

/// Per-pixel class index produced by the segmentation network.
pub type LabelMap = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Label map rendered into display colors.
pub type ColorMask = RgbImage;

/// Frame and color mask composited for visualization.
pub type BlendMask = RgbImage;

/// Converts an 8-bit BGR `Mat` (what OpenCV decodes to) into an RGB frame.
pub fn mat_to_frame(mat: &Mat) -> Result<Frame> {
    if mat.typ() != CV_8UC3 {
        anyhow::bail!("Unsupported frame type {} (expected 8-bit, 3 channels)", mat.typ());
    }

    let width = mat.cols() as u32;
    let height = mat.rows() as u32;

    // Views into larger images are not continuous, data_bytes needs a packed copy
    let packed;
    let mat = if mat.is_continuous() {
        mat
    } else {
        packed = mat.try_clone()?;
        &packed
    };

    let bgr = mat.data_bytes().context("Failed to access frame pixels")?;
    let mut rgb = Vec::with_capacity(bgr.len());
    for pixel in bgr.chunks_exact(3) {
        rgb.extend_from_slice(&[pixel[2], pixel[1], pixel[0]]);
    }

    RgbImage::from_raw(width, height, rgb).context("Failed to create image buffer from frame data")
}

/// Converts an RGB image into a BGR `Mat` for `highgui` and `VideoWriter`.
pub fn frame_to_mat(image: &RgbImage) -> Result<Mat> {
    let (width, height) = image.dimensions();
    let mut mat = Mat::new_rows_cols_with_default(
        height as i32,
        width as i32,
        CV_8UC3,
        Scalar::all(0.0),
    )?;

    let bgr = mat.data_bytes_mut().context("Failed to access Mat pixels")?;
    for (dst, src) in bgr.chunks_exact_mut(3).zip(image.as_raw().chunks_exact(3)) {
        dst[0] = src[2];
        dst[1] = src[1];
        dst[2] = src[0];
    }

    Ok(mat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_frame_to_mat_swaps_channels() {
        let image = RgbImage::from_pixel(4, 2, Rgb([10, 20, 30]));
        let mat = frame_to_mat(&image).unwrap();

        assert_eq!(mat.rows(), 2);
        assert_eq!(mat.cols(), 4);
        assert_eq!(&mat.data_bytes().unwrap()[..3], &[30, 20, 10]);
    }

    #[test]
    fn test_mat_round_trip_keeps_pixels() {
        let image = RgbImage::from_fn(3, 3, |x, y| Rgb([x as u8, y as u8, (x + y) as u8]));
        let back = mat_to_frame(&frame_to_mat(&image).unwrap()).unwrap();
        assert_eq!(back, image);
    }

    #[test]
    fn test_mat_to_frame_rejects_grayscale() {
        let mat = Mat::new_rows_cols_with_default(2, 2, opencv::core::CV_8UC1, Scalar::all(0.0)).unwrap();
        assert!(mat_to_frame(&mat).is_err());
    }
}
