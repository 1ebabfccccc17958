use std::path::Path;

use image::imageops::{self, FilterType};
use image::{ImageReader, RgbImage};
use ndarray::Array4;

use super::{ImagePreprocessor, Tensor};
use crate::config::PreprocessOptions;
use crate::error::{Error, Result};

/// CLIP 风格的图片预处理
///
/// 1. 转换为 RGB，丢弃透明通道
/// 2. 等比缩放，使短边等于 `size`
/// 3. 中心裁剪为 `size x size`
/// 4. 像素值缩放到 [0, 1] 后按通道做 `(x - mean) / std`
#[derive(Debug, Clone)]
pub struct ClipPreprocessor {
    size: u32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl ClipPreprocessor {
    pub fn new(size: u32, mean: [f32; 3], std: [f32; 3]) -> Self {
        Self { size, mean, std }
    }

    /// 对已解码的图片进行处理
    pub fn process_image(&self, image: RgbImage) -> Tensor {
        let size = self.size;
        let (w, h) = image.dimensions();
        let (nw, nh) = if w <= h {
            (size, ((size as u64 * h as u64) / w.max(1) as u64).max(size as u64) as u32)
        } else {
            (((size as u64 * w as u64) / h.max(1) as u64).max(size as u64) as u32, size)
        };
        let resized = imageops::resize(&image, nw, nh, FilterType::Triangle);

        let x = (nw - size) / 2;
        let y = (nh - size) / 2;
        let cropped = imageops::crop_imm(&resized, x, y, size, size).to_image();

        let size = size as usize;
        Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            let pixel = cropped.get_pixel(x as u32, y as u32);
            (pixel[c] as f32 / 255. - self.mean[c]) / self.std[c]
        })
    }
}

impl Default for ClipPreprocessor {
    fn default() -> Self {
        Self::new(224, [0.5; 3], [0.5; 3])
    }
}

impl From<&PreprocessOptions> for ClipPreprocessor {
    fn from(opts: &PreprocessOptions) -> Self {
        Self::new(opts.image_size, opts.mean, opts.std)
    }
}

impl ImagePreprocessor for ClipPreprocessor {
    fn preprocess(&self, path: &Path) -> Result<Tensor> {
        let image = ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|e| Error::preprocessing(path, e))?
            .decode()
            .map_err(|e| Error::preprocessing(path, e))?;
        if image.width() == 0 || image.height() == 0 {
            return Err(Error::preprocessing(path, "图片尺寸为 0"));
        }
        Ok(self.process_image(image.to_rgb8()))
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, Rgba, RgbaImage};
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_output_shape() {
        let pre = ClipPreprocessor::new(8, [0.5; 3], [0.5; 3]);
        let tensor = pre.process_image(RgbImage::new(32, 16));
        assert_eq!(tensor.shape(), &[1, 3, 8, 8]);
    }

    #[test]
    fn test_normalization_range() {
        let pre = ClipPreprocessor::default();
        let black = pre.process_image(RgbImage::from_pixel(10, 10, Rgb([0, 0, 0])));
        let white = pre.process_image(RgbImage::from_pixel(10, 10, Rgb([255, 255, 255])));
        assert!(black.iter().all(|&v| (v + 1.).abs() < 1e-6));
        assert!(white.iter().all(|&v| (v - 1.).abs() < 1e-6));
    }

    #[test]
    fn test_channel_order() {
        let pre = ClipPreprocessor::new(4, [0.; 3], [1.; 3]);
        let tensor = pre.process_image(RgbImage::from_pixel(4, 4, Rgb([255, 0, 51])));
        assert!((tensor[[0, 0, 1, 1]] - 1.).abs() < 1e-6);
        assert!(tensor[[0, 1, 1, 1]].abs() < 1e-6);
        assert!((tensor[[0, 2, 1, 1]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_center_crop_wide_image() {
        // 左中右三块颜色，裁剪后只剩中间
        let image = RgbImage::from_fn(30, 10, |x, _| match x {
            0..10 => Rgb([255, 0, 0]),
            10..20 => Rgb([0, 255, 0]),
            _ => Rgb([0, 0, 255]),
        });
        let pre = ClipPreprocessor::new(10, [0.; 3], [1.; 3]);
        let tensor = pre.process_image(image);
        assert!((tensor[[0, 1, 5, 5]] - 1.).abs() < 1e-6);
        assert!(tensor[[0, 0, 5, 5]].abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_rgba_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alpha.png");
        RgbaImage::from_pixel(20, 20, Rgba([255, 255, 255, 0])).save(&path).unwrap();

        let tensor = ClipPreprocessor::default().preprocess(&path).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
    }

    #[test]
    fn test_preprocess_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();

        let err = ClipPreprocessor::default().preprocess(&path).unwrap_err();
        assert!(matches!(err, Error::ImagePreprocessing { .. }));
    }
}
