use image::{ColorType, GrayImage, Luma, RgbImage, imageops::FilterType};
use ndarray::Array2;

/// Longest raster side after decoding. Bounds memory and runtime for every
/// downstream analyzer regardless of the input resolution.
pub const MAX_DIMENSION: u32 = 512;

/// Decoded, bounded RGB raster shared by the analyzers.
///
/// Created once per analysis request and discarded with it.
#[derive(Debug, Clone)]
pub struct ImageSample {
    pub raster: RgbImage,
    pub width: u32,
    pub height: u32,
    pub original_width: u32,
    pub original_height: u32,
    pub color: ColorType,
}

impl ImageSample {
    /// Decodes arbitrary JPEG/PNG bytes and downscales so the longest side
    /// is at most [`MAX_DIMENSION`]. Returns `None` for undecodable input.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        Self::decode_bounded(bytes, MAX_DIMENSION)
    }

    pub fn decode_bounded(bytes: &[u8], max_dimension: u32) -> Option<Self> {
        let decoded = match image::load_from_memory(bytes) {
            Ok(img) => img,
            Err(e) => {
                log::error!("failed to decode image ({} bytes): {}", bytes.len(), e);
                return None;
            }
        };

        let color = decoded.color();
        let (original_width, original_height) = (decoded.width(), decoded.height());

        let bounded = if original_width.max(original_height) > max_dimension {
            decoded.resize(max_dimension, max_dimension, FilterType::Lanczos3)
        } else {
            decoded
        };

        let raster = bounded.to_rgb8();
        let (width, height) = raster.dimensions();

        Some(Self {
            raster,
            width,
            height,
            original_width,
            original_height,
            color,
        })
    }
}

pub fn rgb_to_gray(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut gray = GrayImage::new(width, height);

    for (x, y, pixel) in image.enumerate_pixels() {
        let lum =
            (0.299 * pixel[0] as f64 + 0.587 * pixel[1] as f64 + 0.114 * pixel[2] as f64) as u8;
        gray.put_pixel(x, y, Luma([lum]));
    }

    gray
}

pub fn gray_to_array(image: &GrayImage) -> Array2<f64> {
    let (width, height) = image.dimensions();
    let mut arr = Array2::zeros((height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        arr[[y as usize, x as usize]] = pixel[0] as f64;
    }

    arr
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([120, 80, 40]));
        let mut buffer = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, image::ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_decode_keeps_small_images() {
        let sample = ImageSample::decode(&png_bytes(64, 48)).unwrap();
        assert_eq!((sample.width, sample.height), (64, 48));
        assert_eq!((sample.original_width, sample.original_height), (64, 48));
    }

    #[test]
    fn test_decode_bounds_longest_side() {
        let sample = ImageSample::decode(&png_bytes(1024, 512)).unwrap();
        assert_eq!(sample.width, MAX_DIMENSION);
        assert_eq!(sample.height, MAX_DIMENSION / 2);
        assert_eq!(sample.original_width, 1024);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(ImageSample::decode(b"definitely not an image").is_none());
        assert!(ImageSample::decode(&[]).is_none());
    }

    #[test]
    fn test_rgb_to_gray_luma_weights() {
        let img = RgbImage::from_pixel(2, 2, Rgb([255, 0, 0]));
        let gray = rgb_to_gray(&img);
        assert_eq!(gray.get_pixel(0, 0)[0], 76); // 0.299 * 255
    }
}
