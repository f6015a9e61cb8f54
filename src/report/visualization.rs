use std::io::Cursor;

use image::{GrayImage, ImageFormat, Rgb, RgbImage};

use crate::error::Result;

/// Renders a single-channel intensity map through a blue-to-red false-color
/// scale, the usual presentation for recompression-error heatmaps.
pub fn render_heatmap(gray: &GrayImage) -> RgbImage {
    let (width, height) = gray.dimensions();
    let mut heatmap = RgbImage::new(width, height);

    for (x, y, pixel) in gray.enumerate_pixels() {
        let intensity = pixel[0] as f32 / 255.0;
        heatmap.put_pixel(x, y, intensity_to_color(intensity));
    }

    heatmap
}

fn intensity_to_color(intensity: f32) -> Rgb<u8> {
    let intensity = intensity.clamp(0.0, 1.0);

    let (r, g, b) = if intensity < 0.25 {
        let t = intensity / 0.25;
        (0.0, t, 1.0)
    } else if intensity < 0.5 {
        let t = (intensity - 0.25) / 0.25;
        (0.0, 1.0, 1.0 - t)
    } else if intensity < 0.75 {
        let t = (intensity - 0.5) / 0.25;
        (t, 1.0, 0.0)
    } else {
        let t = (intensity - 0.75) / 0.25;
        (1.0, 1.0 - t, 0.0)
    };

    Rgb([(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8])
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(image.clone()).write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}
