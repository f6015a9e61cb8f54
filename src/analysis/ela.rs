use std::io::Cursor;

use image::{GrayImage, RgbImage, codecs::jpeg::JpegEncoder};
use rayon::prelude::*;
use statrs::statistics::{Data, OrderStatistics};

use crate::{
    ElaResult,
    error::Result,
    image_utils::ImageSample,
    report::visualization,
};

/// Normalization ceiling for the mean recompression difference; shared with
/// the score fusion in `report`.
pub const MEAN_DIFF_CEILING: f64 = 30.0;

/// Error-level analysis: recompress at a fixed JPEG quality and measure how
/// far each pixel moves. Uniformly compressed images move uniformly little;
/// spliced or locally edited regions move differently from their surroundings.
pub struct ElaAnalyzer {
    quality: u8,
    amplification: f64,
}

impl ElaAnalyzer {
    pub fn new(quality: u8) -> Self {
        Self {
            quality,
            amplification: 15.0,
        }
    }

    pub fn with_amplification(mut self, amplification: f64) -> Self {
        self.amplification = amplification;
        self
    }

    /// Analyzes raw image bytes. Undecodable input yields the zeroed result.
    pub fn analyze(&self, bytes: &[u8]) -> ElaResult {
        match ImageSample::decode(bytes) {
            Some(sample) => self.analyze_sample(&sample),
            None => ElaResult::degraded(),
        }
    }

    pub fn analyze_sample(&self, sample: &ImageSample) -> ElaResult {
        let original = &sample.raster;

        let recompressed = match self.recompress(original) {
            Ok(recompressed) => recompressed,
            Err(e) => {
                log::error!("ELA recompression failed: {}", e);
                return ElaResult::degraded();
            }
        };

        // Same dimensions in, same dimensions out, so the raw buffers line up
        // byte for byte (one byte per channel).
        let diffs: Vec<f64> = original
            .as_raw()
            .par_iter()
            .zip(recompressed.as_raw().par_iter())
            .map(|(&a, &b)| (a as i16 - b as i16).abs() as f64)
            .collect();

        if diffs.is_empty() {
            return ElaResult::degraded();
        }

        let mean_diff = diffs.iter().sum::<f64>() / diffs.len() as f64;
        // Robust max: the 99th percentile of the raw distribution, so a single
        // hot pixel cannot dominate the statistic.
        let mut distribution = Data::new(diffs.clone());
        let max_diff = distribution.percentile(99).max(mean_diff);

        let heatmap_png = match self.render_heatmap(sample, &diffs) {
            Ok(png) => png,
            Err(e) => {
                log::warn!("failed to encode ELA heatmap: {}", e);
                Vec::new()
            }
        };

        ElaResult {
            heatmap_png,
            mean_diff: round2(mean_diff),
            max_diff: round2(max_diff),
        }
    }

    fn recompress(&self, original: &RgbImage) -> Result<RgbImage> {
        let mut buffer = Cursor::new(Vec::new());
        let encoder = JpegEncoder::new_with_quality(&mut buffer, self.quality);
        original.write_with_encoder(encoder)?;

        let recompressed = image::load_from_memory(&buffer.into_inner())?;
        Ok(recompressed.to_rgb8())
    }

    /// Amplifies the per-channel differences, collapses them to one channel
    /// and renders the false-color map.
    fn render_heatmap(&self, sample: &ImageSample, diffs: &[f64]) -> Result<Vec<u8>> {
        let intensities: Vec<u8> = diffs
            .chunks_exact(3)
            .map(|channels| {
                let amplified = channels
                    .iter()
                    .map(|d| (d * self.amplification).min(255.0))
                    .sum::<f64>()
                    / 3.0;
                amplified as u8
            })
            .collect();

        let gray = GrayImage::from_raw(sample.width, sample.height, intensities)
            .unwrap_or_else(|| GrayImage::new(sample.width, sample.height));

        visualization::encode_png(&visualization::render_heatmap(&gray))
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
