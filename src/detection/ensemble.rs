use num_complex::Complex;
use rayon::prelude::*;
use rustfft::FftPlanner;
use statrs::statistics::Statistics;

use crate::{
    AiDetectionResult, ElaResult, ModelKind,
    analysis::ela::MEAN_DIFF_CEILING,
    detection::round4,
    image_utils::{ImageSample, gray_to_array, rgb_to_gray},
};

const ELA_WEIGHT: f64 = 0.35;
const FREQUENCY_WEIGHT: f64 = 0.25;
const COLOR_WEIGHT: f64 = 0.20;
const EDGE_WEIGHT: f64 = 0.20;

/// Substitute for a sub-signal that could not be computed.
const NEUTRAL_SCORE: f64 = 0.3;

const SIGMOID_STEEPNESS: f64 = 8.0;
const SIGMOID_MIDPOINT: f64 = 0.45;

/// Fusion of four weak numeric signals into a deepfake likelihood. Used when
/// no learned model is available, and as the per-request fallback when model
/// inference fails.
pub struct StatisticalEnsemble;

impl StatisticalEnsemble {
    pub fn predict(sample: Option<&ImageSample>, ela: Option<&ElaResult>) -> AiDetectionResult {
        let Some(sample) = sample else {
            return Self::degraded();
        };

        let ela_score = ela
            .map(|stats| (stats.mean_diff / MEAN_DIFF_CEILING).min(1.0))
            .unwrap_or(0.0);
        let frequency = Self::frequency_score(sample).unwrap_or(NEUTRAL_SCORE);
        let color = Self::color_score(sample).unwrap_or(NEUTRAL_SCORE);
        let edge = Self::edge_score(sample).unwrap_or(NEUTRAL_SCORE);

        let probability = Self::fuse(ela_score, frequency, color, edge);
        let confidence = 0.6 + 0.2 * (probability - 0.5).abs() * 2.0;

        AiDetectionResult {
            probability: round4(probability),
            confidence: round4(confidence),
            model_used: ModelKind::StatisticalEnsemble,
        }
    }

    /// "No opinion": fixed result for input no detector could decode.
    pub fn degraded() -> AiDetectionResult {
        AiDetectionResult {
            probability: 0.5,
            confidence: 0.3,
            model_used: ModelKind::StatisticalEnsembleDegraded,
        }
    }

    /// Weighted sum pushed through a sigmoid tuned to spread mid-range raw
    /// scores, clamped away from absolute certainty.
    pub(crate) fn fuse(ela: f64, frequency: f64, color: f64, edge: f64) -> f64 {
        let raw = ELA_WEIGHT * ela
            + FREQUENCY_WEIGHT * frequency
            + COLOR_WEIGHT * color
            + EDGE_WEIGHT * edge;

        let probability = 1.0 / (1.0 + (-SIGMOID_STEEPNESS * (raw - SIGMOID_MIDPOINT)).exp());
        probability.clamp(0.01, 0.99)
    }

    /// Energy distribution of the 2-D spectrum. Resampled or generated images
    /// tend to deviate from the high-frequency energy share of camera output.
    fn frequency_score(sample: &ImageSample) -> Option<f64> {
        let gray = gray_to_array(&rgb_to_gray(&sample.raster));
        let (height, width) = gray.dim();
        if height < 8 || width < 8 {
            return None;
        }

        let mut spectrum: Vec<Complex<f64>> =
            gray.iter().map(|&v| Complex::new(v, 0.0)).collect();

        let mut planner = FftPlanner::new();
        let row_fft = planner.plan_fft_forward(width);
        let col_fft = planner.plan_fft_forward(height);

        spectrum
            .par_chunks_exact_mut(width)
            .for_each(|row| row_fft.process(row));

        // Transpose so each column becomes contiguous for the second pass.
        let mut transposed = vec![Complex::new(0.0, 0.0); spectrum.len()];
        for y in 0..height {
            for x in 0..width {
                transposed[x * height + y] = spectrum[y * width + x];
            }
        }
        transposed
            .par_chunks_exact_mut(height)
            .for_each(|column| col_fft.process(column));

        let radius = (height.min(width) / 4) as f64;
        let mut total_energy = 0.0;
        let mut low_energy = 0.0;

        for x in 0..width {
            for y in 0..height {
                let magnitude = (1.0 + transposed[x * height + y].norm()).ln();
                total_energy += magnitude;

                // Wrapped distance to DC equals the distance to the center of
                // the shifted spectrum.
                let dy = y.min(height - y) as f64;
                let dx = x.min(width - x) as f64;
                if dx * dx + dy * dy <= radius * radius {
                    low_energy += magnitude;
                }
            }
        }

        let ratio = (total_energy - low_energy) / (total_energy + 1e-10);
        Some(((ratio - 0.7).abs() * 3.0).min(1.0))
    }

    /// Per-channel histogram irregularity: empty bins and dominant spikes.
    fn color_score(sample: &ImageSample) -> Option<f64> {
        let raster = &sample.raster;
        let pixel_count = (raster.width() * raster.height()) as f64;
        if pixel_count == 0.0 {
            return None;
        }

        let mut histograms = [[0u32; 256]; 3];
        for pixel in raster.pixels() {
            for channel in 0..3 {
                histograms[channel][pixel[channel] as usize] += 1;
            }
        }

        let mut channel_scores = 0.0;
        for histogram in &histograms {
            let empty_bins = histogram.iter().filter(|&&count| count == 0).count() as f64 / 256.0;
            let peak_mass =
                histogram.iter().copied().max().unwrap_or(0) as f64 / (pixel_count + 1e-10);
            channel_scores += empty_bins * 0.5 + peak_mass * 2.0;
        }

        Some((channel_scores / 3.0).clamp(0.0, 1.0))
    }

    /// Variance of edge density across a 4x4 grid; splices concentrate or
    /// starve edges in some blocks.
    fn edge_score(sample: &ImageSample) -> Option<f64> {
        let gray = rgb_to_gray(&sample.raster);
        let (width, height) = gray.dimensions();
        if width < 4 || height < 4 {
            return None;
        }

        let edges = imageproc::edges::canny(&gray, 100.0, 200.0);
        let block_width = width / 4;
        let block_height = height / 4;

        let mut densities = Vec::with_capacity(16);
        for gy in 0..4 {
            for gx in 0..4 {
                let mut sum = 0.0;
                for y in gy * block_height..(gy + 1) * block_height {
                    for x in gx * block_width..(gx + 1) * block_width {
                        sum += edges.get_pixel(x, y)[0] as f64;
                    }
                }
                densities.push(sum / (block_width * block_height) as f64 / 255.0);
            }
        }

        let variance = densities.iter().population_variance();
        Some((variance * 20.0).clamp(0.0, 1.0))
    }
}
