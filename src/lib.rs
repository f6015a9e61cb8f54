use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::{
    analysis::ela::ElaAnalyzer,
    detection::AiDetector,
    image_utils::{ImageSample, MAX_DIMENSION},
    metadata::exif::ExifExtractor,
};

pub mod error;
pub mod image_utils;
pub mod analysis;
pub mod metadata;
pub mod detection;
pub mod report;

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub ela_quality: u8,
    pub ela_amplification: f64,
    pub max_dimension: u32,
    pub model_path: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            ela_quality: 95,
            ela_amplification: 15.0,
            max_dimension: MAX_DIMENSION,
            model_path: None,
        }
    }
}

impl AnalysisConfig {
    pub fn with_model_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.model_path = Some(path.into());
        self
    }
}

/// Fuses metadata provenance, recompression error analysis and the
/// deepfake-likelihood detector into a single manipulation verdict.
///
/// One pipeline serves the whole process: requests are stateless except for
/// the lazily initialized learned-model handle shared across them.
pub struct ForensicPipeline {
    config: AnalysisConfig,
    ela: ElaAnalyzer,
    detector: AiDetector,
}

impl ForensicPipeline {
    pub fn new(config: AnalysisConfig) -> Self {
        let ela = ElaAnalyzer::new(config.ela_quality)
            .with_amplification(config.ela_amplification);
        let detector = AiDetector::new(config.model_path.clone());

        Self {
            config,
            ela,
            detector,
        }
    }

    /// Runs the full analysis on raw image bytes. Never fails: undecodable
    /// input degrades every component to its neutral result and the caller
    /// still receives a fully populated report.
    pub fn analyze(&self, bytes: &[u8]) -> AnalysisReport {
        let metadata = ExifExtractor::extract(bytes);
        let sample = ImageSample::decode_bounded(bytes, self.config.max_dimension);

        let ela = match &sample {
            Some(sample) => self.ela.analyze_sample(sample),
            None => ElaResult::degraded(),
        };

        let ai_detection = self.detector.predict(sample.as_ref(), Some(&ela));
        let verdict = report::classify(&metadata, &ela, &ai_detection);

        AnalysisReport {
            metadata,
            ela,
            ai_detection,
            verdict,
        }
    }
}

impl Default for ForensicPipeline {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetadataStatus {
    Present,
    #[serde(rename = "Inconclusive / Stripped")]
    Inconclusive,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GpsCoordinates {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetadataResult {
    pub has_exif: bool,
    pub status: MetadataStatus,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub software: Option<String>,
    pub date_taken: Option<String>,
    pub gps: Option<GpsCoordinates>,
    pub warnings: Vec<String>,
    pub all_tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ElaResult {
    /// PNG-encoded false-color heatmap; empty when the input was undecodable.
    /// Storage of the artifact is the caller's concern.
    #[serde(skip)]
    pub heatmap_png: Vec<u8>,
    pub mean_diff: f64,
    pub max_diff: f64,
}

impl ElaResult {
    /// Neutral result for undecodable input.
    pub fn degraded() -> Self {
        Self {
            heatmap_png: Vec::new(),
            mean_diff: 0.0,
            max_diff: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModelKind {
    #[serde(rename = "MesoNet-4")]
    LearnedModel,
    #[serde(rename = "Statistical Ensemble")]
    StatisticalEnsemble,
    #[serde(rename = "Statistical Ensemble (degraded)")]
    StatisticalEnsembleDegraded,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct AiDetectionResult {
    pub probability: f64,
    pub confidence: f64,
    pub model_used: ModelKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VerdictLabel {
    #[serde(rename = "Likely Authentic")]
    LikelyAuthentic,
    Suspicious,
    #[serde(rename = "Likely Manipulated")]
    LikelyManipulated,
    #[serde(rename = "Potential Synthetic Media")]
    PotentialSyntheticMedia,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct VerdictResult {
    pub score: f64,
    pub label: VerdictLabel,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub metadata: MetadataResult,
    pub ela: ElaResult,
    pub ai_detection: AiDetectionResult,
    pub verdict: VerdictResult,
}
