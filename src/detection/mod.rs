pub mod ensemble;
pub mod model;

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    AiDetectionResult, ElaResult, ModelKind,
    detection::{ensemble::StatisticalEnsemble, model::MesoNet},
    image_utils::ImageSample,
};

/// Confidence reported whenever the learned model produced the probability.
const LEARNED_MODEL_CONFIDENCE: f64 = 0.85;

enum ModelState {
    Unloaded,
    Ready(Arc<MesoNet>),
    /// Terminal: no weights configured, or loading failed once. The
    /// statistical ensemble serves every further request.
    Unavailable,
}

/// Process-wide detector handle. The learned model is loaded lazily, at most
/// once; the mutex held across the load makes concurrent first requests wait
/// for a single outcome instead of racing their own attempts.
pub struct AiDetector {
    model_path: Option<PathBuf>,
    state: Mutex<ModelState>,
}

impl AiDetector {
    pub fn new(model_path: Option<PathBuf>) -> Self {
        Self {
            model_path,
            state: Mutex::new(ModelState::Unloaded),
        }
    }

    /// Produces the deepfake-likelihood estimate for one request. The learned
    /// model is preferred when loaded; an inference failure falls back to the
    /// ensemble for this request only.
    pub fn predict(
        &self,
        sample: Option<&ImageSample>,
        ela: Option<&ElaResult>,
    ) -> AiDetectionResult {
        if let (Some(model), Some(sample)) = (self.learned_model(), sample) {
            match model.infer(sample) {
                Ok(probability) => {
                    return AiDetectionResult {
                        probability: round4(probability),
                        confidence: LEARNED_MODEL_CONFIDENCE,
                        model_used: ModelKind::LearnedModel,
                    };
                }
                Err(e) => {
                    log::warn!(
                        "model inference failed: {}; using statistical ensemble for this request",
                        e
                    );
                }
            }
        }

        StatisticalEnsemble::predict(sample, ela)
    }

    fn learned_model(&self) -> Option<Arc<MesoNet>> {
        let mut state = self.state.lock();

        if let ModelState::Unloaded = *state {
            *state = match &self.model_path {
                None => {
                    log::debug!("no model weights configured; using statistical ensemble");
                    ModelState::Unavailable
                }
                Some(path) => match MesoNet::load(path) {
                    Ok(model) => {
                        log::info!("learned detector loaded from {}", path.display());
                        ModelState::Ready(Arc::new(model))
                    }
                    Err(e) => {
                        log::warn!(
                            "failed to load model weights from {}: {}; \
                             falling back to the statistical ensemble permanently",
                            path.display(),
                            e
                        );
                        ModelState::Unavailable
                    }
                },
            };
        }

        match &*state {
            ModelState::Ready(model) => Some(model.clone()),
            _ => None,
        }
    }
}

pub(crate) fn round4(value: f64) -> f64 {
    (value * 1e4).round() / 1e4
}
