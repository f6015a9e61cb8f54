pub mod visualization;

use crate::{
    AiDetectionResult, ElaResult, MetadataResult, VerdictLabel, VerdictResult,
    analysis::ela::MEAN_DIFF_CEILING,
    metadata::exif::is_editing_software,
};

const METADATA_WEIGHT: f64 = 0.25;
const ELA_WEIGHT: f64 = 0.35;
const AI_WEIGHT: f64 = 0.40;

const AUTHENTIC_BAND: f64 = 35.0;
const SUSPICIOUS_BAND: f64 = 65.0;

/// Below this AI probability, a missing-provenance image is treated as a
/// distinct synthetic-media failure mode rather than "authentic".
const SYNTHETIC_AI_THRESHOLD: f64 = 0.35;

const MISSING_EXIF_FLOOR: f64 = 30.0;
const MISSING_EXIF_BOOST: f64 = 1.3;

/// Provenance risk on a 0-100 scale. Floor-raises, not additive: the highest
/// matching condition wins.
pub fn metadata_risk(metadata: &MetadataResult) -> f64 {
    let mut risk = 0.0;

    if !metadata.has_exif {
        risk = 60.0;
    }
    if let Some(software) = &metadata.software {
        if is_editing_software(software) {
            risk = f64::max(risk, 80.0);
        }
    }
    if !metadata.warnings.is_empty() {
        risk = f64::max(risk, 40.0);
    }

    risk
}

/// Fuses the three component scores into the final 0-100 manipulation score
/// and its categorical verdict.
pub fn classify(
    metadata: &MetadataResult,
    ela: &ElaResult,
    ai: &AiDetectionResult,
) -> VerdictResult {
    let risk = metadata_risk(metadata);
    let ela_contribution = (ela.mean_diff / MEAN_DIFF_CEILING * 100.0).min(100.0);
    let ai_contribution = ai.probability * 100.0;

    let mut score =
        METADATA_WEIGHT * risk + ELA_WEIGHT * ela_contribution + AI_WEIGHT * ai_contribution;

    // Absence of provenance is itself evidence: floor the weighted base,
    // then compound it.
    if !metadata.has_exif {
        score = score.max(MISSING_EXIF_FLOOR);
        score = (score * MISSING_EXIF_BOOST).min(100.0);
        log::info!("missing EXIF: manipulation score boosted to {:.1}", score);
    }

    let score = round1(score.min(100.0));

    let label = if !metadata.has_exif && ai.probability < SYNTHETIC_AI_THRESHOLD {
        VerdictLabel::PotentialSyntheticMedia
    } else if score < AUTHENTIC_BAND {
        VerdictLabel::LikelyAuthentic
    } else if score < SUSPICIOUS_BAND {
        VerdictLabel::Suspicious
    } else {
        VerdictLabel::LikelyManipulated
    };

    VerdictResult { score, label }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MetadataStatus, ModelKind};
    use std::collections::BTreeMap;

    fn metadata(has_exif: bool) -> MetadataResult {
        MetadataResult {
            has_exif,
            status: if has_exif {
                MetadataStatus::Present
            } else {
                MetadataStatus::Inconclusive
            },
            camera_make: None,
            camera_model: None,
            software: None,
            date_taken: None,
            gps: None,
            warnings: if has_exif {
                Vec::new()
            } else {
                vec!["No EXIF data found.".into()]
            },
            all_tags: BTreeMap::new(),
        }
    }

    fn ela(mean_diff: f64) -> ElaResult {
        ElaResult {
            heatmap_png: Vec::new(),
            mean_diff,
            max_diff: mean_diff * 2.0,
        }
    }

    fn ai(probability: f64) -> AiDetectionResult {
        AiDetectionResult {
            probability,
            confidence: 0.6,
            model_used: ModelKind::StatisticalEnsemble,
        }
    }

    #[test]
    fn test_metadata_risk_floors() {
        assert_eq!(metadata_risk(&metadata(false)), 60.0);
        assert_eq!(metadata_risk(&metadata(true)), 0.0);

        let mut edited = metadata(true);
        edited.software = Some("Adobe Photoshop 25.1".into());
        edited.warnings.push("Editing software detected".into());
        assert_eq!(metadata_risk(&edited), 80.0);

        let mut warned = metadata(true);
        warned.warnings.push("something odd".into());
        assert_eq!(metadata_risk(&warned), 40.0);
    }

    #[test]
    fn test_worked_fusion_example() {
        // risk 60, ELA 33.3, AI 50 -> base 46.67, floored (no-op), x1.3 = 60.7.
        let verdict = classify(&metadata(false), &ela(10.0), &ai(0.5));

        assert_eq!(verdict.score, 60.7);
        assert_eq!(verdict.label, VerdictLabel::Suspicious);
    }

    #[test]
    fn test_synthetic_override_beats_numeric_bands() {
        // Base score would land in the authentic band; the low-AI/no-EXIF
        // combination still wins.
        let verdict = classify(&metadata(false), &ela(0.0), &ai(0.2));

        assert!(verdict.score < SUSPICIOUS_BAND);
        assert_eq!(verdict.label, VerdictLabel::PotentialSyntheticMedia);
    }

    #[test]
    fn test_no_override_when_exif_present() {
        let verdict = classify(&metadata(true), &ela(0.0), &ai(0.2));
        assert_eq!(verdict.label, VerdictLabel::LikelyAuthentic);
    }

    #[test]
    fn test_likely_manipulated_band() {
        let mut edited = metadata(true);
        edited.software = Some("GIMP 2.10".into());
        edited.warnings.push("Editing software detected".into());

        let verdict = classify(&edited, &ela(30.0), &ai(0.9));
        assert_eq!(verdict.label, VerdictLabel::LikelyManipulated);
        assert!(verdict.score >= SUSPICIOUS_BAND);
    }

    #[test]
    fn test_score_bounded_and_rounded() {
        let verdict = classify(&metadata(false), &ela(500.0), &ai(0.99));
        assert_eq!(verdict.score, 100.0);

        let verdict = classify(&metadata(true), &ela(0.0), &ai(0.0));
        assert_eq!(verdict.score, 0.0);

        let verdict = classify(&metadata(false), &ela(3.7), &ai(0.41));
        assert!((0.0..=100.0).contains(&verdict.score));
        assert!((verdict.score * 10.0 - (verdict.score * 10.0).round()).abs() < 1e-9);
    }

    #[test]
    fn test_missing_exif_floor_and_boost() {
        // risk 60, ELA 0, AI 50 -> base 35, floor is a no-op, x1.3 = 45.5.
        let verdict = classify(&metadata(false), &ela(0.0), &ai(0.5));
        assert_eq!(verdict.score, 45.5);
        assert_eq!(verdict.label, VerdictLabel::Suspicious);

        // risk 60 only -> base 15, floored at 30, x1.3 = 39; the low AI
        // probability then triggers the synthetic-media override.
        let verdict = classify(&metadata(false), &ela(0.0), &ai(0.0));
        assert_eq!(verdict.score, 39.0);
        assert_eq!(verdict.label, VerdictLabel::PotentialSyntheticMedia);
    }
}
