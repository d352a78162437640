//! Top-level inference entry point.
//!
//! Resolves the category, preprocesses the image for the selected model
//! family, runs the forward pass, and decodes the score vector into a
//! labeled prediction. Fully request-scoped: no shared state is mutated
//! anywhere on this path.

use candle_core::Device;
use serde::Serialize;
use tracing::debug;

use crate::core::{ServingError, ServingResult};
use crate::model_architectures::vision::preprocess_image;
use crate::registry::ModelRegistry;
use crate::taxonomy::LabelTaxonomy;

/// Decoded inference result.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    /// Index of the highest-probability class.
    pub max: usize,
    /// Percentage in [0, 100].
    pub confidence: f32,
    /// Human-readable label for `max` in the resolved taxonomy.
    pub id: String,
}

pub struct InferenceDispatcher {
    registry: ModelRegistry,
    taxonomy: LabelTaxonomy,
    device: Device,
}

impl InferenceDispatcher {
    /// Build the dispatcher, checking that every registered category
    /// (and the default key) has a taxonomy entry. Label-count mismatches
    /// are deliberately left to decode time, where they surface as
    /// `TaxonomyMismatch`.
    pub fn new(
        registry: ModelRegistry,
        taxonomy: LabelTaxonomy,
        device: Device,
    ) -> ServingResult<Self> {
        for name in registry.category_names() {
            if !taxonomy.contains(name) {
                return Err(ServingError::Validation {
                    field: "taxonomy".to_string(),
                    expected: format!("an entry for registered category '{}'", name),
                    actual: "missing".to_string(),
                });
            }
        }
        Ok(Self {
            registry,
            taxonomy,
            device,
        })
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Classify an image, optionally constrained to a category.
    pub fn predict(&self, image_bytes: &[u8], category: Option<&str>) -> ServingResult<Prediction> {
        // Resolve first: an unknown category must fail before any model
        // or decoder work happens.
        let resolved = self.registry.resolve(category)?;
        debug!(
            category = resolved.taxonomy_key,
            mode = ?resolved.mode,
            "resolved inference request"
        );

        let tensor = preprocess_image(image_bytes, resolved.mode, &self.device)?;
        let scores = resolved
            .model
            .forward(&tensor)
            .map_err(|e| ServingError::prediction("model forward", e))?;
        if scores.is_empty() {
            return Err(ServingError::prediction(
                "model forward",
                "empty score vector",
            ));
        }

        let probs = normalize_scores(&scores);
        let (max, confidence) = argmax_confidence(&probs);
        let id = self.taxonomy.label(resolved.taxonomy_key, max)?.to_string();

        Ok(Prediction {
            max,
            confidence,
            id,
        })
    }
}

/// Bring a score vector into probability form.
///
/// Persisted heads from the training pipeline end in a terminal softmax,
/// so their outputs are already distributions and pass through untouched.
/// Anything else (a head exported without the activation) goes through a
/// numerically stable softmax so confidence stays within [0, 100].
fn normalize_scores(scores: &[f32]) -> Vec<f32> {
    let sum: f32 = scores.iter().sum();
    let is_distribution =
        scores.iter().all(|s| (0.0..=1.0).contains(s)) && (sum - 1.0).abs() <= 1e-3;
    if is_distribution {
        return scores.to_vec();
    }

    let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.iter().map(|e| e / total).collect()
}

fn argmax_confidence(probs: &[f32]) -> (usize, f32) {
    let (index, &prob) = probs
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .expect("probs checked non-empty");
    (index, prob * 100.0)
}
