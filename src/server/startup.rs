//! Startup loading: taxonomy, per-category classifiers, the default ViT,
//! and both tabular recommenders. All blocking I/O lives here, outside
//! the request path; any failure aborts before the server starts serving.

use std::collections::HashMap;

use candle_core::Device;
use rayon::prelude::*;
use tracing::info;

use crate::core::{ServingConfig, ServingError, ServingResult};
use crate::dispatcher::InferenceDispatcher;
use crate::model_architectures::vision::{ConvNetClassifier, VitClassifier};
use crate::model_architectures::{ImageClassifier, RandomForest};
use crate::registry::ModelRegistry;
use crate::taxonomy::LabelTaxonomy;

use super::AppState;

pub fn build_state(config: &ServingConfig) -> ServingResult<AppState> {
    let device = if config.use_cpu {
        Device::Cpu
    } else {
        Device::cuda_if_available(0).map_err(|e| ServingError::model("select device", e))?
    };

    info!(path = %config.taxonomy_path.display(), "loading label taxonomy");
    let taxonomy = LabelTaxonomy::from_file(&config.taxonomy_path)?;

    info!(dir = %config.vit_model_dir.display(), "loading default vision transformer");
    let vit = VitClassifier::from_dir(&config.vit_model_dir, &device)?;

    // Per-category classifiers load independently; a single bad artifact
    // still aborts the whole startup.
    let loaded: Vec<(String, ServingResult<ConvNetClassifier>)> = config
        .category_models
        .par_iter()
        .map(|(name, dir)| (name.clone(), ConvNetClassifier::from_dir(dir, &device)))
        .collect();

    let mut categories: HashMap<String, Box<dyn ImageClassifier>> = HashMap::new();
    for (name, result) in loaded {
        let model = result?;
        info!(
            category = %name,
            classes = model.num_classes(),
            "loaded category classifier"
        );
        categories.insert(name, Box::new(model));
    }

    let registry = ModelRegistry::new(Box::new(vit), categories);
    let dispatcher = InferenceDispatcher::new(registry, taxonomy, device)?;

    info!(path = %config.crop_recommender_path.display(), "loading crop recommender");
    let crop_recommender = RandomForest::from_file(&config.crop_recommender_path)?;
    info!(path = %config.fertilizer_recommender_path.display(), "loading fertilizer recommender");
    let fertilizer_recommender = RandomForest::from_file(&config.fertilizer_recommender_path)?;

    Ok(AppState {
        dispatcher,
        crop_recommender,
        fertilizer_recommender,
    })
}
