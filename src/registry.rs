//! Model registry: one classifier per known category plus the default
//! vision transformer.
//!
//! Built explicitly at startup and passed into the dispatcher as a value
//! rather than referenced as ambient global state. Read-only after
//! construction; every entry is `Send + Sync`, so concurrent requests
//! resolve and invoke models without locking.

use std::collections::HashMap;

use crate::core::{ServingError, ServingResult};
use crate::model_architectures::vision::PreprocessMode;
use crate::model_architectures::ImageClassifier;
use crate::taxonomy::DEFAULT_KEY;

/// Outcome of resolving a request's category.
pub struct ResolvedModel<'a> {
    pub model: &'a dyn ImageClassifier,
    pub mode: PreprocessMode,
    /// Key into the label taxonomy: the category, or "all" for the
    /// default model.
    pub taxonomy_key: &'a str,
}

impl std::fmt::Debug for ResolvedModel<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedModel")
            .field("mode", &self.mode)
            .field("taxonomy_key", &self.taxonomy_key)
            .field("num_classes", &self.model.num_classes())
            .finish()
    }
}

pub struct ModelRegistry {
    categories: HashMap<String, Box<dyn ImageClassifier>>,
    default_model: Box<dyn ImageClassifier>,
}

impl ModelRegistry {
    pub fn new(
        default_model: Box<dyn ImageClassifier>,
        categories: HashMap<String, Box<dyn ImageClassifier>>,
    ) -> Self {
        Self {
            categories,
            default_model,
        }
    }

    /// Registered category names, sorted for stable logs and the
    /// registration payload.
    pub fn category_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.categories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve a category to its classifier and preprocessing mode.
    ///
    /// An absent or empty category selects the default vision transformer
    /// with symmetric [-1, 1] normalization. A present-but-unknown
    /// category is a client error; there is no fallback.
    pub fn resolve(&self, category: Option<&str>) -> ServingResult<ResolvedModel<'_>> {
        match category {
            None | Some("") => Ok(ResolvedModel {
                model: self.default_model.as_ref(),
                mode: PreprocessMode::Symmetric,
                taxonomy_key: DEFAULT_KEY,
            }),
            Some(name) => match self.categories.get_key_value(name) {
                Some((key, model)) => Ok(ResolvedModel {
                    model: model.as_ref(),
                    mode: PreprocessMode::Unit,
                    taxonomy_key: key,
                }),
                None => Err(ServingError::UnknownCategory {
                    category: name.to_string(),
                }),
            },
        }
    }
}
