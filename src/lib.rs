//! agrovision: HTTP inference for crop disease classification and
//! crop/fertilizer recommendation.
//!
//! Requests are routed to one of several pretrained per-crop classifiers
//! selected by a caller-supplied category, or to a default vision
//! transformer covering the full disease taxonomy when no category is
//! given. The registry, taxonomy, and recommenders are loaded once at
//! startup and immutable afterwards; every request is an independent
//! pure computation over that state.
//!
//! Module map:
//! - [`core`] - errors and configuration
//! - [`model_architectures`] - the ViT, the per-category ConvNets, and
//!   the tabular forests behind one classifier trait
//! - [`registry`] - category -> classifier resolution
//! - [`taxonomy`] - class index -> label translation
//! - [`dispatcher`] - preprocess, forward, decode
//! - [`server`] - axum routes, startup loading, category registration

pub mod core;
pub mod dispatcher;
pub mod model_architectures;
pub mod registry;
pub mod server;
pub mod taxonomy;

pub use self::core::{ServingConfig, ServingError, ServingResult};
pub use dispatcher::{InferenceDispatcher, Prediction};
pub use model_architectures::{ImageClassifier, RandomForest};
pub use registry::ModelRegistry;
pub use taxonomy::LabelTaxonomy;
