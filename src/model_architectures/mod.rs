//! Model architectures served by the registry.
//!
//! Every image model, whether a per-category ConvNet or the default
//! vision transformer, is consumed through the single [`ImageClassifier`]
//! capability in `traits`. The tabular recommenders live in `tabular`
//! and are deliberately interface-thin: fitted estimators evaluated as
//! pure functions.

pub mod tabular;
pub mod traits;
pub mod vision;

pub use tabular::RandomForest;
pub use traits::ImageClassifier;
pub use vision::{ConvNetClassifier, PreprocessMode, VitClassifier};
