//! The polymorphic classifier seam.
//!
//! The registry stores every image model behind this one trait instead of
//! a per-family hierarchy: a loaded model is a forward pass from a
//! preprocessed image tensor to a per-class score vector, nothing more.

use anyhow::Result;
use candle_core::Tensor;

/// A loaded, ready-to-invoke image classifier.
///
/// `forward` takes the preprocessed HWC image tensor (`[224, 224, 3]`,
/// f32) and returns one score per class. Implementations hold only
/// immutable weights after load, so a single instance supports
/// concurrent invocation from multiple requests.
pub trait ImageClassifier: Send + Sync {
    fn forward(&self, image: &Tensor) -> Result<Vec<f32>>;

    /// Number of classes this model scores.
    fn num_classes(&self) -> usize;
}
