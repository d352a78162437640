//! Vision models and image preprocessing.

pub mod conv;
pub mod image_utils;
pub mod vit;

#[cfg(test)]
mod vit_test;

pub use conv::{ConvNetClassifier, ConvNetConfig};
pub use image_utils::{preprocess_image, PreprocessMode};
pub use vit::{VitClassifier, VitConfig};
