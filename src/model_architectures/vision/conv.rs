//! Per-category convolutional classifiers.
//!
//! The registry's per-crop disease models: VGG-style stacks of 3x3
//! convolutions with ReLU and 2x2 max-pooling, followed by fully
//! connected layers. The dispatcher treats them as black boxes behind
//! [`ImageClassifier`]; the architecture shape comes from the artifact's
//! `config.json` so differently sized exports load through the same code.

use std::path::Path;

use anyhow::Result;
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{conv2d, linear, Conv2d, Conv2dConfig, Linear, VarBuilder};
use serde::Deserialize;

use crate::core::{ServingError, ServingResult};
use crate::model_architectures::traits::ImageClassifier;

fn default_input_size() -> usize {
    224
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConvNetConfig {
    #[serde(default = "default_input_size")]
    pub input_size: usize,
    /// Convolution widths per block; each block ends in a 2x2 max-pool.
    pub block_channels: Vec<Vec<usize>>,
    /// Hidden fully-connected widths between flatten and the class head.
    pub fc_sizes: Vec<usize>,
    pub num_classes: usize,
}

impl ConvNetConfig {
    pub fn from_file(path: &Path) -> ServingResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ServingError::io("read ConvNet config", path, e))?;
        let config: ConvNetConfig =
            serde_json::from_str(&raw).map_err(|e| ServingError::Validation {
                field: format!("ConvNet config {}", path.display()),
                expected: "valid ConvNet config JSON".to_string(),
                actual: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Spatial size after all pooling stages.
    fn final_spatial(&self) -> usize {
        self.input_size >> self.block_channels.len()
    }

    pub fn validate(&self) -> ServingResult<()> {
        if self.block_channels.is_empty() || self.block_channels.iter().any(|b| b.is_empty()) {
            return Err(ServingError::Validation {
                field: "block_channels".to_string(),
                expected: "at least one non-empty conv block".to_string(),
                actual: format!("{:?}", self.block_channels),
            });
        }
        if self.input_size % (1 << self.block_channels.len()) != 0 {
            return Err(ServingError::Validation {
                field: "input_size".to_string(),
                expected: format!("multiple of {}", 1 << self.block_channels.len()),
                actual: self.input_size.to_string(),
            });
        }
        if self.num_classes == 0 {
            return Err(ServingError::Validation {
                field: "num_classes".to_string(),
                expected: "at least one class".to_string(),
                actual: "0".to_string(),
            });
        }
        Ok(())
    }
}

pub struct ConvNetClassifier {
    config: ConvNetConfig,
    /// Conv layers grouped by block; pooling happens between blocks.
    blocks: Vec<Vec<Conv2d>>,
    fc_layers: Vec<Linear>,
    head: Linear,
}

impl ConvNetClassifier {
    /// Load from a directory holding `config.json` + `model.safetensors`.
    pub fn from_dir(dir: &Path, device: &Device) -> ServingResult<Self> {
        let config = ConvNetConfig::from_file(&dir.join("config.json"))?;
        let weights = dir.join("model.safetensors");
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[&weights], DType::F32, device) }
            .map_err(|e| ServingError::model("load ConvNet weights", e))?;
        Self::load(config, vb)
    }

    pub fn load(config: ConvNetConfig, vb: VarBuilder) -> ServingResult<Self> {
        config.validate()?;
        let conv_cfg = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };

        let mut blocks = Vec::with_capacity(config.block_channels.len());
        let mut in_channels = 3;
        for (b, widths) in config.block_channels.iter().enumerate() {
            let mut layers = Vec::with_capacity(widths.len());
            for (j, &out_channels) in widths.iter().enumerate() {
                let conv = conv2d(
                    in_channels,
                    out_channels,
                    3,
                    conv_cfg,
                    vb.pp(format!("blocks.{}.{}", b, j)),
                )
                .map_err(|e| ServingError::model(format!("load conv block {} layer {}", b, j), e))?;
                layers.push(conv);
                in_channels = out_channels;
            }
            blocks.push(layers);
        }

        let spatial = config.final_spatial();
        let mut in_features = in_channels * spatial * spatial;
        let mut fc_layers = Vec::with_capacity(config.fc_sizes.len());
        for (i, &width) in config.fc_sizes.iter().enumerate() {
            let fc = linear(in_features, width, vb.pp(format!("classifier.{}", i)))
                .map_err(|e| ServingError::model(format!("load fc layer {}", i), e))?;
            fc_layers.push(fc);
            in_features = width;
        }
        let head = linear(
            in_features,
            config.num_classes,
            vb.pp(format!("classifier.{}", config.fc_sizes.len())),
        )
        .map_err(|e| ServingError::model("load ConvNet head", e))?;

        Ok(Self {
            config,
            blocks,
            fc_layers,
            head,
        })
    }
}

impl ImageClassifier for ConvNetClassifier {
    fn forward(&self, image: &Tensor) -> Result<Vec<f32>> {
        let (height, width, _channels) = image.dims3()?;
        if height != self.config.input_size || width != self.config.input_size {
            anyhow::bail!(
                "expected {0}x{0} input, got {1}x{2}; input must be resized first",
                self.config.input_size,
                height,
                width
            );
        }

        // HWC -> NCHW for the convolution stack.
        let mut x = image.permute((2, 0, 1))?.contiguous()?.unsqueeze(0)?;
        for block in &self.blocks {
            for conv in block {
                x = conv.forward(&x)?.relu()?;
            }
            x = x.max_pool2d(2)?;
        }

        let mut x = x.flatten_from(1)?;
        for fc in &self.fc_layers {
            x = fc.forward(&x)?.relu()?;
        }
        let scores = self.head.forward(&x)?.squeeze(0)?;
        Ok(scores.to_vec1::<f32>()?)
    }

    fn num_classes(&self) -> usize {
        self.config.num_classes
    }
}
