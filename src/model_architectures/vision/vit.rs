//! Vision transformer classifier.
//!
//! The default model covering the full disease taxonomy: non-overlapping
//! patch extraction, learned patch + positional embeddings, a stack of
//! post-norm self-attention encoder blocks, mean pooling, and a linear
//! head. Forward-only: weights come from a safetensors artifact with a
//! sibling `config.json`, and the dropout positions of the trained
//! architecture are identity here.

use std::path::Path;

use anyhow::Result;
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{layer_norm, linear, LayerNorm, Linear, VarBuilder};
use serde::Deserialize;

use crate::core::{ServingError, ServingResult};
use crate::model_architectures::traits::ImageClassifier;

fn default_layer_norm_eps() -> f64 {
    1e-6
}

/// Architecture shape, read from the artifact's `config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct VitConfig {
    pub image_size: usize,
    pub patch_size: usize,
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    /// Per-head attention width. Defaults to `hidden_size / num_attention_heads`;
    /// artifacts exported with a wider per-head key dimension set it explicitly.
    #[serde(default)]
    pub head_dim: Option<usize>,
    pub intermediate_size: usize,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f64,
    pub num_classes: usize,
    /// Training-time objective recorded in the artifact (e.g. "focal").
    /// Carried for provenance only; never evaluated at serving time.
    #[serde(default)]
    pub training_loss: Option<String>,
}

impl VitConfig {
    pub fn from_file(path: &Path) -> ServingResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ServingError::io("read ViT config", path, e))?;
        let config: VitConfig = serde_json::from_str(&raw).map_err(|e| ServingError::Validation {
            field: format!("ViT config {}", path.display()),
            expected: "valid ViT config JSON".to_string(),
            actual: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn head_dim(&self) -> usize {
        self.head_dim
            .unwrap_or(self.hidden_size / self.num_attention_heads)
    }

    pub fn num_patches(&self) -> usize {
        (self.image_size / self.patch_size).pow(2)
    }

    pub fn validate(&self) -> ServingResult<()> {
        if self.patch_size == 0 || self.image_size % self.patch_size != 0 {
            return Err(ServingError::Validation {
                field: "patch_size".to_string(),
                expected: format!("non-zero divisor of image size {}", self.image_size),
                actual: self.patch_size.to_string(),
            });
        }
        if self.num_attention_heads == 0 {
            return Err(ServingError::Validation {
                field: "num_attention_heads".to_string(),
                expected: "at least one head".to_string(),
                actual: "0".to_string(),
            });
        }
        if self.head_dim.is_none() && self.hidden_size % self.num_attention_heads != 0 {
            return Err(ServingError::Validation {
                field: "hidden_size".to_string(),
                expected: format!("multiple of {} heads", self.num_attention_heads),
                actual: self.hidden_size.to_string(),
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

/// Split an HWC image tensor into a row-major sequence of flattened
/// non-overlapping patches: `[H, W, C]` -> `[(H/P)*(W/P), P*P*C]`.
///
/// H and W must be exact multiples of P; resizing to the expected input
/// dimensions is the caller's responsibility.
pub(crate) fn extract_patches(image: &Tensor, patch_size: usize) -> Result<Tensor> {
    let (height, width, channels) = image.dims3()?;
    if patch_size == 0 || height % patch_size != 0 || width % patch_size != 0 {
        anyhow::bail!(
            "image {}x{} is not tileable by patch size {}; input must be resized first",
            height,
            width,
            patch_size
        );
    }
    let grid_h = height / patch_size;
    let grid_w = width / patch_size;
    let patches = image
        .reshape((grid_h, patch_size, grid_w, patch_size, channels))?
        .permute((0, 2, 1, 3, 4))?
        .contiguous()?
        .reshape((grid_h * grid_w, patch_size * patch_size * channels))?;
    Ok(patches)
}

/// Multi-head self-attention with separate q/k/v/out projections.
struct SelfAttention {
    q_proj: Linear,
    k_proj: Linear,
    v_proj: Linear,
    out_proj: Linear,
    num_heads: usize,
    head_dim: usize,
}

impl SelfAttention {
    fn new(config: &VitConfig, vb: VarBuilder) -> Result<Self> {
        let head_dim = config.head_dim();
        let inner = config.num_attention_heads * head_dim;
        let q_proj = linear(config.hidden_size, inner, vb.pp("q_proj"))?;
        let k_proj = linear(config.hidden_size, inner, vb.pp("k_proj"))?;
        let v_proj = linear(config.hidden_size, inner, vb.pp("v_proj"))?;
        let out_proj = linear(inner, config.hidden_size, vb.pp("out_proj"))?;
        Ok(Self {
            q_proj,
            k_proj,
            v_proj,
            out_proj,
            num_heads: config.num_attention_heads,
            head_dim,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (seq_len, _hidden) = x.dims2()?;

        // [seq, inner] -> [heads, seq, head_dim]
        let q = self
            .q_proj
            .forward(x)?
            .reshape((seq_len, self.num_heads, self.head_dim))?
            .transpose(0, 1)?
            .contiguous()?;
        let k = self
            .k_proj
            .forward(x)?
            .reshape((seq_len, self.num_heads, self.head_dim))?
            .transpose(0, 1)?
            .contiguous()?;
        let v = self
            .v_proj
            .forward(x)?
            .reshape((seq_len, self.num_heads, self.head_dim))?
            .transpose(0, 1)?
            .contiguous()?;

        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let attn_weights = (q.matmul(&k.t()?)? * scale)?;
        let attn_weights = candle_nn::ops::softmax_last_dim(&attn_weights)?;
        let attn_output = attn_weights
            .matmul(&v)?
            .transpose(0, 1)?
            .contiguous()?
            .reshape((seq_len, self.num_heads * self.head_dim))?;

        Ok(self.out_proj.forward(&attn_output)?)
    }
}

/// Position-wise feed-forward: D -> D_ff -> D with erf-based GELU
/// (`0.5 * x * (1 + erf(x / sqrt(2)))`) after the first projection.
struct FeedForward {
    fc1: Linear,
    fc2: Linear,
}

impl FeedForward {
    fn new(config: &VitConfig, vb: VarBuilder) -> Result<Self> {
        let fc1 = linear(config.hidden_size, config.intermediate_size, vb.pp("fc1"))?;
        let fc2 = linear(config.intermediate_size, config.hidden_size, vb.pp("fc2"))?;
        Ok(Self { fc1, fc2 })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let hidden = self.fc1.forward(x)?.gelu_erf()?;
        Ok(self.fc2.forward(&hidden)?)
    }
}

/// One post-norm encoder block. Output shape equals input shape, which is
/// what lets the stack grow to arbitrary depth without reshaping.
pub(crate) struct EncoderBlock {
    self_attn: SelfAttention,
    layer_norm1: LayerNorm,
    mlp: FeedForward,
    layer_norm2: LayerNorm,
}

impl EncoderBlock {
    pub(crate) fn new(config: &VitConfig, vb: VarBuilder) -> Result<Self> {
        let self_attn = SelfAttention::new(config, vb.pp("self_attn"))?;
        let layer_norm1 = layer_norm(
            config.hidden_size,
            config.layer_norm_eps,
            vb.pp("layer_norm1"),
        )?;
        let mlp = FeedForward::new(config, vb.pp("mlp"))?;
        let layer_norm2 = layer_norm(
            config.hidden_size,
            config.layer_norm_eps,
            vb.pp("layer_norm2"),
        )?;
        Ok(Self {
            self_attn,
            layer_norm1,
            mlp,
            layer_norm2,
        })
    }

    /// Post-norm residual order: normalization wraps the residual sum.
    /// Dropout sits between the sublayer and the add in the trained
    /// architecture and is identity at inference.
    pub(crate) fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let attn_output = self.self_attn.forward(x)?;
        let out1 = self.layer_norm1.forward(&(attn_output + x)?)?;
        let ffn_output = self.mlp.forward(&out1)?;
        Ok(self.layer_norm2.forward(&(ffn_output + &out1)?)?)
    }
}

/// The default vision-transformer classifier.
pub struct VitClassifier {
    config: VitConfig,
    patch_embedding: Linear,
    position_embedding: Tensor,
    encoder_layers: Vec<EncoderBlock>,
    head: Linear,
}

impl VitClassifier {
    /// Load from a directory holding `config.json` + `model.safetensors`.
    pub fn from_dir(dir: &Path, device: &Device) -> ServingResult<Self> {
        let config = VitConfig::from_file(&dir.join("config.json"))?;
        let weights = dir.join("model.safetensors");
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[&weights], DType::F32, device) }
            .map_err(|e| ServingError::model("load ViT weights", e))?;
        Self::load(config, vb)
    }

    /// Build the model from an already-open variable store.
    pub fn load(config: VitConfig, vb: VarBuilder) -> ServingResult<Self> {
        config.validate()?;
        let patch_dim = config.patch_size * config.patch_size * 3;
        let patch_embedding = linear(patch_dim, config.hidden_size, vb.pp("patch_embedding"))
            .map_err(|e| ServingError::model("load patch embedding", e))?;

        // Table length is pinned to the patch grid; a shape mismatch here
        // means the artifact was exported for a different geometry.
        let position_embedding = vb
            .get(
                (config.num_patches(), config.hidden_size),
                "position_embedding.weight",
            )
            .map_err(|e| ServingError::model("load position embedding", e))?;

        let mut encoder_layers = Vec::with_capacity(config.num_hidden_layers);
        for i in 0..config.num_hidden_layers {
            encoder_layers.push(
                EncoderBlock::new(&config, vb.pp(format!("encoder.layers.{}", i)))
                    .map_err(|e| ServingError::model(format!("load encoder layer {}", i), e))?,
            );
        }

        let head = linear(config.hidden_size, config.num_classes, vb.pp("head"))
            .map_err(|e| ServingError::model("load classification head", e))?;

        Ok(Self {
            config,
            patch_embedding,
            position_embedding,
            encoder_layers,
            head,
        })
    }

    pub fn config(&self) -> &VitConfig {
        &self.config
    }
}

impl ImageClassifier for VitClassifier {
    fn forward(&self, image: &Tensor) -> Result<Vec<f32>> {
        let patches = extract_patches(image, self.config.patch_size)?;
        let (seq_len, _) = patches.dims2()?;
        let (table_len, _) = self.position_embedding.dims2()?;
        if seq_len != table_len {
            anyhow::bail!(
                "patch count {} does not match positional table length {}",
                seq_len,
                table_len
            );
        }

        let embedded = self.patch_embedding.forward(&patches)?;
        let mut hidden = (embedded + &self.position_embedding)?;
        for layer in &self.encoder_layers {
            hidden = layer.forward(&hidden)?;
        }

        // Mean pool over the patch axis (not learned), then project to
        // class scores. No activation here; decode owns softmax/argmax.
        let pooled = hidden.mean_keepdim(0)?;
        let scores = self.head.forward(&pooled)?.squeeze(0)?;
        Ok(scores.to_vec1::<f32>()?)
    }

    fn num_classes(&self) -> usize {
        self.config.num_classes
    }
}
