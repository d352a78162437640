//! Tests for the vision transformer: patch extraction geometry, encoder
//! shape invariants, and deterministic forward behavior on synthetic
//! weights built through `VarBuilder::from_tensors`.

use std::collections::HashMap;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;

use super::vit::{extract_patches, EncoderBlock, VitClassifier, VitConfig};
use crate::model_architectures::ImageClassifier;

fn small_config() -> VitConfig {
    VitConfig {
        image_size: 8,
        patch_size: 4,
        hidden_size: 8,
        num_hidden_layers: 1,
        num_attention_heads: 2,
        head_dim: None,
        intermediate_size: 16,
        layer_norm_eps: 1e-6,
        num_classes: 3,
        training_loss: Some("focal".to_string()),
    }
}

/// All-zero weights except identity layer norms and a fixed head bias,
/// so the forward pass has a single known output: the head bias itself.
fn zero_weights(config: &VitConfig, head_bias: &[f32], device: &Device) -> HashMap<String, Tensor> {
    let d = config.hidden_size;
    let patch_dim = config.patch_size * config.patch_size * 3;
    let inner = config.num_attention_heads * config.head_dim();
    let zeros = |shape: (usize, usize)| Tensor::zeros(shape, DType::F32, device).unwrap();
    let zeros1 = |len: usize| Tensor::zeros(len, DType::F32, device).unwrap();
    let ones1 = |len: usize| Tensor::ones(len, DType::F32, device).unwrap();

    let mut ws = HashMap::new();
    ws.insert("patch_embedding.weight".to_string(), zeros((d, patch_dim)));
    ws.insert("patch_embedding.bias".to_string(), zeros1(d));
    ws.insert(
        "position_embedding.weight".to_string(),
        zeros((config.num_patches(), d)),
    );
    for i in 0..config.num_hidden_layers {
        let prefix = format!("encoder.layers.{}", i);
        for proj in ["q_proj", "k_proj", "v_proj"] {
            ws.insert(format!("{}.self_attn.{}.weight", prefix, proj), zeros((inner, d)));
            ws.insert(format!("{}.self_attn.{}.bias", prefix, proj), zeros1(inner));
        }
        ws.insert(
            format!("{}.self_attn.out_proj.weight", prefix),
            zeros((d, inner)),
        );
        ws.insert(format!("{}.self_attn.out_proj.bias", prefix), zeros1(d));
        ws.insert(format!("{}.layer_norm1.weight", prefix), ones1(d));
        ws.insert(format!("{}.layer_norm1.bias", prefix), zeros1(d));
        ws.insert(
            format!("{}.mlp.fc1.weight", prefix),
            zeros((config.intermediate_size, d)),
        );
        ws.insert(
            format!("{}.mlp.fc1.bias", prefix),
            zeros1(config.intermediate_size),
        );
        ws.insert(
            format!("{}.mlp.fc2.weight", prefix),
            zeros((d, config.intermediate_size)),
        );
        ws.insert(format!("{}.mlp.fc2.bias", prefix), zeros1(d));
        ws.insert(format!("{}.layer_norm2.weight", prefix), ones1(d));
        ws.insert(format!("{}.layer_norm2.bias", prefix), zeros1(d));
    }
    ws.insert("head.weight".to_string(), zeros((config.num_classes, d)));
    ws.insert(
        "head.bias".to_string(),
        Tensor::from_vec(head_bias.to_vec(), head_bias.len(), device).unwrap(),
    );
    ws
}

fn load_zero_model(config: VitConfig, head_bias: &[f32]) -> VitClassifier {
    let device = Device::Cpu;
    let ws = zero_weights(&config, head_bias, &device);
    let vb = VarBuilder::from_tensors(ws, DType::F32, &device);
    VitClassifier::load(config, vb).unwrap()
}

fn constant_image(size: usize, value: f32) -> Tensor {
    Tensor::full(value, (size, size, 3), &Device::Cpu).unwrap()
}

/// For every patch size dividing 224 evenly, extraction yields exactly
/// (224/P)^2 patches of length P^2 * 3.
#[test]
fn patch_count_matches_grid_geometry() {
    let image = constant_image(224, 0.5);
    for patch_size in [14, 16, 28, 32, 56] {
        let patches = extract_patches(&image, patch_size).unwrap();
        let grid = 224 / patch_size;
        assert_eq!(
            patches.dims(),
            &[grid * grid, patch_size * patch_size * 3],
            "patch size {}",
            patch_size
        );
    }
}

/// Patch order is row-major over the grid and the flattening inside each
/// patch walks pixels row-major with channels innermost.
#[test]
fn patch_order_is_row_major() {
    // Pixel (y, x) carries value y*8+x in all three channels.
    let mut data = Vec::with_capacity(8 * 8 * 3);
    for y in 0..8 {
        for x in 0..8 {
            for _c in 0..3 {
                data.push((y * 8 + x) as f32);
            }
        }
    }
    let image = Tensor::from_vec(data, (8, 8, 3), &Device::Cpu).unwrap();
    let patches = extract_patches(&image, 4).unwrap().to_vec2::<f32>().unwrap();

    assert_eq!(patches.len(), 4);
    // Grid position (0, 0) starts at pixel (0, 0); (0, 1) at (0, 4);
    // (1, 0) at (4, 0); (1, 1) at (4, 4).
    assert_eq!(patches[0][0], 0.0);
    assert_eq!(patches[1][0], 4.0);
    assert_eq!(patches[2][0], 32.0);
    assert_eq!(patches[3][0], 36.0);
    // Within a patch: element 3 is the next pixel's first channel.
    assert_eq!(patches[0][3], 1.0);
}

#[test]
fn indivisible_image_is_rejected() {
    let image = Tensor::zeros((10, 10, 3), DType::F32, &Device::Cpu).unwrap();
    assert!(extract_patches(&image, 4).is_err());
}

/// The residual architecture's contract: every block maps [L, D] to
/// [L, D], for any valid embedding dimension and head count.
#[test]
fn encoder_block_preserves_shape() {
    let device = Device::Cpu;
    for (seq_len, hidden, heads) in [(4usize, 8usize, 2usize), (9, 12, 3), (16, 8, 4)] {
        let config = VitConfig {
            image_size: 8,
            patch_size: 4,
            hidden_size: hidden,
            num_hidden_layers: 1,
            num_attention_heads: heads,
            head_dim: None,
            intermediate_size: hidden * 2,
            layer_norm_eps: 1e-6,
            num_classes: 2,
            training_loss: None,
        };
        let mut ws = HashMap::new();
        let inner = heads * config.head_dim();
        let fill = |shape: (usize, usize)| Tensor::full(0.01f32, shape, &device).unwrap();
        let fill1 = |len: usize| Tensor::full(0.01f32, len, &device).unwrap();
        for proj in ["q_proj", "k_proj", "v_proj"] {
            ws.insert(format!("self_attn.{}.weight", proj), fill((inner, hidden)));
            ws.insert(format!("self_attn.{}.bias", proj), fill1(inner));
        }
        ws.insert("self_attn.out_proj.weight".to_string(), fill((hidden, inner)));
        ws.insert("self_attn.out_proj.bias".to_string(), fill1(hidden));
        ws.insert(
            "layer_norm1.weight".to_string(),
            Tensor::ones(hidden, DType::F32, &device).unwrap(),
        );
        ws.insert(
            "layer_norm1.bias".to_string(),
            Tensor::zeros(hidden, DType::F32, &device).unwrap(),
        );
        ws.insert(
            "mlp.fc1.weight".to_string(),
            fill((config.intermediate_size, hidden)),
        );
        ws.insert("mlp.fc1.bias".to_string(), fill1(config.intermediate_size));
        ws.insert(
            "mlp.fc2.weight".to_string(),
            fill((hidden, config.intermediate_size)),
        );
        ws.insert("mlp.fc2.bias".to_string(), fill1(hidden));
        ws.insert(
            "layer_norm2.weight".to_string(),
            Tensor::ones(hidden, DType::F32, &device).unwrap(),
        );
        ws.insert(
            "layer_norm2.bias".to_string(),
            Tensor::zeros(hidden, DType::F32, &device).unwrap(),
        );

        let vb = VarBuilder::from_tensors(ws, DType::F32, &device);
        let block = EncoderBlock::new(&config, vb).unwrap();

        let total = seq_len * hidden;
        let input = Tensor::arange(0f32, total as f32, &device)
            .unwrap()
            .reshape((seq_len, hidden))
            .unwrap();
        let output = block.forward(&input).unwrap();
        assert_eq!(
            output.dims(),
            input.dims(),
            "shape drift at L={} D={} H={}",
            seq_len,
            hidden,
            heads
        );
    }
}

/// With zero weights, the only signal surviving to the output is the
/// head bias: a fully deterministic end-to-end check of the wiring.
#[test]
fn zero_model_emits_head_bias() {
    let model = load_zero_model(small_config(), &[0.1, 0.7, 0.2]);
    let image = constant_image(8, 0.5);
    let scores = model.forward(&image).unwrap();
    assert_eq!(scores.len(), 3);
    for (score, expected) in scores.iter().zip([0.1f32, 0.7, 0.2]) {
        assert!(
            (score - expected).abs() < 1e-5,
            "scores {:?} diverged from head bias",
            scores
        );
    }
    assert_eq!(model.num_classes(), 3);
}

#[test]
fn forward_is_deterministic() {
    let model = load_zero_model(small_config(), &[0.3, 0.3, 0.4]);
    let image = constant_image(8, -0.25);
    let first = model.forward(&image).unwrap();
    let second = model.forward(&image).unwrap();
    assert_eq!(first, second);
}

#[test]
fn config_rejects_indivisible_patch_size() {
    let mut config = small_config();
    config.patch_size = 3;
    assert!(config.validate().is_err());
}

#[test]
fn config_rejects_indivisible_heads_without_head_dim() {
    let mut config = small_config();
    config.num_attention_heads = 3;
    assert!(config.validate().is_err());
    // An explicit per-head width lifts the divisibility requirement.
    config.head_dim = Some(4);
    assert!(config.validate().is_ok());
}

#[test]
fn wrong_position_table_length_fails_to_load() {
    let config = small_config();
    let device = Device::Cpu;
    let mut ws = zero_weights(&config, &[0.0, 0.0, 0.0], &device);
    ws.insert(
        "position_embedding.weight".to_string(),
        Tensor::zeros((config.num_patches() + 1, config.hidden_size), DType::F32, &device).unwrap(),
    );
    let vb = VarBuilder::from_tensors(ws, DType::F32, &device);
    assert!(VitClassifier::load(config, vb).is_err());
}
