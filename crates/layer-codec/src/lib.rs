//! Layer spec codec for model-forge
//!
//! This crate serializes and deserializes the ordered sequence of layer
//! descriptors that makes up a model architecture. The codec is pure and
//! stateless; round-tripping any valid sequence is lossless.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use common::error::{Error, Result};

/// A single layer of a model architecture
///
/// The wire form is an object tagged by a `type` discriminator, e.g.
/// `{"type": "Conv2d", "in_channels": 1, "out_channels": 32, "kernel_size": 3}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LayerDescriptor {
    /// 2D convolution
    Conv2d {
        in_channels: u32,
        out_channels: u32,
        kernel_size: u32,
    },
    /// 2D max pooling
    MaxPool2d { kernel_size: u32, stride: u32 },
    /// 2D average pooling
    AvgPool2d { kernel_size: u32, stride: u32 },
    /// Reflection padding
    ReflectionPad2d { padding: u32 },
    /// Replication padding
    ReplicationPad2d { padding: u32 },
    /// Zero padding
    ZeroPad2d { padding: u32 },
    /// Constant padding
    ConstantPad2d { padding: u32, value: f64 },
    /// Fully connected layer
    Linear { in_features: u32, out_features: u32 },
    /// Rectified linear unit
    ReLU,
    /// Leaky rectified linear unit
    LeakyReLU { negative_slope: f64 },
    /// Exponential linear unit
    ELU { alpha: f64 },
    /// Sigmoid activation
    Sigmoid,
    /// Hyperbolic tangent activation
    Tanh,
    /// Softmax over one dimension
    Softmax { dim: u32 },
    /// 2D batch normalization
    BatchNorm2d { num_features: u32 },
    /// Flattens to a single dimension
    Flatten,
    /// Dropout regularization
    Dropout { p: f64 },
}

/// Serializes an ordered layer sequence to its structured wire form
pub fn serialize(layers: &[LayerDescriptor]) -> Result<Value> {
    Ok(serde_json::to_value(layers)?)
}

/// Deserializes a structured value back into an ordered layer sequence
///
/// Fails with [`Error::MalformedLayerSpec`] when the value is not an array,
/// a discriminator tag is unrecognized, or required fields are missing.
pub fn deserialize(value: &Value) -> Result<Vec<LayerDescriptor>> {
    let entries = value
        .as_array()
        .ok_or_else(|| Error::MalformedLayerSpec("layer spec is not an array".to_string()))?;

    let mut layers = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let layer = serde_json::from_value(entry.clone())
            .map_err(|e| Error::MalformedLayerSpec(format!("layer {}: {}", index, e)))?;
        layers.push(layer);
    }
    Ok(layers)
}
