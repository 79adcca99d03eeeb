//! Forward geometry trace produced by the engine.
//!
//! The serialized field names match the JSON payload served by the HTTP
//! gateway, so a trace can be handed to a client as-is.

use serde::{Deserialize, Serialize};

/// Spatial size plus channel count at some point of the forward pass.
///
/// Signed: an oversized kernel can drive a spatial size to zero or below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub height: i64,
    pub width: i64,
    pub channels: i64,
}

impl Dimensions {
    /// Whether both spatial axes still hold at least one position.
    pub fn is_spatially_valid(&self) -> bool {
        self.height >= 1 && self.width >= 1
    }
}

/// One row of the per-layer history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRow {
    pub name: String,
    pub kernel_size: u32,
    pub stride: u32,
    pub padding: u32,
    pub dilation: u32,
    pub effective_kernel: u64,
    pub receptive_field: u64,
    pub jump: u64,
    pub start: f64,
    pub input_height: i64,
    pub input_width: i64,
    pub input_channels: i64,
    pub output_height: i64,
    pub output_width: i64,
    pub output_channels: i64,
}

impl LayerRow {
    pub fn input(&self) -> Dimensions {
        Dimensions {
            height: self.input_height,
            width: self.input_width,
            channels: self.input_channels,
        }
    }

    pub fn output(&self) -> Dimensions {
        Dimensions {
            height: self.output_height,
            width: self.output_width,
            channels: self.output_channels,
        }
    }
}

/// Full result of a forward pass: per-layer history plus final aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryTrace {
    pub layers: Vec<LayerRow>,
    pub current_rf: u64,
    pub current_jump: u64,
    pub current_start: f64,
    pub input_dimensions: Dimensions,
    pub final_dimensions: Dimensions,
}

/// Round to three decimal places for display.
pub(crate) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
