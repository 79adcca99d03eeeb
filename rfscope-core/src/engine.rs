//! The receptive-field engine.
//!
//! Holds the declared input and the ordered layer stack, and recomputes the
//! complete forward geometry trace from scratch on every query. Only the
//! descriptor list and the input are stored; receptive field, jump and start
//! are never carried between calls.

use crate::error::ValidationError;
use crate::layer::LayerDescriptor;
use crate::trace::{round3, Dimensions, GeometryTrace, LayerRow};
use serde::Serialize;
use tracing::{debug, warn};

pub const DEFAULT_HEIGHT: u32 = 224;
pub const DEFAULT_WIDTH: u32 = 224;
pub const DEFAULT_CHANNELS: u32 = 3;

/// Declared input image dimensions. All fields are strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InputSpec {
    height: u32,
    width: u32,
    channels: u32,
}

impl Default for InputSpec {
    fn default() -> Self {
        Self {
            height: DEFAULT_HEIGHT,
            width: DEFAULT_WIDTH,
            channels: DEFAULT_CHANNELS,
        }
    }
}

impl InputSpec {
    pub fn new(height: i64, width: i64, channels: i64) -> Result<Self, ValidationError> {
        Ok(Self {
            height: dimension("height", height)?,
            width: dimension("width", width)?,
            channels: dimension("channels", channels)?,
        })
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            height: i64::from(self.height),
            width: i64::from(self.width),
            channels: i64::from(self.channels),
        }
    }
}

fn dimension(field: &'static str, value: i64) -> Result<u32, ValidationError> {
    if value < 1 {
        return Err(ValidationError::new(
            field,
            format!("must be a positive integer, got {value}"),
        ));
    }
    u32::try_from(value).map_err(|_| ValidationError::new(field, format!("is too large: {value}")))
}

/// Sequential receptive-field calculator over an ordered layer stack.
///
/// Not synchronized; callers sharing one engine across tasks must serialize
/// access themselves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceptiveFieldEngine {
    input: InputSpec,
    layers: Vec<LayerDescriptor>,
}

impl ReceptiveFieldEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(&self) -> InputSpec {
        self.input
    }

    pub fn layers(&self) -> &[LayerDescriptor] {
        &self.layers
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Replace the declared input. The layer stack is kept.
    ///
    /// Fails without touching any state if a dimension is not positive.
    pub fn set_input_dimensions(
        &mut self,
        height: i64,
        width: i64,
        channels: i64,
    ) -> Result<(), ValidationError> {
        self.input = InputSpec::new(height, width, channels)?;
        debug!(height, width, channels, "Input dimensions set");
        Ok(())
    }

    /// Append one layer and return the recomputed trace.
    pub fn add_layer(&mut self, layer: LayerDescriptor) -> GeometryTrace {
        debug!(layer = %layer, index = self.layers.len(), "Adding layer");
        self.layers.push(layer);
        self.compute_trace()
    }

    /// Append several layers in order and return the recomputed trace.
    pub fn extend_layers<I>(&mut self, layers: I) -> GeometryTrace
    where
        I: IntoIterator<Item = LayerDescriptor>,
    {
        self.layers.extend(layers);
        self.compute_trace()
    }

    /// Drop every layer and restore the default 224x224x3 input.
    pub fn reset(&mut self) {
        self.layers.clear();
        self.input = InputSpec::default();
        debug!("Engine reset");
    }

    /// Per-layer rows of the current trace.
    pub fn layer_summary(&self) -> Vec<LayerRow> {
        self.compute_trace().layers
    }

    /// Run the forward pass over the whole stack.
    ///
    /// Starting from `rf = 1`, `jump = 1`, `start = 0.5`, each layer with
    /// effective kernel `k` updates
    ///
    /// ```text
    /// rf    += (k - 1) * jump
    /// start += ((k - 1) / 2 - padding) * jump
    /// jump  *= stride
    /// ```
    ///
    /// Channels pass through unchanged for every category: output channel
    /// counts of convolutions depend on a filter count that is not modelled.
    pub fn compute_trace(&self) -> GeometryTrace {
        let mut rf: u64 = 1;
        let mut jump: u64 = 1;
        let mut start: f64 = 0.5;
        let mut current = self.input.dimensions();
        let mut rows = Vec::with_capacity(self.layers.len());

        for (index, layer) in self.layers.iter().enumerate() {
            let k_eff = layer.effective_kernel_size();

            let rf_next = rf.saturating_add((k_eff - 1).saturating_mul(jump));
            let start_next =
                start + ((k_eff - 1) as f64 / 2.0 - f64::from(layer.padding())) * jump as f64;
            let jump_next = jump.saturating_mul(u64::from(layer.stride()));

            let output = Dimensions {
                height: layer.output_size(current.height),
                width: layer.output_size(current.width),
                channels: current.channels,
            };
            if current.is_spatially_valid() && !output.is_spatially_valid() {
                warn!(
                    index,
                    layer = %layer,
                    height = output.height,
                    width = output.width,
                    "Layer collapses spatial dimensions below 1"
                );
            }

            rows.push(LayerRow {
                name: layer.name().to_string(),
                kernel_size: layer.kernel_size(),
                stride: layer.stride(),
                padding: layer.padding(),
                dilation: layer.dilation(),
                effective_kernel: k_eff,
                receptive_field: rf_next,
                jump: jump_next,
                start: round3(start_next),
                input_height: current.height,
                input_width: current.width,
                input_channels: current.channels,
                output_height: output.height,
                output_width: output.width,
                output_channels: output.channels,
            });

            rf = rf_next;
            start = start_next;
            jump = jump_next;
            current = output;
        }

        debug!(layers = rows.len(), rf, jump, "Computed geometry trace");

        GeometryTrace {
            layers: rows,
            current_rf: rf,
            current_jump: jump,
            current_start: round3(start),
            input_dimensions: self.input.dimensions(),
            final_dimensions: current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn conv(k: i64, s: i64, p: i64, d: i64) -> LayerDescriptor {
        LayerDescriptor::conv(k, s, p, d).unwrap()
    }

    fn max_pool(k: i64, s: i64, p: i64) -> LayerDescriptor {
        LayerDescriptor::max_pool(k, s, p).unwrap()
    }

    #[test]
    fn test_empty_engine_trace() {
        let engine = ReceptiveFieldEngine::new();
        let trace = engine.compute_trace();
        assert_eq!(trace.current_rf, 1);
        assert_eq!(trace.current_jump, 1);
        assert_eq!(trace.current_start, 0.5);
        assert!(trace.layers.is_empty());
        assert_eq!(trace.final_dimensions, trace.input_dimensions);
        assert_eq!(
            trace.input_dimensions,
            Dimensions {
                height: 224,
                width: 224,
                channels: 3
            }
        );
    }

    #[test]
    fn test_single_conv() {
        let mut engine = ReceptiveFieldEngine::new();
        let trace = engine.add_layer(conv(3, 1, 0, 1));

        assert_eq!(trace.layers.len(), 1);
        let row = &trace.layers[0];
        assert_eq!(row.name, "Conv2D");
        assert_eq!(row.effective_kernel, 3);
        assert_eq!(row.receptive_field, 3);
        assert_eq!(row.jump, 1);
        assert_eq!(row.start, 1.0);
        assert_eq!(row.input_height, 224);
        assert_eq!(row.output_height, 222);
        assert_eq!(row.output_width, 222);
        assert_eq!(trace.current_rf, 3);
        assert_eq!(trace.current_jump, 1);
        assert_eq!(trace.current_start, 1.0);
    }

    #[test]
    fn test_conv_then_pool() {
        let mut engine = ReceptiveFieldEngine::new();
        engine.add_layer(conv(3, 1, 0, 1));
        let trace = engine.add_layer(max_pool(2, 2, 0));

        let row = &trace.layers[1];
        assert_eq!(row.name, "MaxPool2D");
        assert_eq!(row.input_height, 222);
        assert_eq!(row.output_height, 111);
        assert_eq!(row.output_width, 111);
        assert_eq!(row.receptive_field, 4);
        assert_eq!(row.jump, 2);
        assert_eq!(row.start, 1.5);
        assert_eq!(trace.current_jump, 2);
        assert_eq!(
            trace.final_dimensions,
            Dimensions {
                height: 111,
                width: 111,
                channels: 3
            }
        );
    }

    #[test]
    fn test_vgg_like_block() {
        // two 3x3 convs + 2x2 pool, twice
        let mut engine = ReceptiveFieldEngine::new();
        let trace = engine.extend_layers([
            conv(3, 1, 1, 1),
            conv(3, 1, 1, 1),
            max_pool(2, 2, 0),
            conv(3, 1, 1, 1),
            conv(3, 1, 1, 1),
            max_pool(2, 2, 0),
        ]);
        let rfs: Vec<u64> = trace.layers.iter().map(|r| r.receptive_field).collect();
        assert_eq!(rfs, vec![3, 5, 6, 10, 14, 16]);
        assert_eq!(trace.current_jump, 4);
        assert_eq!(trace.final_dimensions.height, 56);
        // padded convs leave start alone; each pool shifts it by jump / 2
        assert_eq!(trace.current_start, 2.0);
    }

    #[test]
    fn test_dilation_and_padding_shift_start() {
        let mut engine = ReceptiveFieldEngine::new();
        let trace = engine.add_layer(conv(3, 2, 3, 2));
        let row = &trace.layers[0];
        assert_eq!(row.effective_kernel, 5);
        assert_eq!(row.receptive_field, 5);
        // 0.5 + (4/2 - 3) * 1
        assert_eq!(row.start, -0.5);
        // floor((224 + 6 - 5) / 2) + 1
        assert_eq!(row.output_height, 113);
    }

    #[test]
    fn test_rectangular_input() {
        let mut engine = ReceptiveFieldEngine::new();
        engine.set_input_dimensions(100, 60, 1).unwrap();
        let trace = engine.add_layer(conv(5, 2, 0, 1));
        assert_eq!(trace.final_dimensions.height, 48);
        assert_eq!(trace.final_dimensions.width, 28);
        assert_eq!(trace.final_dimensions.channels, 1);
    }

    #[test]
    fn test_collapsing_layer_keeps_computing() {
        let mut engine = ReceptiveFieldEngine::new();
        engine.set_input_dimensions(4, 4, 3).unwrap();
        engine.add_layer(conv(3, 1, 0, 1));
        let trace = engine.add_layer(conv(5, 1, 0, 1));
        assert_eq!(trace.layers[1].input_height, 2);
        assert_eq!(trace.final_dimensions.height, -2);
        assert_eq!(trace.current_rf, 7);
    }

    #[test]
    fn test_extreme_kernel_traces_as_collapsed() {
        let max = i64::from(u32::MAX);
        let mut engine = ReceptiveFieldEngine::new();
        let trace = engine.add_layer(conv(max, 1, 0, 2));
        let k_eff = (u64::from(u32::MAX) - 1) * 2 + 1;
        assert_eq!(trace.layers[0].effective_kernel, k_eff);
        assert_eq!(trace.current_rf, k_eff);
        assert!(trace.final_dimensions.height <= 0);
        assert!(!trace.final_dimensions.is_spatially_valid());

        // further layers on a collapsed map stay negative instead of wrapping
        let trace = engine.add_layer(conv(max, 1, 0, 2));
        assert!(trace.final_dimensions.height < trace.layers[0].output_height);
    }

    #[test]
    fn test_rf_and_jump_saturate() {
        let mut engine = ReceptiveFieldEngine::new();
        let trace = engine.extend_layers((0..70).map(|_| conv(3, 2, 1, 1)));
        assert_eq!(trace.layers[62].jump, 1 << 63);
        assert_eq!(trace.current_jump, u64::MAX);
        assert_eq!(trace.current_rf, u64::MAX);
        assert_eq!(trace.final_dimensions.height, 1);
        assert!(trace.current_start.is_finite());
    }

    #[test]
    fn test_set_input_keeps_layers() {
        let mut engine = ReceptiveFieldEngine::new();
        engine.add_layer(conv(3, 1, 0, 1));
        engine.set_input_dimensions(32, 32, 3).unwrap();
        assert_eq!(engine.layers().len(), 1);
        assert_eq!(engine.compute_trace().final_dimensions.height, 30);
    }

    #[test]
    fn test_set_input_rejects_non_positive_without_mutation() {
        let mut engine = ReceptiveFieldEngine::new();
        engine.add_layer(conv(3, 1, 0, 1));
        engine.set_input_dimensions(64, 48, 1).unwrap();
        let before = engine.clone();

        let err = engine.set_input_dimensions(0, 48, 1).unwrap_err();
        assert_eq!(err.field, "height");
        let err = engine.set_input_dimensions(64, -5, 1).unwrap_err();
        assert_eq!(err.field, "width");
        let err = engine.set_input_dimensions(64, 48, 0).unwrap_err();
        assert_eq!(err.field, "channels");

        assert_eq!(engine, before);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut engine = ReceptiveFieldEngine::new();
        engine.set_input_dimensions(17, 19, 1).unwrap();
        engine.add_layer(conv(7, 2, 3, 1));
        engine.add_layer(max_pool(3, 2, 1));
        engine.reset();

        assert_eq!(engine, ReceptiveFieldEngine::new());
        let trace = engine.compute_trace();
        assert_eq!(trace.current_rf, 1);
        assert_eq!(trace.current_jump, 1);
        assert_eq!(trace.current_start, 0.5);
        assert!(trace.layers.is_empty());

        engine.reset();
        assert_eq!(engine, ReceptiveFieldEngine::new());
    }

    #[test]
    fn test_compute_trace_is_deterministic() {
        let mut engine = ReceptiveFieldEngine::new();
        engine.extend_layers([conv(3, 2, 1, 1), max_pool(3, 2, 1), conv(3, 1, 2, 2)]);
        let first = engine.compute_trace();
        let second = engine.compute_trace();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_layer_summary_matches_trace() {
        let mut engine = ReceptiveFieldEngine::new();
        let trace = engine.extend_layers([conv(3, 1, 0, 1), max_pool(2, 2, 0)]);
        assert_eq!(engine.layer_summary(), trace.layers);
    }

    #[test]
    fn test_channels_pass_through() {
        let mut engine = ReceptiveFieldEngine::new();
        engine.set_input_dimensions(64, 64, 7).unwrap();
        let trace = engine.extend_layers([
            conv(3, 1, 1, 1),
            LayerDescriptor::avg_pool(2, 2, 0).unwrap(),
            max_pool(2, 2, 0),
        ]);
        assert!(trace.layers.iter().all(|r| r.output_channels == 7));
        assert_eq!(trace.final_dimensions.channels, 7);
    }

    #[test]
    fn test_input_spec_defaults() {
        let input = InputSpec::default();
        assert_eq!(input.height(), 224);
        assert_eq!(input.width(), 224);
        assert_eq!(input.channels(), 3);
        assert_eq!(InputSpec::new(224, 224, 3).unwrap(), input);
    }
}
