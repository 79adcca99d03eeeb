//! Property-based tests for the receptive-field engine using proptest.

use proptest::prelude::*;

use rfscope_core::{LayerCategory, LayerDescriptor, LayerParams, LayerSpec, ReceptiveFieldEngine};

fn layer_strategy() -> impl Strategy<Value = LayerDescriptor> {
    (0usize..3, 1i64..8, 1i64..4, 0i64..4, 1i64..4).prop_map(|(cat, k, s, p, d)| {
        let category = [
            LayerCategory::Convolution,
            LayerCategory::MaxPool,
            LayerCategory::AvgPool,
        ][cat];
        LayerDescriptor::new(
            category,
            LayerParams {
                kernel_size: k,
                stride: s,
                padding: p,
                dilation: d,
            },
        )
        .unwrap()
    })
}

fn stack_strategy() -> impl Strategy<Value = Vec<LayerDescriptor>> {
    prop::collection::vec(layer_strategy(), 0..12)
}

// --- Trace properties ---

proptest! {
    #[test]
    fn channels_never_change(
        layers in stack_strategy(),
        channels in 1i64..16,
    ) {
        let mut engine = ReceptiveFieldEngine::new();
        engine.set_input_dimensions(128, 96, channels).unwrap();
        let trace = engine.extend_layers(layers);
        prop_assert_eq!(trace.final_dimensions.channels, channels);
        for row in &trace.layers {
            prop_assert_eq!(row.input_channels, channels);
            prop_assert_eq!(row.output_channels, channels);
        }
    }

    #[test]
    fn receptive_field_never_shrinks(layers in stack_strategy()) {
        let mut engine = ReceptiveFieldEngine::new();
        let trace = engine.extend_layers(layers);
        let mut previous = 1u64;
        for row in &trace.layers {
            prop_assert!(row.receptive_field >= previous);
            previous = row.receptive_field;
        }
        prop_assert_eq!(trace.current_rf, previous);
    }

    #[test]
    fn jump_is_product_of_strides(layers in stack_strategy()) {
        let expected: u64 = layers.iter().map(|l| u64::from(l.stride())).product();
        let mut engine = ReceptiveFieldEngine::new();
        let trace = engine.extend_layers(layers);
        prop_assert_eq!(trace.current_jump, expected);
    }

    #[test]
    fn rows_chain_dimensions(layers in stack_strategy()) {
        let mut engine = ReceptiveFieldEngine::new();
        let trace = engine.extend_layers(layers);
        let mut current = trace.input_dimensions;
        for row in &trace.layers {
            prop_assert_eq!(row.input(), current);
            current = row.output();
        }
        prop_assert_eq!(trace.final_dimensions, current);
    }

    #[test]
    fn trace_is_deterministic(layers in stack_strategy()) {
        let mut engine = ReceptiveFieldEngine::new();
        engine.extend_layers(layers);
        prop_assert_eq!(engine.compute_trace(), engine.compute_trace());
    }

    #[test]
    fn add_layer_matches_extend(layers in stack_strategy()) {
        let mut one_by_one = ReceptiveFieldEngine::new();
        for layer in layers.clone() {
            one_by_one.add_layer(layer);
        }
        let mut batched = ReceptiveFieldEngine::new();
        batched.extend_layers(layers);
        prop_assert_eq!(one_by_one.compute_trace(), batched.compute_trace());
    }

    #[test]
    fn reset_always_restores_defaults(
        layers in stack_strategy(),
        height in 1i64..512,
        width in 1i64..512,
    ) {
        let mut engine = ReceptiveFieldEngine::new();
        engine.set_input_dimensions(height, width, 1).unwrap();
        engine.extend_layers(layers);
        engine.reset();
        prop_assert_eq!(engine.compute_trace(), ReceptiveFieldEngine::new().compute_trace());
    }

    #[test]
    fn rejected_input_leaves_engine_untouched(
        layers in stack_strategy(),
        bad in -100i64..=0,
    ) {
        let mut engine = ReceptiveFieldEngine::new();
        engine.extend_layers(layers);
        let before = engine.clone();
        prop_assert!(engine.set_input_dimensions(bad, 10, 3).is_err());
        prop_assert!(engine.set_input_dimensions(10, 10, bad).is_err());
        prop_assert_eq!(engine, before);
    }
}

// --- Layer properties ---

proptest! {
    #[test]
    fn output_size_matches_floor_formula(
        layer in layer_strategy(),
        input in -20i64..300,
    ) {
        let k_eff = layer.effective_kernel_size() as f64;
        let numerator = input as f64 + 2.0 * f64::from(layer.padding()) - k_eff;
        let expected = (numerator / f64::from(layer.stride())).floor() as i64 + 1;
        prop_assert_eq!(layer.output_size(input), expected);
    }

    #[test]
    fn pooling_has_unit_dilation(layer in layer_strategy()) {
        if layer.category().is_pooling() {
            prop_assert_eq!(layer.dilation(), 1);
            prop_assert_eq!(layer.effective_kernel_size(), u64::from(layer.kernel_size()));
        }
    }

    #[test]
    fn compact_spec_round_trips_through_display(layer in layer_strategy()) {
        let compact = format!(
            "{}:k={},s={},p={},d={}",
            layer.category().tag(),
            layer.kernel_size(),
            layer.stride(),
            layer.padding(),
            layer.dilation(),
        );
        let parsed: LayerSpec = compact.parse().unwrap();
        prop_assert_eq!(parsed.into_descriptor().unwrap(), layer);
    }
}
