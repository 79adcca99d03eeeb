//! Plain-text rendering of geometry traces.

use rfscope_core::{Dimensions, GeometryTrace};
use std::fmt::Write;

const HEADERS: [&str; 11] = [
    "#", "Layer", "k", "s", "p", "d", "k_eff", "RF", "Jump", "Start", "Output",
];

fn dims(d: Dimensions) -> String {
    format!("{}x{}x{}", d.height, d.width, d.channels)
}

fn format_start(start: f64) -> String {
    // Traces are already rounded to three places; trim the trailing zeros.
    let text = format!("{start:.3}");
    let text = text.trim_end_matches('0');
    text.strip_suffix('.').unwrap_or(text).to_string()
}

/// Render a trace as an aligned table followed by a summary.
pub fn render_trace(trace: &GeometryTrace) -> String {
    let rows: Vec<[String; 11]> = trace
        .layers
        .iter()
        .enumerate()
        .map(|(i, row)| {
            [
                (i + 1).to_string(),
                row.name.clone(),
                row.kernel_size.to_string(),
                row.stride.to_string(),
                row.padding.to_string(),
                row.dilation.to_string(),
                row.effective_kernel.to_string(),
                row.receptive_field.to_string(),
                row.jump.to_string(),
                format_start(row.start),
                dims(row.output()),
            ]
        })
        .collect();

    let mut widths: [usize; 11] = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "Input: {}", dims(trace.input_dimensions));
    if rows.is_empty() {
        out.push_str("(no layers)\n");
    } else {
        push_line(&mut out, &HEADERS.map(str::to_string), &widths);
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        out.push_str(&rule.join("  "));
        out.push('\n');
        for row in &rows {
            push_line(&mut out, row, &widths);
        }
    }

    let _ = writeln!(out, "Receptive field: {}", trace.current_rf);
    let _ = writeln!(out, "Jump: {}", trace.current_jump);
    let _ = writeln!(out, "Start: {}", format_start(trace.current_start));
    let _ = writeln!(out, "Output: {}", dims(trace.final_dimensions));
    if !trace.final_dimensions.is_spatially_valid() {
        out.push_str("warning: the stack collapses the spatial dimensions below 1\n");
    }
    out
}

fn push_line(out: &mut String, cells: &[String; 11], widths: &[usize; 11]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .enumerate()
        .map(|(i, (cell, width))| {
            // Layer names read better left-aligned; numbers right-aligned.
            if i == 1 {
                format!("{cell:<width$}")
            } else {
                format!("{cell:>width$}")
            }
        })
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rfscope_core::{LayerDescriptor, ReceptiveFieldEngine};

    #[test]
    fn test_format_start() {
        assert_eq!(format_start(0.5), "0.5");
        assert_eq!(format_start(1.0), "1");
        assert_eq!(format_start(-0.5), "-0.5");
        assert_eq!(format_start(2.125), "2.125");
    }

    #[test]
    fn test_render_empty_trace() {
        let trace = ReceptiveFieldEngine::new().compute_trace();
        assert_eq!(
            render_trace(&trace),
            "Input: 224x224x3\n(no layers)\nReceptive field: 1\nJump: 1\nStart: 0.5\nOutput: 224x224x3\n"
        );
    }

    #[test]
    fn test_render_table() {
        let mut engine = ReceptiveFieldEngine::new();
        let trace = engine.extend_layers([
            LayerDescriptor::conv(3, 1, 0, 1).unwrap(),
            LayerDescriptor::max_pool(2, 2, 0).unwrap(),
        ]);
        let text = render_trace(&trace);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Input: 224x224x3");
        assert!(lines[1].starts_with("#  Layer"));
        assert!(lines[3].contains("Conv2D"));
        assert!(lines[3].ends_with("222x222x3"));
        assert!(lines[4].contains("MaxPool2D"));
        assert!(lines[4].ends_with("111x111x3"));
        assert!(text.contains("Receptive field: 4\n"));
        assert!(text.contains("Jump: 2\n"));
        assert!(text.contains("Start: 1.5\n"));
        assert!(!text.contains("warning"));
    }

    #[test]
    fn test_render_warns_on_collapse() {
        let mut engine = ReceptiveFieldEngine::new();
        engine.set_input_dimensions(2, 2, 1).unwrap();
        let trace = engine.add_layer(LayerDescriptor::conv(5, 1, 0, 1).unwrap());
        assert!(render_trace(&trace).contains("warning: the stack collapses"));
    }
}
