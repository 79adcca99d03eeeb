//! Layer geometry descriptors.
//!
//! A [`LayerDescriptor`] is the immutable geometry of one convolution or
//! pooling layer. Descriptors are only created through validating
//! constructors, so every descriptor the engine sees satisfies
//! `kernel_size >= 1`, `stride >= 1`, `dilation >= 1` and `padding >= 0`.
//!
//! [`LayerSpec`] is the loosely-typed form used at the boundaries (HTTP
//! bodies, layer files, CLI arguments) before validation.

use crate::error::{RfscopeError, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of operation a layer performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerCategory {
    Convolution,
    MaxPool,
    AvgPool,
}

impl LayerCategory {
    /// Display label, also used as the layer `name` in traces.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Convolution => "Conv2D",
            Self::MaxPool => "MaxPool2D",
            Self::AvgPool => "AvgPool2D",
        }
    }

    /// Short wire tag accepted by the HTTP API and layer specs.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Convolution => "conv",
            Self::MaxPool => "maxpool",
            Self::AvgPool => "avgpool",
        }
    }

    pub fn is_pooling(&self) -> bool {
        matches!(self, Self::MaxPool | Self::AvgPool)
    }
}

impl fmt::Display for LayerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for LayerCategory {
    type Err = RfscopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conv" | "conv2d" | "convolution" => Ok(Self::Convolution),
            "maxpool" | "maxpool2d" | "max_pool" => Ok(Self::MaxPool),
            "avgpool" | "avgpool2d" | "avg_pool" => Ok(Self::AvgPool),
            _ => Err(RfscopeError::UnknownCategory {
                category: s.to_string(),
            }),
        }
    }
}

/// Raw geometry parameters before validation.
///
/// Signed so that negative values arriving from JSON or the command line are
/// reported as validation errors instead of failing to parse. Each field also
/// accepts a numeric string (`"3"`) or a float (`3.0`, truncated toward zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerParams {
    #[serde(deserialize_with = "lenient_int")]
    pub kernel_size: i64,
    #[serde(deserialize_with = "lenient_int")]
    pub stride: i64,
    #[serde(deserialize_with = "lenient_int")]
    pub padding: i64,
    #[serde(deserialize_with = "lenient_int")]
    pub dilation: i64,
}

fn lenient_int<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(value) => Ok(value),
        Raw::Float(value) if value.is_finite() && value.abs() < 9.0e18 => Ok(value.trunc() as i64),
        Raw::Float(value) => Err(serde::de::Error::custom(format!(
            "{value} is not a representable integer"
        ))),
        Raw::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("'{text}' is not an integer"))),
    }
}

impl Default for LayerParams {
    fn default() -> Self {
        Self {
            kernel_size: 3,
            stride: 1,
            padding: 0,
            dilation: 1,
        }
    }
}

/// Immutable geometry of a single layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerDescriptor {
    name: &'static str,
    kernel_size: u32,
    stride: u32,
    padding: u32,
    dilation: u32,
    category: LayerCategory,
}

impl LayerDescriptor {
    /// Validate `params` and build a descriptor.
    ///
    /// Pooling layers always use a dilation of 1; a requested dilation is
    /// ignored for them.
    pub fn new(category: LayerCategory, params: LayerParams) -> Result<Self, ValidationError> {
        let kernel_size = positive("kernel_size", params.kernel_size)?;
        let dilation = if category.is_pooling() {
            1
        } else {
            positive("dilation", params.dilation)?
        };
        // Output sizes are signed, so the dilated footprint must fit an i64.
        let k_eff = (u64::from(kernel_size) - 1) * u64::from(dilation) + 1;
        if i64::try_from(k_eff).is_err() {
            return Err(ValidationError::new(
                "dilation",
                format!("makes the effective kernel too large: ({kernel_size} - 1) * {dilation} + 1"),
            ));
        }
        Ok(Self {
            name: category.label(),
            kernel_size,
            stride: positive("stride", params.stride)?,
            padding: non_negative("padding", params.padding)?,
            dilation,
            category,
        })
    }

    pub fn conv(
        kernel_size: i64,
        stride: i64,
        padding: i64,
        dilation: i64,
    ) -> Result<Self, ValidationError> {
        Self::new(
            LayerCategory::Convolution,
            LayerParams {
                kernel_size,
                stride,
                padding,
                dilation,
            },
        )
    }

    pub fn max_pool(kernel_size: i64, stride: i64, padding: i64) -> Result<Self, ValidationError> {
        Self::pool(LayerCategory::MaxPool, kernel_size, stride, padding)
    }

    pub fn avg_pool(kernel_size: i64, stride: i64, padding: i64) -> Result<Self, ValidationError> {
        Self::pool(LayerCategory::AvgPool, kernel_size, stride, padding)
    }

    fn pool(
        category: LayerCategory,
        kernel_size: i64,
        stride: i64,
        padding: i64,
    ) -> Result<Self, ValidationError> {
        Self::new(
            category,
            LayerParams {
                kernel_size,
                stride,
                padding,
                dilation: 1,
            },
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kernel_size(&self) -> u32 {
        self.kernel_size
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn padding(&self) -> u32 {
        self.padding
    }

    pub fn dilation(&self) -> u32 {
        self.dilation
    }

    pub fn category(&self) -> LayerCategory {
        self.category
    }

    /// Footprint of the kernel once dilation is applied: `(k - 1) * d + 1`.
    pub fn effective_kernel_size(&self) -> u64 {
        (u64::from(self.kernel_size) - 1) * u64::from(self.dilation) + 1
    }

    /// Spatial output size for one axis:
    /// `floor((input + 2 * padding - k_eff) / stride) + 1`.
    ///
    /// Uses floor (not truncating) division, so an oversized kernel yields a
    /// size of zero or below rather than rounding toward one. Evaluated in
    /// `i128` and clamped to the `i64` range, so chains of collapsing layers
    /// cannot overflow.
    pub fn output_size(&self, input_size: i64) -> i64 {
        let numerator = i128::from(input_size) + 2 * i128::from(self.padding)
            - i128::from(self.effective_kernel_size());
        let size = numerator.div_euclid(i128::from(self.stride)) + 1;
        size.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }
}

impl fmt::Display for LayerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.category {
            LayerCategory::Convolution => write!(
                f,
                "{}(k={}, s={}, p={}, d={})",
                self.name, self.kernel_size, self.stride, self.padding, self.dilation
            ),
            LayerCategory::MaxPool | LayerCategory::AvgPool => write!(
                f,
                "{}(k={}, s={}, p={})",
                self.name, self.kernel_size, self.stride, self.padding
            ),
        }
    }
}

fn positive(field: &'static str, value: i64) -> Result<u32, ValidationError> {
    if value < 1 {
        return Err(ValidationError::at_least(field, 1, value));
    }
    u32::try_from(value).map_err(|_| ValidationError::new(field, format!("is too large: {value}")))
}

fn non_negative(field: &'static str, value: i64) -> Result<u32, ValidationError> {
    if value < 0 {
        return Err(ValidationError::at_least(field, 0, value));
    }
    u32::try_from(value).map_err(|_| ValidationError::new(field, format!("is too large: {value}")))
}

/// Unvalidated layer description as it arrives from a boundary.
///
/// Deserializes from `{"type": "maxpool", "kernel_size": 2, "stride": 2}`;
/// absent fields take the defaults of [`LayerParams`] and a missing `type`
/// means a convolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec {
    #[serde(rename = "type", default = "default_layer_type")]
    pub kind: String,
    #[serde(flatten)]
    pub params: LayerParams,
}

fn default_layer_type() -> String {
    LayerCategory::Convolution.tag().to_string()
}

impl Default for LayerSpec {
    fn default() -> Self {
        Self {
            kind: default_layer_type(),
            params: LayerParams::default(),
        }
    }
}

impl LayerSpec {
    /// Resolve the category and validate the parameters.
    pub fn into_descriptor(self) -> Result<LayerDescriptor, RfscopeError> {
        let category: LayerCategory = self.kind.parse()?;
        Ok(LayerDescriptor::new(category, self.params)?)
    }
}

/// Parses the compact command-line form `conv:k=3,s=2,p=1,d=1`.
///
/// Keys may be spelled `k|kernel|kernel_size`, `s|stride`, `p|pad|padding`
/// and `d|dilation`. A bare category (`maxpool`) uses all defaults.
impl FromStr for LayerSpec {
    type Err = RfscopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec_err = |reason: String| RfscopeError::LayerSpec {
            spec: s.to_string(),
            reason,
        };

        let (kind, rest) = match s.split_once(':') {
            Some((kind, rest)) => (kind.trim(), rest.trim()),
            None => (s.trim(), ""),
        };
        if kind.is_empty() {
            return Err(spec_err("missing layer type".to_string()));
        }

        let mut params = LayerParams::default();
        for pair in rest.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| spec_err(format!("expected key=value, got '{pair}'")))?;
            let value: i64 = value
                .trim()
                .parse()
                .map_err(|_| spec_err(format!("'{}' is not an integer", value.trim())))?;
            match key.trim() {
                "k" | "kernel" | "kernel_size" => params.kernel_size = value,
                "s" | "stride" => params.stride = value,
                "p" | "pad" | "padding" => params.padding = value,
                "d" | "dilation" => params.dilation = value,
                other => return Err(spec_err(format!("unknown key '{other}'"))),
            }
        }

        Ok(Self {
            kind: kind.to_string(),
            params,
        })
    }
}
