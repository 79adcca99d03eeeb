//! Error types for the rfscope core library.
//!
//! Uses `thiserror` for public API error types. Validation failures carry the
//! offending field so callers can report exactly what to fix; every failing
//! operation leaves engine state untouched.

use std::path::PathBuf;

/// Top-level error type for the rfscope core library.
#[derive(Debug, thiserror::Error)]
pub enum RfscopeError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Unknown layer category: '{category}'")]
    UnknownCategory { category: String },

    #[error("Invalid layer spec '{spec}': {reason}")]
    LayerSpec { spec: String, reason: String },

    #[error("Invalid layer file {}: {reason}", .path.display())]
    LayerFile { path: PathBuf, reason: String },

    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    #[error("Assistant error: {0}")]
    Assistant(#[from] AssistantError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A non-positive dimension or an out-of-range layer parameter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field} {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }

    /// Shorthand for the common "must be >= N" failure.
    pub(crate) fn at_least(field: &'static str, min: i64, got: i64) -> Self {
        Self::new(field, format!("must be >= {min}, got {got}"))
    }
}

/// Errors from decoding image metadata.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Could not read image file: {message}")]
    Decode { message: String },

    #[error("Image file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("Image has zero-sized dimensions ({width}x{height})")]
    Empty { width: u32, height: u32 },
}

/// Errors from the question-answering collaborator.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("Assistant is not configured: {reason}")]
    NotConfigured { reason: String },

    #[error("Quota exceeded by provider")]
    QuotaExceeded,

    #[error("Model not found: {model}")]
    ModelNotFound { model: String },

    #[error("Access denied by provider")]
    AccessDenied,

    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

impl AssistantError {
    /// The message shown to an end user of the chat surface.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotConfigured { .. } => "Assistant API key not configured or model initialization failed. Please check your API key and try again.".to_string(),
            Self::QuotaExceeded => "Free tier quota reached. Please wait 1-2 minutes and try again.".to_string(),
            Self::ModelNotFound { .. } => "Model not found. Please check your API key.".to_string(),
            Self::AccessDenied => "Access denied. Please check your API key permissions.".to_string(),
            other => format!("API error: {other}"),
        }
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .path.display())]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `RfscopeError`.
pub type Result<T> = std::result::Result<T, RfscopeError>;
