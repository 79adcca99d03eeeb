//! # rfscope Core
//!
//! Core library for rfscope, a layer-by-layer receptive-field calculator for
//! CNN stacks. Provides the layer model, the geometry engine, image metadata
//! extraction, configuration, the optional question-answering assistant and
//! the HTTP gateway.

pub mod assistant;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod image_meta;
pub mod layer;
pub mod layer_file;
pub mod secrets;
pub mod trace;

// Re-export commonly used types at the crate root.
pub use assistant::{
    build_assistant, AssistantConfig, ChatReply, GeminiAssistant, QuestionAnswerer,
    SharedAssistant,
};
pub use config::{load_config, load_from, load_validated, RfscopeConfig};
pub use engine::{InputSpec, ReceptiveFieldEngine};
pub use error::{
    AssistantError, ConfigError, ImageError, Result, RfscopeError, ValidationError,
};
pub use gateway::{gateway_router, run_gateway, GatewayConfig, GatewayServer, SharedGateway};
pub use image_meta::ImageDimensions;
pub use layer::{LayerCategory, LayerDescriptor, LayerParams, LayerSpec};
pub use layer_file::LayerFile;
pub use secrets::{
    CredentialStore, InMemoryCredentialStore, KeyringCredentialStore, SecretRef,
};
pub use trace::{Dimensions, GeometryTrace, LayerRow};
