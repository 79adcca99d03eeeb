//! JSON gateway server built on axum.

use super::session::{EngineSessions, DEFAULT_SESSION_ID, SESSION_HEADER};
use super::GatewayConfig;
use crate::assistant::{ChatReply, SharedAssistant};
use crate::engine::{ReceptiveFieldEngine, DEFAULT_CHANNELS, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::error::{AssistantError, RfscopeError};
use crate::image_meta::ImageDimensions;
use crate::layer::LayerSpec;
use crate::trace::GeometryTrace;
use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Thread-safe shared gateway reference for axum handlers.
pub type SharedGateway = Arc<GatewayServer>;

/// Gateway state: configuration, per-session engines and the optional
/// assistant. Only the session map is behind a lock.
pub struct GatewayServer {
    config: GatewayConfig,
    sessions: Mutex<EngineSessions>,
    assistant: Option<SharedAssistant>,
    started_at: DateTime<Utc>,
}

impl std::fmt::Debug for GatewayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayServer")
            .field("config", &self.config)
            .field("assistant", &self.assistant.as_ref().map(|a| a.name().to_string()))
            .finish_non_exhaustive()
    }
}

impl GatewayServer {
    /// Create a new gateway server from configuration.
    pub fn new(config: GatewayConfig) -> Self {
        let sessions = EngineSessions::new(config.max_sessions);
        Self {
            config,
            sessions: Mutex::new(sessions),
            assistant: None,
            started_at: Utc::now(),
        }
    }

    /// Attach the question-answering collaborator used by the chat routes.
    pub fn with_assistant(mut self, assistant: SharedAssistant) -> Self {
        self.assistant = Some(assistant);
        self
    }

    pub fn into_shared(self) -> SharedGateway {
        Arc::new(self)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Lock the session map.
    pub async fn sessions(&self) -> tokio::sync::MutexGuard<'_, EngineSessions> {
        self.sessions.lock().await
    }

    pub fn assistant(&self) -> Option<SharedAssistant> {
        self.assistant.clone()
    }

    /// Uptime in seconds since the server was created.
    pub fn uptime_secs(&self) -> u64 {
        let elapsed = Utc::now() - self.started_at;
        elapsed.num_seconds().max(0) as u64
    }
}

/// A failed request, rendered as `{"error": message}`.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self {
            status: e.status(),
            message: e.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

/// Session id from the request header, or the default session.
fn session_id(headers: &HeaderMap) -> Result<String, ApiError> {
    let Some(value) = headers.get(SESSION_HEADER) else {
        return Ok(DEFAULT_SESSION_ID.to_string());
    };
    let id = value
        .to_str()
        .map(str::trim)
        .map_err(|_| ApiError::bad_request("Invalid session id"))?;
    if !EngineSessions::is_valid_id(id) {
        return Err(ApiError::bad_request("Invalid session id"));
    }
    Ok(id.to_string())
}

/// Parse a JSON body; an empty body yields the defaults.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {e}")))
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SetInputRequest {
    height: i64,
    width: i64,
    channels: i64,
}

impl Default for SetInputRequest {
    fn default() -> Self {
        Self {
            height: i64::from(DEFAULT_HEIGHT),
            width: i64::from(DEFAULT_WIDTH),
            channels: i64::from(DEFAULT_CHANNELS),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
}

/// Build the axum Router with every `/api` route plus `/health`.
pub fn router(shared: SharedGateway) -> Router {
    let max_upload_bytes = shared.config().max_upload_bytes;
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/sessions", post(create_session_handler))
        .route("/api/set_input_dimensions", post(set_input_dimensions_handler))
        .route("/api/upload_image", post(upload_image_handler))
        .route("/api/add_layer", post(add_layer_handler))
        .route("/api/reset", post(reset_handler))
        .route("/api/current_state", get(current_state_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/test_gemini", get(test_assistant_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Health check endpoint.
async fn health_handler(State(gw): State<SharedGateway>) -> impl IntoResponse {
    let sessions = gw.sessions().await.active_count();
    Json(serde_json::json!({
        "status": "ok",
        "sessions": sessions,
        "uptime_secs": gw.uptime_secs(),
    }))
}

async fn create_session_handler(State(gw): State<SharedGateway>) -> impl IntoResponse {
    let id = gw.sessions().await.create_session();
    info!(session = id.as_str(), "Session created");
    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "session_id": id })),
    )
}

async fn set_input_dimensions_handler(
    State(gw): State<SharedGateway>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<GeometryTrace>, ApiError> {
    let session = session_id(&headers)?;
    let req: SetInputRequest = parse_body(&body)?;
    if req.height <= 0 || req.width <= 0 || req.channels <= 0 {
        return Err(ApiError::bad_request("Dimensions must be positive integers"));
    }

    let mut sessions = gw.sessions().await;
    let engine = sessions.engine_mut(&session);
    engine
        .set_input_dimensions(req.height, req.width, req.channels)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(Json(engine.compute_trace()))
}

async fn upload_image_handler(
    State(gw): State<SharedGateway>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let session = session_id(&headers)?;
    let mut multipart = multipart.map_err(|e| ApiError {
        status: e.status(),
        message: e.body_text(),
    })?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }
        // Plain form fields named "image" carry no file name and are not uploads.
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if file_name.is_empty() {
            return Err(ApiError::bad_request("No file selected"));
        }
        upload = Some((file_name, field.bytes().await?));
        break;
    }
    let (file_name, bytes) = upload.ok_or_else(|| ApiError::bad_request("No image file provided"))?;

    let dims = ImageDimensions::from_bytes(&bytes).map_err(|e| {
        debug!(file = file_name.as_str(), error = %e, "Upload is not a readable image");
        ApiError::bad_request("Could not read image file")
    })?;

    let mut sessions = gw.sessions().await;
    let engine = sessions.engine_mut(&session);
    engine
        .set_input_dimensions(
            i64::from(dims.height),
            i64::from(dims.width),
            i64::from(dims.channels),
        )
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let state = engine.compute_trace();
    info!(
        file = file_name.as_str(),
        height = dims.height,
        width = dims.width,
        channels = dims.channels,
        "Image uploaded"
    );

    Ok(Json(serde_json::json!({
        "message": "Image uploaded successfully",
        "dimensions": dims,
        "calculator_state": state,
    })))
}

async fn add_layer_handler(
    State(gw): State<SharedGateway>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<GeometryTrace>, ApiError> {
    let session = session_id(&headers)?;
    let spec: LayerSpec = parse_body(&body)?;
    let layer = spec.into_descriptor().map_err(|e| match e {
        RfscopeError::UnknownCategory { .. } => ApiError::bad_request("Invalid layer type"),
        RfscopeError::Validation(v) => ApiError::bad_request(v.to_string()),
        other => ApiError::bad_request(other.to_string()),
    })?;

    let mut sessions = gw.sessions().await;
    Ok(Json(sessions.engine_mut(&session).add_layer(layer)))
}

async fn reset_handler(
    State(gw): State<SharedGateway>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let session = session_id(&headers)?;
    gw.sessions().await.engine_mut(&session).reset();
    Ok(Json(serde_json::json!({ "message": "Reset successful" })))
}

async fn current_state_handler(
    State(gw): State<SharedGateway>,
    headers: HeaderMap,
) -> Result<Json<GeometryTrace>, ApiError> {
    let session = session_id(&headers)?;
    // Reads never create a session.
    let trace = match gw.sessions().await.get(&session) {
        Some(existing) => existing.engine.compute_trace(),
        None => ReceptiveFieldEngine::new().compute_trace(),
    };
    Ok(Json(trace))
}

async fn chat_handler(
    State(gw): State<SharedGateway>,
    body: Bytes,
) -> Result<Json<ChatReply>, ApiError> {
    let req: ChatRequest = parse_body(&body)?;
    let message = req.message.trim();
    if message.is_empty() {
        return Err(ApiError::bad_request("Message cannot be empty"));
    }

    let result = match gw.assistant() {
        Some(assistant) => assistant.ask(message).await,
        None => Err(AssistantError::NotConfigured {
            reason: "no assistant configured".to_string(),
        }),
    };
    if let Err(e) = &result {
        warn!(error = %e, "Assistant request failed");
    }
    Ok(Json(ChatReply::from(result)))
}

async fn test_assistant_handler(State(gw): State<SharedGateway>) -> Json<ChatReply> {
    let Some(assistant) = gw.assistant() else {
        return Json(ChatReply::failed("Model not initialized".to_string()));
    };
    match assistant.probe().await {
        Ok(text) => Json(ChatReply::answered(text)),
        Err(e) => {
            warn!(assistant = assistant.name(), error = %e, "Assistant probe failed");
            Json(ChatReply::failed(e.to_string()))
        }
    }
}

/// Start the gateway server on the configured address.
///
/// This is an async function that runs until cancelled.
pub async fn run(gw: SharedGateway) -> Result<(), std::io::Error> {
    let addr = gw.config().bind_addr();
    let app = router(gw);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = addr.as_str(), "Gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}
