//! # HTTP Gateway
//!
//! JSON-over-HTTP surface for the receptive-field engine. Each logical client
//! session owns its own engine; requests select a session with the
//! `x-session-id` header and fall back to a shared default session.

mod server;
mod session;

pub use server::{router as gateway_router, run as run_gateway, GatewayServer, SharedGateway};
pub use session::{EngineSession, EngineSessions, DEFAULT_SESSION_ID, SESSION_HEADER};

use serde::{Deserialize, Serialize};

/// Configuration for the HTTP gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Largest accepted request body, which bounds image uploads.
    pub max_upload_bytes: usize,
    /// Maximum number of live engine sessions before the least recently
    /// used one is evicted.
    pub max_sessions: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            max_upload_bytes: 16 * 1024 * 1024,
            max_sessions: 64,
        }
    }
}

impl GatewayConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
