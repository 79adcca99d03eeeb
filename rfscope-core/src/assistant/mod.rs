//! Optional question-answering collaborator.
//!
//! The gateway's chat endpoint forwards free-form questions to a
//! [`QuestionAnswerer`]. The engine never depends on it; when no assistant is
//! configured the chat endpoint simply reports that.

pub mod gemini;

use crate::error::AssistantError;
use crate::secrets::{CredentialStore, SecretRef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use gemini::GeminiAssistant;

/// Keychain account that `rfscope auth set` stores the API key under.
pub const KEYCHAIN_ACCOUNT: &str = "assistant:gemini";

/// Prompt sent by [`QuestionAnswerer::probe`].
pub const PROBE_PROMPT: &str = "Say 'Hello'";

const DEFAULT_CONTEXT: &str = "You are a helpful AI assistant. You can answer questions about:
- Neural networks and CNNs
- Receptive field calculations
- General AI/ML concepts
- Any other questions users might have

Keep responses clear and concise.";

/// Answers free-form questions.
#[async_trait]
pub trait QuestionAnswerer: Send + Sync {
    /// Answer a user question.
    async fn ask(&self, question: &str) -> Result<String, AssistantError>;

    /// Cheap round-trip used to check that credentials and model work.
    async fn probe(&self) -> Result<String, AssistantError> {
        self.ask(PROBE_PROMPT).await
    }

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Shared handle to an assistant.
pub type SharedAssistant = Arc<dyn QuestionAnswerer>;

/// Configuration for the question-answering collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Whether the chat endpoints talk to a provider at all.
    pub enabled: bool,
    /// Provider name. Only "gemini" is supported.
    pub provider: String,
    pub model: String,
    /// Where the API key lives (`env:VAR`, `keychain:account`, or inline).
    pub api_key: SecretRef,
    /// Optional base URL override for the API endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_output_tokens: u32,
    pub temperature: f64,
    /// Text placed before every user question.
    pub system_context: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "gemini".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key: SecretRef::env("GEMINI_API_KEY"),
            base_url: None,
            timeout_secs: 60,
            max_output_tokens: 1024,
            temperature: 0.7,
            system_context: DEFAULT_CONTEXT.to_string(),
        }
    }
}

/// Full prompt for a user question.
fn compose_prompt(system_context: &str, question: &str) -> String {
    format!("{system_context}\n\nUser question: {question}")
}

/// Build the configured assistant.
///
/// Returns `Ok(None)` when the assistant is disabled, and
/// `AssistantError::NotConfigured` when it is enabled but cannot be set up.
pub fn build_assistant(
    config: &AssistantConfig,
    store: &dyn CredentialStore,
) -> Result<Option<SharedAssistant>, AssistantError> {
    if !config.enabled {
        return Ok(None);
    }
    if config.provider != "gemini" {
        return Err(AssistantError::NotConfigured {
            reason: format!("unsupported provider '{}'", config.provider),
        });
    }
    let api_key = config
        .api_key
        .resolve(store)
        .map_err(|e| AssistantError::NotConfigured {
            reason: e.to_string(),
        })?;
    let assistant = GeminiAssistant::new(config, api_key)?;
    tracing::info!(model = config.model.as_str(), "Assistant configured");
    Ok(Some(Arc::new(assistant)))
}

/// JSON body returned by the chat endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatReply {
    pub fn answered(response: String) -> Self {
        Self {
            success: true,
            response: Some(response),
            error: None,
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            success: false,
            response: None,
            error: Some(error),
        }
    }
}

impl From<Result<String, AssistantError>> for ChatReply {
    fn from(result: Result<String, AssistantError>) -> Self {
        match result {
            Ok(text) => Self::answered(text),
            Err(e) => Self::failed(e.user_message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::InMemoryCredentialStore;

    struct Echo;

    #[async_trait]
    impl QuestionAnswerer for Echo {
        async fn ask(&self, question: &str) -> Result<String, AssistantError> {
            Ok(format!("echo: {question}"))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn test_default_probe_uses_ask() {
        let reply = Echo.probe().await.unwrap();
        assert_eq!(reply, "echo: Say 'Hello'");
    }

    #[test]
    fn test_compose_prompt() {
        assert_eq!(compose_prompt("ctx", "why?"), "ctx\n\nUser question: why?");
    }

    #[test]
    fn test_build_disabled_returns_none() {
        let store = InMemoryCredentialStore::new();
        let built = build_assistant(&AssistantConfig::default(), &store).unwrap();
        assert!(built.is_none());
    }

    #[test]
    fn test_build_missing_key_is_not_configured() {
        let store = InMemoryCredentialStore::new();
        let config = AssistantConfig {
            enabled: true,
            api_key: SecretRef::keychain(KEYCHAIN_ACCOUNT),
            ..AssistantConfig::default()
        };
        let err = build_assistant(&config, &store).err().unwrap();
        assert!(matches!(err, AssistantError::NotConfigured { .. }));
    }

    #[test]
    fn test_build_unsupported_provider() {
        let store = InMemoryCredentialStore::new();
        let config = AssistantConfig {
            enabled: true,
            provider: "openai".into(),
            ..AssistantConfig::default()
        };
        let err = build_assistant(&config, &store).err().unwrap();
        assert!(err.to_string().contains("unsupported provider"));
    }

    #[test]
    fn test_build_with_keychain_key() {
        let store = InMemoryCredentialStore::new();
        store.store_key(KEYCHAIN_ACCOUNT, "k").unwrap();
        let config = AssistantConfig {
            enabled: true,
            api_key: SecretRef::keychain(KEYCHAIN_ACCOUNT),
            ..AssistantConfig::default()
        };
        let built = build_assistant(&config, &store).unwrap().unwrap();
        assert_eq!(built.name(), "gemini");
    }

    #[test]
    fn test_chat_reply_shapes() {
        let ok = serde_json::to_value(ChatReply::from(Ok("hi".to_string()))).unwrap();
        assert_eq!(ok, serde_json::json!({"success": true, "response": "hi"}));

        let err = serde_json::to_value(ChatReply::from(Err(AssistantError::QuotaExceeded))).unwrap();
        assert_eq!(err["success"], false);
        assert!(err["error"].as_str().unwrap().contains("quota"));
        assert!(err.get("response").is_none());
    }
}
