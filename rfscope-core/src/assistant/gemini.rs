//! Google Gemini question-answering client.
//!
//! Talks to the `generateContent` REST endpoint. The API key is sent in the
//! `x-goog-api-key` header so it never appears in logged URLs.

use super::{compose_prompt, AssistantConfig, QuestionAnswerer, PROBE_PROMPT};
use crate::error::AssistantError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// The default Google Gemini API base URL.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini-backed [`QuestionAnswerer`].
pub struct GeminiAssistant {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_output_tokens: u32,
    temperature: f64,
    system_context: String,
}

impl std::fmt::Debug for GeminiAssistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiAssistant")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiAssistant {
    /// Create a client with an already-resolved API key.
    pub fn new(config: &AssistantConfig, api_key: String) -> Result<Self, AssistantError> {
        if api_key.trim().is_empty() {
            return Err(AssistantError::NotConfigured {
                reason: "empty API key".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AssistantError::Connection {
                message: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model: config.model.clone(),
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
            system_context: config.system_context.clone(),
        })
    }

    fn endpoint_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    fn build_request_body(&self, prompt: &str) -> Value {
        serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": prompt}],
            }],
            "generationConfig": {
                "maxOutputTokens": self.max_output_tokens,
                "temperature": self.temperature,
            },
        })
    }

    /// Concatenate the text parts of the first candidate.
    fn parse_response(body: &Value) -> Result<String, AssistantError> {
        let candidate = body["candidates"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| AssistantError::ResponseParse {
                message: "Missing or empty 'candidates' array in response".to_string(),
            })?;

        let parts = candidate["content"]["parts"]
            .as_array()
            .ok_or_else(|| AssistantError::ResponseParse {
                message: "Missing 'parts' array in candidate content".to_string(),
            })?;

        Ok(parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""))
    }

    fn map_http_error(&self, status: reqwest::StatusCode, body_text: &str) -> AssistantError {
        match status.as_u16() {
            429 => AssistantError::QuotaExceeded,
            401 | 403 => AssistantError::AccessDenied,
            404 => AssistantError::ModelNotFound {
                model: self.model.clone(),
            },
            _ if body_text.to_ascii_lowercase().contains("quota") => AssistantError::QuotaExceeded,
            _ => AssistantError::ApiRequest {
                message: format!("HTTP {status} from Gemini API: {body_text}"),
            },
        }
    }

    async fn generate(&self, prompt: &str) -> Result<String, AssistantError> {
        let url = self.endpoint_url();
        debug!(model = self.model.as_str(), url = url.as_str(), "Sending Gemini request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.build_request_body(prompt))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    AssistantError::Connection {
                        message: e.to_string(),
                    }
                } else {
                    AssistantError::ApiRequest {
                        message: format!("Request to Gemini API failed: {e}"),
                    }
                }
            })?;

        let status = response.status();
        let body_text = response.text().await.map_err(|e| AssistantError::ResponseParse {
            message: format!("Failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(self.map_http_error(status, &body_text));
        }

        let json: Value =
            serde_json::from_str(&body_text).map_err(|e| AssistantError::ResponseParse {
                message: format!("Invalid JSON in response: {e}"),
            })?;
        Self::parse_response(&json)
    }
}

#[async_trait]
impl QuestionAnswerer for GeminiAssistant {
    async fn ask(&self, question: &str) -> Result<String, AssistantError> {
        self.generate(&compose_prompt(&self.system_context, question)).await
    }

    async fn probe(&self) -> Result<String, AssistantError> {
        self.generate(PROBE_PROMPT).await
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_assistant() -> GeminiAssistant {
        GeminiAssistant::new(&AssistantConfig::default(), "test-key".to_string()).unwrap()
    }

    #[test]
    fn test_new_rejects_empty_key() {
        let err = GeminiAssistant::new(&AssistantConfig::default(), "  ".into()).unwrap_err();
        assert!(matches!(err, AssistantError::NotConfigured { .. }));
    }

    #[test]
    fn test_endpoint_url() {
        let assistant = make_assistant();
        assert_eq!(
            assistant.endpoint_url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );

        let config = AssistantConfig {
            base_url: Some("http://localhost:8089/v1/".into()),
            model: "gemini-pro".into(),
            ..AssistantConfig::default()
        };
        let custom = GeminiAssistant::new(&config, "k".into()).unwrap();
        assert_eq!(
            custom.endpoint_url(),
            "http://localhost:8089/v1/models/gemini-pro:generateContent"
        );
    }

    #[test]
    fn test_new_copies_request_settings() {
        let config = AssistantConfig {
            model: "gemini-pro".into(),
            max_output_tokens: 256,
            temperature: 0.2,
            system_context: "You explain CNN geometry.".into(),
            ..AssistantConfig::default()
        };
        let assistant = GeminiAssistant::new(&config, "k".into()).unwrap();
        assert_eq!(assistant.system_context, "You explain CNN geometry.");

        let body = assistant.build_request_body(&compose_prompt(&assistant.system_context, "why?"));
        assert_eq!(
            body["contents"][0]["parts"][0]["text"],
            "You explain CNN geometry.\n\nUser question: why?"
        );
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
        assert_eq!(body["generationConfig"]["temperature"], 0.2);
    }

    #[test]
    fn test_debug_hides_key() {
        let rendered = format!("{:?}", make_assistant());
        assert!(!rendered.contains("test-key"));
        assert!(rendered.contains("gemini-2.0-flash"));
    }

    #[test]
    fn test_build_request_body() {
        let assistant = make_assistant();
        let body = assistant.build_request_body("What is a receptive field?");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(
            body["contents"][0]["parts"][0]["text"],
            "What is a receptive field?"
        );
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
    }

    #[test]
    fn test_parse_text_response() {
        let body = serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "The region "}, {"text": "of input."}]},
                "finishReason": "STOP"
            }]
        });
        assert_eq!(
            GeminiAssistant::parse_response(&body).unwrap(),
            "The region of input."
        );
    }

    #[test]
    fn test_parse_missing_candidates() {
        let err = GeminiAssistant::parse_response(&serde_json::json!({"candidates": []})).unwrap_err();
        assert!(matches!(err, AssistantError::ResponseParse { .. }));

        let err = GeminiAssistant::parse_response(&serde_json::json!({
            "candidates": [{"content": {}}]
        }))
        .unwrap_err();
        assert!(matches!(err, AssistantError::ResponseParse { .. }));
    }

    #[test]
    fn test_http_error_mapping() {
        let assistant = make_assistant();

        let err = assistant.map_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "");
        assert!(matches!(err, AssistantError::QuotaExceeded));

        let err = assistant.map_http_error(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"error":{"message":"Quota exceeded for metric"}}"#,
        );
        assert!(matches!(err, AssistantError::QuotaExceeded));

        let err = assistant.map_http_error(reqwest::StatusCode::FORBIDDEN, "");
        assert!(matches!(err, AssistantError::AccessDenied));

        let err = assistant.map_http_error(reqwest::StatusCode::NOT_FOUND, "");
        match err {
            AssistantError::ModelNotFound { model } => assert_eq!(model, "gemini-2.0-flash"),
            other => panic!("Expected ModelNotFound, got {other:?}"),
        }

        let err = assistant.map_http_error(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "boom");
        match err {
            AssistantError::ApiRequest { message } => assert!(message.contains("500")),
            other => panic!("Expected ApiRequest, got {other:?}"),
        }
    }
}
