//! AnthropicCompletionProvider -- concrete [`CompletionProvider`] for
//! Anthropic Claude.
//!
//! Sends non-streaming requests to the Anthropic Messages API
//! (`/v1/messages`). The full prior transcript is replayed as text messages;
//! only the current attachment travels as an inline base64 image.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is never logged
//! or included in `Debug` output.

use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::{ExposeSecret, SecretString};

use lectern_core::completion::{CompletionProvider, CompletionReply, CompletionRequest};
use lectern_types::config::CompletionSection;
use lectern_types::error::CompletionError;
use lectern_types::transcript::{Attachment, Turn, TurnRole};

use super::types::{
    AnthropicErrorBody, AnthropicMessage, AnthropicNonStreamResponse, AnthropicRequest,
    AnthropicRequestBlock, ImageSource,
};

/// Text sent for a turn that carried only an image.
const IMAGE_ONLY_PLACEHOLDER: &str = "[image]";

/// Anthropic Claude completion provider.
pub struct AnthropicCompletionProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicCompletionProvider {
    /// The Anthropic API version header value.
    const API_VERSION: &'static str = "2023-06-01";

    pub fn new(api_key: SecretString, config: &CompletionSection) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CompletionError::Rejected(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn to_anthropic_request(&self, request: &CompletionRequest<'_>) -> AnthropicRequest {
        let mut messages: Vec<AnthropicMessage> = request
            .history
            .iter()
            .map(|turn| AnthropicMessage {
                role: role_name(turn.role).to_string(),
                content: vec![text_block(history_text(turn))],
            })
            .collect();

        let mut content = Vec::with_capacity(2);
        if let Some(attachment) = request.attachment {
            content.push(image_block(attachment));
        }
        if !request.prompt.is_empty() || content.is_empty() {
            content.push(text_block(request.prompt.to_string()));
        }
        messages.push(AnthropicMessage {
            role: "user".to_string(),
            content,
        });

        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages,
            system: (!request.system.is_empty()).then(|| request.system.to_string()),
        }
    }
}

// No Debug derive: keeps the client and key out of any formatted output.

fn role_name(role: TurnRole) -> &'static str {
    match role {
        TurnRole::User => "user",
        TurnRole::Model => "assistant",
    }
}

fn history_text(turn: &Turn) -> String {
    let text = turn.text();
    if text.trim().is_empty() {
        IMAGE_ONLY_PLACEHOLDER.to_string()
    } else {
        text
    }
}

fn text_block(text: String) -> AnthropicRequestBlock {
    AnthropicRequestBlock::Text { text }
}

fn image_block(attachment: &Attachment) -> AnthropicRequestBlock {
    AnthropicRequestBlock::Image {
        source: ImageSource {
            source_type: "base64".to_string(),
            media_type: attachment.mime_type.clone(),
            data: BASE64.encode(&attachment.bytes),
        },
    }
}

/// Map a non-success HTTP status to the completion error taxonomy.
///
/// Rate limits, overload, and server errors are transient; authentication
/// and other client errors are not.
fn status_error(status: reqwest::StatusCode, body: &str) -> CompletionError {
    let detail = serde_json::from_str::<AnthropicErrorBody>(body)
        .map(|b| format!("{}: {}", b.error.error_type, b.error.message))
        .unwrap_or_else(|_| body.trim().to_string());

    match status.as_u16() {
        401 | 403 => CompletionError::Rejected(format!("authentication failed: {detail}")),
        408 | 429 => CompletionError::Unavailable(format!("HTTP {status}: {detail}")),
        529 => CompletionError::Unavailable(format!("overloaded: {detail}")),
        s if s >= 500 => CompletionError::Unavailable(format!("HTTP {status}: {detail}")),
        _ => CompletionError::Rejected(format!("HTTP {status}: {detail}")),
    }
}

impl CompletionProvider for AnthropicCompletionProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(
        &self,
        request: &CompletionRequest<'_>,
    ) -> Result<CompletionReply, CompletionError> {
        let body = self.to_anthropic_request(request);
        let url = self.url("/v1/messages");
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", Self::API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Unavailable(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &error_body));
        }

        let anthropic_resp: AnthropicNonStreamResponse = response.json().await.map_err(|e| {
            CompletionError::Unavailable(format!("failed to parse response: {e}"))
        })?;

        tracing::debug!(
            model = %anthropic_resp.model,
            input_tokens = anthropic_resp.usage.input_tokens,
            output_tokens = anthropic_resp.usage.output_tokens,
            stop_reason = anthropic_resp.stop_reason.as_deref().unwrap_or("unknown"),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "completion finished"
        );

        Ok(CompletionReply {
            text: anthropic_resp.text(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lectern_types::transcript::{MediaRef, TurnPart};
    use uuid::Uuid;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_provider(base_url: &str) -> AnthropicCompletionProvider {
        let config = CompletionSection {
            base_url: base_url.to_string(),
            timeout_secs: 5,
            ..CompletionSection::default()
        };
        AnthropicCompletionProvider::new(SecretString::from("test-key-not-real"), &config).unwrap()
    }

    fn turn(sequence_no: u32, role: TurnRole, text: &str) -> Turn {
        Turn {
            session_id: Uuid::now_v7(),
            sequence_no,
            role,
            parts: vec![TurnPart::text(text)],
            created_at: Utc::now(),
        }
    }

    fn png_attachment() -> Attachment {
        Attachment {
            media_ref: MediaRef("decks/s/g/page-1.png".to_string()),
            mime_type: "image/png".to_string(),
            bytes: vec![0x89, b'P', b'N', b'G'],
        }
    }

    fn ok_body(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "model": "claude-sonnet-4-20250514",
            "content": [{"type": "text", "text": text}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        })
    }

    #[test]
    fn test_provider_name() {
        let provider = make_provider("https://api.anthropic.com");
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.model(), "claude-sonnet-4-20250514");
    }

    #[test]
    fn test_request_replays_history_and_attaches_image_last() {
        let provider = make_provider("https://api.anthropic.com");
        let history = vec![
            turn(0, TurnRole::User, "What is a heap?"),
            turn(1, TurnRole::Model, "A tree with the heap property."),
            turn(2, TurnRole::User, ""),
        ];
        let attachment = png_attachment();
        let request = CompletionRequest {
            system: "be brief",
            history: &history,
            prompt: "Explain this slide",
            attachment: Some(&attachment),
        };

        let json = serde_json::to_value(provider.to_anthropic_request(&request)).unwrap();
        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[2]["content"][0]["text"], IMAGE_ONLY_PLACEHOLDER);
        for m in &messages[..3] {
            assert_eq!(m["content"].as_array().unwrap().len(), 1);
            assert_eq!(m["content"][0]["type"], "text");
        }
        let last = &messages[3]["content"];
        assert_eq!(last[0]["type"], "image");
        assert_eq!(last[0]["source"]["data"], BASE64.encode(&attachment.bytes));
        assert_eq!(last[1]["text"], "Explain this slide");
        assert_eq!(json["system"], "be brief");
    }

    #[test]
    fn test_image_only_prompt_has_no_empty_text_block() {
        let provider = make_provider("https://api.anthropic.com");
        let attachment = png_attachment();
        let request = CompletionRequest {
            system: "",
            history: &[],
            prompt: "",
            attachment: Some(&attachment),
        };
        let json = serde_json::to_value(provider.to_anthropic_request(&request)).unwrap();
        let content = json["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0]["type"], "image");
        assert!(json.get("system").is_none());
    }

    #[test]
    fn test_status_mapping() {
        use reqwest::StatusCode;
        let overloaded = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;

        assert!(matches!(
            status_error(StatusCode::from_u16(529).unwrap(), overloaded),
            CompletionError::Unavailable(ref m) if m.contains("overloaded_error")
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, ""),
            CompletionError::Unavailable(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "upstream"),
            CompletionError::Unavailable(_)
        ));
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, ""),
            CompletionError::Rejected(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "bad image"),
            CompletionError::Rejected(ref m) if m.contains("bad image")
        ));
    }

    #[tokio::test]
    async fn test_complete_against_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key-not-real"))
            .and(header("anthropic-version", "2023-06-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("Heaps are trees.")))
            .expect(1)
            .mount(&server)
            .await;

        let provider = make_provider(&server.uri());
        let request = CompletionRequest {
            system: "",
            history: &[],
            prompt: "What is a heap?",
            attachment: None,
        };
        let reply = provider.complete(&request).await.unwrap();
        assert_eq!(reply.text, "Heaps are trees.");
    }

    #[tokio::test]
    async fn test_overloaded_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(529).set_body_string(
                r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
            ))
            .mount(&server)
            .await;

        let provider = make_provider(&server.uri());
        let request = CompletionRequest {
            system: "",
            history: &[],
            prompt: "hi",
            attachment: None,
        };
        let err = provider.complete(&request).await.unwrap_err();
        assert!(matches!(err, CompletionError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let provider = make_provider("http://127.0.0.1:9");
        let request = CompletionRequest {
            system: "",
            history: &[],
            prompt: "hi",
            attachment: None,
        };
        let err = provider.complete(&request).await.unwrap_err();
        assert!(matches!(err, CompletionError::Unavailable(_)));
    }
}
