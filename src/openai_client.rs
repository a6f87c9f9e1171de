use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::cli::chat::conversation_state::{Message, Role};
use crate::settings::Settings;

/// Classification of a failed completion request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionErrorKind {
    /// Connection failures and timeouts
    Network,
    /// 401 or 403
    Auth,
    /// 429
    RateLimit,
    /// 5xx
    Server,
    /// Any other non-success status
    InvalidRequest,
    /// Body could not be decoded as a chat completion
    MalformedResponse,
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct CompletionError {
    pub kind: CompletionErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl CompletionError {
    pub fn new(kind: CompletionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::Network, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::MalformedResponse, message)
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let kind = match status.as_u16() {
            401 | 403 => CompletionErrorKind::Auth,
            429 => CompletionErrorKind::RateLimit,
            500..=599 => CompletionErrorKind::Server,
            _ => CompletionErrorKind::InvalidRequest,
        };
        Self {
            kind,
            status: Some(status.as_u16()),
            message: format!("API request failed ({}): {}", status, body),
        }
    }
}

/// One candidate completion, as returned by the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub index: u32,
    pub content: String,
    pub finish_reason: Option<String>,
}

/// Remote chat completion service
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Request completions for the whole `messages` history.
    /// Choices come back in the order the service produced them.
    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
    ) -> Result<Vec<Choice>, CompletionError>;
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    n: Option<u32>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    #[serde(default)]
    index: u32,
    message: WireChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiClient {
    api_key: String,
    endpoint: String,
    candidates: u32,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(settings: &Settings) -> Result<Self, CompletionError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| CompletionError::network(format!("Failed to create HTTP client: {}", e)))?;

        let endpoint = format!(
            "{}/chat/completions",
            settings.base_url.as_str().trim_end_matches('/')
        );

        Ok(Self {
            api_key: settings.api_key.clone(),
            endpoint,
            candidates: settings.candidates,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
    ) -> Result<Vec<Choice>, CompletionError> {
        let request_body = ChatCompletionRequest {
            model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role,
                    content: &m.content,
                })
                .collect(),
            n: (self.candidates > 1).then_some(self.candidates),
        };

        if let Ok(pretty) = serde_json::to_string_pretty(&request_body) {
            debug!("Sending request to {}: {}", self.endpoint, pretty);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| CompletionError::network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CompletionError::network(e.to_string()))?;

        if !status.is_success() {
            error!("API request failed with response: {}", body);
            return Err(CompletionError::from_status(status, &body));
        }

        debug!("Received response: {}", body);

        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| CompletionError::malformed(format!("Unexpected response shape: {}", e)))?;

        Ok(parsed
            .choices
            .into_iter()
            .map(|c| Choice {
                index: c.index,
                content: c.message.content.unwrap_or_default(),
                finish_reason: c.finish_reason,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use httpmock::prelude::*;
    use serde_json::json;
    use url::Url;

    use super::*;

    fn settings(server: &MockServer, candidates: u32) -> Settings {
        Settings {
            api_key: "sk-test".to_string(),
            base_url: Url::parse(&server.url("/v1")).unwrap(),
            model: "gpt-4o".to_string(),
            candidates,
            timeout: None,
        }
    }

    fn history() -> Vec<Message> {
        vec![
            Message::user("Hello"),
            Message::assistant("Hi there!"),
            Message::user("How are you?"),
        ]
    }

    #[tokio::test]
    async fn posts_full_history_and_returns_choices_in_order() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer sk-test")
                    .json_body(json!({
                        "model": "gpt-4o",
                        "messages": [
                            {"role": "user", "content": "Hello"},
                            {"role": "assistant", "content": "Hi there!"},
                            {"role": "user", "content": "How are you?"}
                        ]
                    }));
                then.status(200).json_body(json!({
                    "id": "chatcmpl-1",
                    "choices": [
                        {
                            "index": 0,
                            "message": {"role": "assistant", "content": "Fine."},
                            "finish_reason": "stop"
                        },
                        {
                            "index": 1,
                            "message": {"role": "assistant", "content": "Great!"},
                            "finish_reason": "length"
                        }
                    ]
                }));
            })
            .await;

        let client = OpenAiClient::new(&settings(&server, 1)).unwrap();
        let choices = client.complete("gpt-4o", &history()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(choices.len(), 2);
        assert_eq!(choices[0].content, "Fine.");
        assert_eq!(choices[1].content, "Great!");
        assert_eq!(choices[1].finish_reason.as_deref(), Some("length"));
    }

    #[tokio::test]
    async fn sends_candidate_count_when_more_than_one() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .json_body_partial(r#"{"n": 3}"#);
                then.status(200).json_body(json!({"choices": []}));
            })
            .await;

        let client = OpenAiClient::new(&settings(&server, 3)).unwrap();
        let choices = client.complete("gpt-4o", &history()).await.unwrap();

        mock.assert_async().await;
        assert!(choices.is_empty());
    }

    #[tokio::test]
    async fn null_content_reads_as_empty() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).json_body(json!({
                    "choices": [{"index": 0, "message": {"role": "assistant", "content": null}}]
                }));
            })
            .await;

        let client = OpenAiClient::new(&settings(&server, 1)).unwrap();
        let choices = client.complete("gpt-4o", &history()).await.unwrap();
        assert_eq!(choices[0].content, "");
        assert_eq!(choices[0].finish_reason, None);
    }

    #[tokio::test]
    async fn classifies_error_statuses() {
        let cases = [
            (401, CompletionErrorKind::Auth),
            (403, CompletionErrorKind::Auth),
            (429, CompletionErrorKind::RateLimit),
            (503, CompletionErrorKind::Server),
            (400, CompletionErrorKind::InvalidRequest),
        ];

        for (status, kind) in cases {
            let server = MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.method(POST).path("/v1/chat/completions");
                    then.status(status).body("nope");
                })
                .await;

            let client = OpenAiClient::new(&settings(&server, 1)).unwrap();
            let err = client.complete("gpt-4o", &history()).await.unwrap_err();
            assert_eq!(err.kind, kind, "status {}", status);
            assert_eq!(err.status, Some(status));
            assert!(err.message.contains("nope"));
        }
    }

    #[tokio::test]
    async fn unexpected_body_is_malformed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).body("<html>gateway</html>");
            })
            .await;

        let client = OpenAiClient::new(&settings(&server, 1)).unwrap();
        let err = client.complete("gpt-4o", &history()).await.unwrap_err();
        assert_eq!(err.kind, CompletionErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn unreachable_server_is_network_error() {
        let settings = Settings {
            api_key: "sk-test".to_string(),
            base_url: Url::parse("http://127.0.0.1:1/v1").unwrap(),
            model: "gpt-4o".to_string(),
            candidates: 1,
            timeout: None,
        };
        let client = OpenAiClient::new(&settings).unwrap();
        assert_eq!(client.endpoint(), "http://127.0.0.1:1/v1/chat/completions");

        let err = client.complete("gpt-4o", &history()).await.unwrap_err();
        assert_eq!(err.kind, CompletionErrorKind::Network);
        assert_eq!(err.status, None);
    }

    #[tokio::test]
    async fn slow_server_times_out_as_network_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200)
                    .delay(Duration::from_secs(2))
                    .json_body(json!({"choices": []}));
            })
            .await;

        let settings = Settings {
            timeout: Some(Duration::from_millis(200)),
            ..settings(&server, 1)
        };
        let client = OpenAiClient::new(&settings).unwrap();

        let err = client.complete("gpt-4o", &history()).await.unwrap_err();
        assert_eq!(err.kind, CompletionErrorKind::Network);
        assert_eq!(err.status, None);
    }
}
