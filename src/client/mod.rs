//! Generative content client.
//!
//! The orchestrator depends on the `GenerativeClient` trait, never on a
//! concrete transport, so tests substitute a scripted double and the retry
//! loop stays deterministic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::errors::TransportError;
use crate::prompt::PromptPair;

/// Capability interface over the external generative service.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// One prompt round-trip. Returns the raw completion text or a typed
    /// transport failure; retry policy belongs to the caller.
    async fn complete(&self, prompt: &PromptPair) -> Result<String, TransportError>;
}

/// HTTP client for a chat-completions style endpoint.
pub struct HttpGenerativeClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl HttpGenerativeClient {
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl GenerativeClient for HttpGenerativeClient {
    async fn complete(&self, prompt: &PromptPair) -> Result<String, TransportError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let decoded: ChatResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let content = decoded
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(TransportError::EmptyCompletion);
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_serializes_role_order() {
        let request = ChatRequest {
            model: "test-model",
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "s",
                },
                ChatMessage {
                    role: "user",
                    content: "u",
                },
            ],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "test-model");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
    }

    #[test]
    fn chat_response_tolerates_null_content() {
        let json = r#"{"choices": [{"message": {"content": null}}]}"#;
        let decoded: ChatResponse = serde_json::from_str(json).unwrap();
        assert!(decoded.choices[0].message.content.is_none());
    }

    #[test]
    fn chat_response_tolerates_empty_choices() {
        let decoded: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(decoded.choices.is_empty());
    }
}
