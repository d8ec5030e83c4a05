//! OpenAI chat-completions client
//!
//! Shared by the progressive extractor (temperature 0, strict JSON) and the
//! RAG answer generator (temperature 0.3, conversational).

use crate::config::OpenAiConfig;
use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One message in a chat-completions request
#[derive(Clone, Debug, Serialize)]
pub struct LlmMessage {
    pub role: &'static str,
    pub content: String,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system", content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user", content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant", content: content.into() }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [LlmMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
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

/// Chat-completions client over the OpenAI HTTP API
pub struct ChatCompletions {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl ChatCompletions {
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_base: config.api_base.clone(),
            model: config.chat_model.clone(),
        })
    }

    /// The configured chat model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Issue one completion and return the assistant text
    pub async fn complete(
        &self,
        messages: &[LlmMessage],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base);
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature,
            max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::LlmTransport {
                message: format!("request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LlmTransport {
                message: format!("API error {}: {}", status, body),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| AppError::LlmTransport {
            message: format!("unparseable response: {}", e),
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| AppError::LlmInvalidResponse {
                message: "empty completion".to_string(),
            })
    }
}

/// Strip fenced-code markers from a model reply.
///
/// Models frequently wrap JSON in ```json ... ``` fences despite being told
/// not to; the payload inside the fence is what gets parsed.
pub fn strip_code_fences(reply: &str) -> String {
    let trimmed = reply.trim();

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
        return after.trim().to_string();
    }

    if trimmed.contains("```") {
        return trimmed.replace("```", "").trim().to_string();
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fence() {
        let reply = "```json\n{\"apelido_edital\": \"Universal\"}\n```";
        assert_eq!(strip_code_fences(reply), "{\"apelido_edital\": \"Universal\"}");
    }

    #[test]
    fn test_strip_bare_fence() {
        let reply = "```\n{\"custeio\": true}\n```";
        assert_eq!(strip_code_fences(reply), "{\"custeio\": true}");
    }

    #[test]
    fn test_unfenced_reply_is_untouched() {
        let reply = "{\"capital\": false}";
        assert_eq!(strip_code_fences(reply), reply);
    }

    #[test]
    fn test_fence_with_leading_prose() {
        let reply = "Segue o JSON:\n```json\n{\"origem\": \"CNPq\"}\n```\nEspero ter ajudado.";
        assert_eq!(strip_code_fences(reply), "{\"origem\": \"CNPq\"}");
    }
}
