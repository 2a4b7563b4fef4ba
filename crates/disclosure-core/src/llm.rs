//! LLM chat + embedding client.
//!
//! Grounded in the teacher workspace's `docling-quality-verifier::client`
//! module (an `OpenAIClient` doing chat-completions with a JSON
//! `response_format`, bearer auth, and a configurable base URL for
//! Azure/local-compatible endpoints). Extended here with an embeddings
//! endpoint and the single-retry-then-empty-fallback rule from §7/§9
//! ("every LLM response is parsed through a strict schema; on parse
//! failure the single-retry rule applies, then the caller substitutes a
//! documented empty value").

use crate::error::{CoreError, Result};
use crate::config::Config;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A single chat message, either plain text or (for the vision extractor)
/// multimodal with an inlined base64 image.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: MessageContent::Text(text.into()),
        }
    }
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: MessageContent::Text(text.into()),
        }
    }
    pub fn user_with_image(text: impl Into<String>, image_base64: &str) -> Self {
        Self {
            role: "user",
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:image/png;base64,{image_base64}"),
                    },
                },
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequestBody {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingRequestBody<'a> {
    model: String,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponseBody {
    data: Vec<EmbeddingEntry>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingEntry {
    embedding: Vec<f32>,
}

/// Result of a chat call: raw text content plus token usage, so callers
/// that track `ExtractionMetadata.vision_tokens_used` can accumulate it.
pub struct ChatOutcome {
    pub content: String,
    pub tokens_used: u64,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: usize,
    ) -> Result<ChatOutcome>;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Real client talking to an OpenAI-compatible chat + embeddings API
/// (including Azure OpenAI, via a caller-supplied base URL).
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    embedding_model: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .openai_api_key()
            .ok_or_else(|| CoreError::Config("OPENAI_API_KEY not set".into()))?
            .to_string();
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| CoreError::Config(format!("failed to build HTTP client: {e}")))?;
        let base_url = config
            .azure_endpoint()
            .map(|e| e.trim_end_matches('/').to_string())
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        Ok(Self {
            http,
            api_key,
            model: config.openai_model().to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            base_url,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, messages: Vec<ChatMessage>, max_tokens: usize) -> Result<ChatOutcome> {
        let body = ChatRequestBody {
            model: self.model.clone(),
            messages,
            max_tokens,
            temperature: 0.0,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::model("chat_completion", e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CoreError::model("chat_completion", e.to_string()))?;
        if !status.is_success() {
            return Err(CoreError::model(
                "chat_completion",
                format!("status {status}: {text}"),
            ));
        }

        let parsed: ChatResponseBody = serde_json::from_str(&text)
            .map_err(|e| CoreError::model("chat_completion", format!("bad response json: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CoreError::model("chat_completion", "no content in response"))?;
        Ok(ChatOutcome {
            content,
            tokens_used: parsed.usage.map(|u| u.total_tokens).unwrap_or(0),
        })
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequestBody {
            model: self.embedding_model.clone(),
            input: texts,
        };
        let response = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::model("embeddings", e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CoreError::model("embeddings", e.to_string()))?;
        if !status.is_success() {
            return Err(CoreError::model("embeddings", format!("status {status}: {text}")));
        }
        let parsed: EmbeddingResponseBody = serde_json::from_str(&text)
            .map_err(|e| CoreError::model("embeddings", format!("bad response json: {e}")))?;
        Ok(parsed.data.into_iter().map(|e| e.embedding).collect())
    }
}

/// Calls `f` once, and on `ModelError`/`Timeout` retries exactly once
/// (§7's "recovered locally with a single retry"), logging the first
/// failure at `warn`. The second failure is returned to the caller, who
/// is responsible for substituting the documented empty value.
pub async fn call_with_single_retry<T, F, Fut>(operation: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    match f().await {
        Ok(v) => Ok(v),
        Err(first_err) => {
            warn!(operation, error = %first_err, "model call failed, retrying once");
            f().await.map_err(|second_err| {
                warn!(operation, error = %second_err, "model call failed on retry, giving up");
                second_err
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn retry_succeeds_on_second_attempt() {
        let attempts = AtomicUsize::new(0);
        let result: Result<u32> = call_with_single_retry("test", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(CoreError::model("test", "first failure"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_gives_up_after_two_failures() {
        let attempts = AtomicUsize::new(0);
        let result: Result<u32> = call_with_single_retry("test", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err(CoreError::model("test", "always fails")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
