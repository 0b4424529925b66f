use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::chat::ChatTurn;

const EMBEDDING_MODEL: &str = "models/text-embedding-004";
pub const EMBEDDING_DIMENSION: u64 = 768;
const CHAT_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("Gemini request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Gemini API error ({status}): {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Failed to parse Gemini response: {0}")]
    Parse(#[from] serde_json::Error),
}

impl GeminiError {
    pub fn is_transient(&self) -> bool {
        match self {
            GeminiError::Transport(err) => err.is_connect() || err.is_timeout(),
            GeminiError::Api { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            GeminiError::Parse(_) => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct EmbedContentRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "outputDimensionality")]
    output_dimensionality: Option<u32>,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<TextPart>,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: Embedding,
}

#[derive(Debug, Deserialize)]
struct Embedding {
    values: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatTurn>,
    stream: bool,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }

    pub async fn embed_content(&self, text: &str) -> Result<Vec<f32>, GeminiError> {
        let url = format!(
            "{}/{}:embedContent?key={}",
            self.base_url, EMBEDDING_MODEL, self.api_key
        );

        let request = EmbedContentRequest {
            model: EMBEDDING_MODEL.to_string(),
            content: EmbedContent {
                parts: vec![TextPart {
                    text: text.to_string(),
                }],
            },
            output_dimensionality: Some(EMBEDDING_DIMENSION as u32),
        };

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let result: EmbedContentResponse = response.json().await?;
            Ok(result.embedding.values)
        } else {
            let body = response.text().await?;
            Err(GeminiError::Api { status, body })
        }
    }

    /// Embeds with exponential backoff on transient failures. Used on the
    /// upload path, where a retry costs seconds rather than a stalled chat.
    pub async fn embed_content_with_retry(&self, text: &str) -> Result<Vec<f32>, GeminiError> {
        let backoff_config = ExponentialBackoff {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(120)),
            ..Default::default()
        };

        retry(backoff_config, || async {
            self.embed_content(text).await.map_err(|err| {
                if err.is_transient() {
                    tracing::warn!("Transient embedding error, retrying: {}", err);
                    backoff::Error::transient(err)
                } else {
                    backoff::Error::permanent(err)
                }
            })
        })
        .await
    }

    /// Opens a streaming completion over the OpenAI-compatible endpoint.
    pub async fn stream_chat_completion(
        &self,
        turns: &[ChatTurn],
    ) -> Result<CompletionStream, GeminiError> {
        let url = format!("{}/openai/chat/completions", self.base_url);

        let request = ChatCompletionRequest {
            model: CHAT_MODEL.to_string(),
            messages: turns.to_vec(),
            stream: true,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(GeminiError::Api { status, body });
        }

        Ok(CompletionStream {
            response,
            line_buffer: String::new(),
            done: false,
        })
    }
}

/// Incremental reader over a server-sent-events completion body.
///
/// Chunks arrive on arbitrary byte boundaries, so bytes are buffered until a
/// full line is available before parsing.
pub struct CompletionStream {
    response: reqwest::Response,
    line_buffer: String,
    done: bool,
}

impl CompletionStream {
    /// Returns the next content token, or None once the stream has ended.
    pub async fn next_token(&mut self) -> Result<Option<String>, GeminiError> {
        loop {
            if self.done {
                return Ok(None);
            }

            if let Some(newline) = self.line_buffer.find('\n') {
                let line = self.line_buffer[..newline].trim_end_matches('\r').to_string();
                self.line_buffer.drain(..=newline);
                match parse_sse_line(&line)? {
                    SseLine::Token(token) => return Ok(Some(token)),
                    SseLine::Done => {
                        self.done = true;
                        return Ok(None);
                    }
                    SseLine::Skip => continue,
                }
            }

            match self.response.chunk().await? {
                Some(chunk) => {
                    self.line_buffer.push_str(&String::from_utf8_lossy(&chunk));
                }
                None => {
                    self.done = true;
                    let line = self.line_buffer.trim_end_matches('\r').to_string();
                    self.line_buffer.clear();
                    if line.is_empty() {
                        return Ok(None);
                    }
                    return match parse_sse_line(&line)? {
                        SseLine::Token(token) => Ok(Some(token)),
                        _ => Ok(None),
                    };
                }
            }
        }
    }
}

#[derive(Debug, PartialEq)]
enum SseLine {
    Token(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> Result<SseLine, serde_json::Error> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data: ") else {
        // Blank keep-alives, comments and event names carry no tokens.
        return Ok(SseLine::Skip);
    };

    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    let value: serde_json::Value = serde_json::from_str(data)?;
    match value["choices"][0]["delta"]["content"].as_str() {
        Some(content) if !content.is_empty() => Ok(SseLine::Token(content.to_string())),
        _ => Ok(SseLine::Skip),
    }
}
