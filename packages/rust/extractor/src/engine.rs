//! Extraction engines.
//!
//! [`ExtractionEngine`] is the opaque capability: prompt + source + schema in,
//! JSON out. [`OpenAiEngine`] implements it against any OpenAI-compatible
//! `chat/completions` endpoint using strict `json_schema` output.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use lazylist_shared::{EngineConfig, LazyListError, Result};

use crate::schema::ExtractionSchema;

/// User-Agent string for engine requests.
const USER_AGENT: &str = concat!("lazylist/", env!("CARGO_PKG_VERSION"));

/// Longest slice of an error body echoed back in error messages.
const ERROR_BODY_PREVIEW: usize = 300;

// ---------------------------------------------------------------------------
// Engine seam
// ---------------------------------------------------------------------------

/// Everything an engine receives for one extraction.
#[derive(Debug, Clone, Copy)]
pub struct EngineRequest<'a> {
    /// Natural-language extraction goal.
    pub prompt: &'a str,
    /// Materialized page HTML, untouched.
    pub source: &'a str,
    /// Output contract the answer must satisfy.
    pub schema: &'a ExtractionSchema,
}

/// An opaque, possibly non-deterministic structured-extraction capability.
#[async_trait]
pub trait ExtractionEngine: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Produce a JSON value meant to satisfy `request.schema`.
    ///
    /// Engines do not validate or repair their output; the caller does.
    async fn run(&self, request: &EngineRequest<'_>) -> Result<Value>;
}

// ---------------------------------------------------------------------------
// Wire types (OpenAI chat completions)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    response_format: ResponseFormat<'a>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    strict: bool,
    schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

// ---------------------------------------------------------------------------
// OpenAiEngine
// ---------------------------------------------------------------------------

/// Strict structured-output extraction over an OpenAI-compatible API.
pub struct OpenAiEngine {
    client: Client,
    config: EngineConfig,
}

impl OpenAiEngine {
    /// Build the engine; `config` is already validated, so only the HTTP
    /// client can fail here.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| LazyListError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        self.config.model()
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url().as_str().trim_end_matches('/')
        )
    }
}

/// System prompt: the caller's instruction plus the output rules.
fn system_prompt(instruction: &str) -> String {
    format!(
        "You extract structured records from the HTML source of a web page.\n\
         Task: {instruction}\n\
         Answer with JSON that matches the provided schema exactly. \
         Use null for any optional field the page does not show; \
         never invent values and never use empty strings for missing data."
    )
}

fn preview(body: &str) -> &str {
    let mut end = body.len().min(ERROR_BODY_PREVIEW);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

#[async_trait]
impl ExtractionEngine for OpenAiEngine {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(skip_all, fields(model = %self.config.model(), source_bytes = request.source.len()))]
    async fn run(&self, request: &EngineRequest<'_>) -> Result<Value> {
        let system = system_prompt(request.prompt);
        let body = ChatRequest {
            model: self.config.model(),
            messages: vec![
                Message {
                    role: "system",
                    content: &system,
                },
                Message {
                    role: "user",
                    content: request.source,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: request.schema.name(),
                    strict: true,
                    schema: request.schema.as_value(),
                },
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.config.api_key().expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LazyListError::engine(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let reason = match status.as_u16() {
                401 | 403 => "credential rejected",
                429 => "rate limited",
                _ => "request rejected",
            };
            return Err(LazyListError::engine(format!(
                "{reason} (HTTP {status}): {}",
                preview(&text)
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| LazyListError::engine(format!("malformed engine response: {e}")))?;

        let choice = chat
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LazyListError::engine("engine returned no choices"))?;

        if let Some(refusal) = choice.message.refusal {
            return Err(LazyListError::engine(format!("engine refused: {refusal}")));
        }
        if choice.finish_reason.as_deref() == Some("length") {
            return Err(LazyListError::engine(
                "engine output truncated at the token limit",
            ));
        }

        let content = choice
            .message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LazyListError::engine("engine returned empty content"))?;

        debug!(bytes = content.len(), "engine answered");

        serde_json::from_str(&content)
            .map_err(|e| LazyListError::engine(format!("engine output is not valid JSON: {e}")))
    }
}
