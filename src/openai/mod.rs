
use std::io::{BufRead, BufReader};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::{Credentials, OpenAiConfig};

const EXPONENTIAL_BACKOFF_BASE: u64 = 2;
const STREAM_DONE: &str = "[DONE]";

/// Blocking client for an OpenAI-compatible embeddings and chat completions API
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    base_url: Url,
    chat_model: String,
    embedding_model: String,
    batch_size: u32,
    agent: ureq::Agent,
    retry_attempts: u32,
    credentials: Credentials,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub owned_by: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

impl OpenAiClient {
    #[inline]
    pub fn new(config: &OpenAiConfig, credentials: Credentials) -> Result<Self> {
        let mut base_url = config
            .api_base_url()
            .context("Failed to parse API base URL from config")?;

        // Relative joins only append to a path that ends with a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout()))
            .build()
            .into();

        Ok(Self {
            base_url,
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            batch_size: config.batch_size,
            agent,
            retry_attempts: config.retry_attempts.max(1),
            credentials,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    #[inline]
    pub fn chat_model(&self) -> &str {
        &self.chat_model
    }

    #[inline]
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Check that the service answers and report whether the configured models are listed
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check against {}", self.base_url);

        let models = self.list_models().context("Failed to list models")?;

        for model in [&self.chat_model, &self.embedding_model] {
            if !models.iter().any(|m| &m.id == model) {
                warn!("Model {} is not listed by {}", model, self.base_url);
            }
        }

        info!(
            "Health check passed for {} ({} models available)",
            self.base_url,
            models.len()
        );
        Ok(())
    }

    /// List all available models
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.endpoint("models")?;

        debug!("Fetching available models from {}", url);

        let response_text = self
            .send_with_retry(|| {
                self.authorized(self.agent.get(url.as_str()))
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to fetch models")?;

        let models_response: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        debug!("Found {} models", models_response.data.len());
        Ok(models_response.data)
    }

    /// Embed a search query
    #[inline]
    pub fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[text.to_string()])?;
        embeddings
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding response was empty"))
    }

    /// Embed documents in batches of the configured size, preserving input order
    #[inline]
    pub fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size as usize) {
            let batch = self
                .embed_batch(chunk)
                .with_context(|| format!("Failed to process batch of {} texts", chunk.len()))?;
            results.extend(batch);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // Newlines degrade embedding quality for the ada family of models
        let inputs: Vec<String> = texts.iter().map(|t| t.replace('\n', " ")).collect();

        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: &inputs,
        };

        let url = self.endpoint("embeddings")?;
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let response_text = self
            .send_with_retry(|| {
                self.authorized(self.agent.post(url.as_str()))
                    .header("Content-Type", "application/json")
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to generate embeddings")?;

        let response: EmbeddingResponse =
            serde_json::from_str(&response_text).context("Failed to parse embedding response")?;

        ordered_embeddings(response.data, texts.len())
    }

    /// Run a chat completion and return the whole message
    #[inline]
    pub fn chat_completion(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages,
            temperature,
            stream: false,
        };

        let url = self.endpoint("chat/completions")?;
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize chat request")?;

        let response_text = self
            .send_with_retry(|| {
                self.authorized(self.agent.post(url.as_str()))
                    .header("Content-Type", "application/json")
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to run chat completion")?;

        let response: ChatResponse =
            serde_json::from_str(&response_text).context("Failed to parse chat response")?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("Chat response contained no message"))
    }

    /// Run a streaming chat completion, calling `on_token` for every content delta
    ///
    /// Returns the concatenated message once the stream ends.
    #[inline]
    pub fn chat_completion_stream<F>(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        mut on_token: F,
    ) -> Result<String>
    where
        F: FnMut(&str),
    {
        let request = ChatRequest {
            model: &self.chat_model,
            messages,
            temperature,
            stream: true,
        };

        let url = self.endpoint("chat/completions")?;
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize chat request")?;

        let mut response = self
            .send_with_retry(|| {
                self.authorized(self.agent.post(url.as_str()))
                    .header("Content-Type", "application/json")
                    .header("Accept", "text/event-stream")
                    .send(&request_json)
            })
            .context("Failed to start streaming chat completion")?;

        let reader = BufReader::new(response.body_mut().as_reader());
        let mut message = String::new();

        for line in reader.lines() {
            let line = line.context("Failed to read completion stream")?;
            let Some(data) = sse_data(&line) else {
                continue;
            };

            if data == STREAM_DONE {
                break;
            }

            if let Ok(api_error) = serde_json::from_str::<ErrorResponse>(data) {
                return Err(anyhow::anyhow!(
                    "Completion stream failed: {}",
                    api_error.error.message
                ));
            }

            let chunk: ChatChunk =
                serde_json::from_str(data).context("Failed to parse completion stream chunk")?;

            for content in chunk.choices.into_iter().filter_map(|c| c.delta.content) {
                if !content.is_empty() {
                    on_token(&content);
                    message.push_str(&content);
                }
            }
        }

        debug!("Streamed completion of {} characters", message.len());
        Ok(message)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Failed to build {} URL", path))
    }

    fn authorized<B>(&self, request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        let request = request.header(
            "Authorization",
            format!("Bearer {}", self.credentials.api_key),
        );

        match &self.credentials.organization {
            Some(organization) => request.header("OpenAI-Organization", organization),
            None => request,
        }
    }

    fn send_with_retry<T, F>(&self, mut request_fn: F) -> Result<T>
    where
        F: FnMut() -> Result<T, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response);
                }
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 || *status == 429 {
                                warn!(
                                    "Retryable status {}, attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else if *status == 401 {
                                warn!("Request rejected as unauthorized");
                                return Err(anyhow::anyhow!(
                                    "Client error: HTTP 401 (check OPENAI_API_KEY)"
                                ));
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(anyhow::anyhow!("Client error: HTTP {}", status));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            false
                        }
                    };

                    if !should_retry {
                        return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                    }

                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        let delay = Duration::from_millis(delay_ms);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

/// Restore input order, requiring exactly one embedding per input index
fn ordered_embeddings(mut data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(anyhow::anyhow!(
            "Mismatch between request and response counts: {} vs {}",
            expected,
            data.len()
        ));
    }

    data.sort_by_key(|d| d.index);
    if let Some((position, bad)) = data.iter().enumerate().find(|(i, d)| d.index != *i) {
        return Err(anyhow::anyhow!(
            "Embedding response has index {} where {} was expected",
            bad.index,
            position
        ));
    }

    Ok(data.into_iter().map(|d| d.embedding).collect())
}

/// Payload of a server-sent event `data:` line, or `None` for any other line
#[inline]
pub fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}
