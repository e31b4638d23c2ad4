// Retrieval-augmented question answering with cited sources

pub mod prompts;
pub mod stream;


use std::sync::LazyLock;

use fancy_regex::Regex;
use tracing::{debug, info};

use crate::config::Config;
use crate::database::VectorStore;
use crate::embeddings::chunking::estimate_token_count;
use crate::ingest::DocumentChunk;
use crate::openai::{ChatMessage, OpenAiClient};
use crate::{QaError, Result};

pub use prompts::{format_document, stuff_prompt};
pub use stream::AnswerStream;

static SOURCES_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)SOURCES?:").expect("valid regex"));

static ANSWER_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)SOURCES?:|QUESTION:\s").expect("valid regex"));

/// Result of one pass through the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainOutput {
    /// Answer text with the citation line removed
    pub answer: String,
    /// Raw comma-separated citation string, possibly empty
    pub sources: String,
    /// Chunks that were placed in the prompt
    pub context: Vec<DocumentChunk>,
}

/// Question answering over one session's vector store
#[derive(Debug)]
pub struct RetrievalQaChain {
    client: OpenAiClient,
    store: VectorStore,
    top_k: usize,
    max_tokens_limit: usize,
    temperature: f32,
    streaming: bool,
}

impl RetrievalQaChain {
    #[inline]
    pub fn new(client: OpenAiClient, store: VectorStore, config: &Config) -> Self {
        Self {
            client,
            store,
            top_k: config.retrieval.top_k,
            max_tokens_limit: config.retrieval.max_tokens_limit,
            temperature: config.openai.temperature,
            streaming: config.openai.streaming,
        }
    }

    #[inline]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    #[inline]
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Fetch the chunks nearest to the question, trimmed to the token limit
    #[inline]
    pub async fn retrieve(&self, question: &str) -> Result<Vec<DocumentChunk>> {
        let client = self.client.clone();
        let query = question.to_string();
        let query_vector = tokio::task::spawn_blocking(move || client.embed_query(&query))
            .await
            .map_err(|e| QaError::Embedding(format!("Embedding worker failed: {}", e)))?
            .map_err(|e| QaError::Embedding(format!("{:#}", e)))?;

        let results = self.store.search_similar(&query_vector, self.top_k).await?;
        let chunks: Vec<DocumentChunk> = results.into_iter().map(|r| r.chunk).collect();
        let retrieved = chunks.len();
        let chunks = reduce_tokens_below_limit(chunks, self.max_tokens_limit);

        debug!(
            "Retrieved {} chunks, kept {} within {} tokens",
            retrieved,
            chunks.len(),
            self.max_tokens_limit
        );
        Ok(chunks)
    }

    /// Answer a question, passing displayable answer text to `on_token` as it streams
    ///
    /// `on_token` is only called when streaming is enabled; the citation line
    /// is never passed to it.
    #[inline]
    pub async fn call<F>(&self, question: &str, mut on_token: F) -> Result<ChainOutput>
    where
        F: FnMut(&str) + Send,
    {
        let context = self.retrieve(question).await?;
        let messages = vec![ChatMessage::user(stuff_prompt(question, &context))];

        let completion = if self.streaming {
            self.complete_streaming(messages, &mut on_token).await?
        } else {
            self.complete(messages).await?
        };

        let (answer, sources) = split_sources(&completion);
        info!(
            "Answered with {} characters citing {:?}",
            answer.len(),
            sources
        );

        Ok(ChainOutput {
            answer,
            sources,
            context,
        })
    }

    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let client = self.client.clone();
        let temperature = self.temperature;

        tokio::task::spawn_blocking(move || client.chat_completion(&messages, temperature))
            .await
            .map_err(|e| QaError::Completion(format!("Completion worker failed: {}", e)))?
            .map_err(|e| QaError::Completion(format!("{:#}", e)))
    }

    async fn complete_streaming<F>(
        &self,
        messages: Vec<ChatMessage>,
        on_token: &mut F,
    ) -> Result<String>
    where
        F: FnMut(&str) + Send,
    {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
        let client = self.client.clone();
        let temperature = self.temperature;

        let worker = tokio::task::spawn_blocking(move || {
            client.chat_completion_stream(&messages, temperature, |token| {
                // The receiver only goes away when the caller stopped listening
                tx.send(token.to_string()).ok();
            })
        });

        let mut filter = AnswerStream::new();
        while let Some(token) = rx.recv().await {
            if let Some(text) = filter.push(&token) {
                on_token(&text);
            }
        }
        if let Some(text) = filter.finish() {
            on_token(&text);
        }

        worker
            .await
            .map_err(|e| QaError::Completion(format!("Completion worker failed: {}", e)))?
            .map_err(|e| QaError::Completion(format!("{:#}", e)))
    }
}

/// Drop trailing chunks until the estimated token total fits the limit
#[inline]
pub fn reduce_tokens_below_limit(
    mut chunks: Vec<DocumentChunk>,
    max_tokens_limit: usize,
) -> Vec<DocumentChunk> {
    let tokens: Vec<usize> = chunks
        .iter()
        .map(|c| estimate_token_count(&c.content))
        .collect();
    let mut total: usize = tokens.iter().sum();
    let mut keep = chunks.len();

    while total > max_tokens_limit && keep > 0 {
        keep -= 1;
        total -= tokens.get(keep).copied().unwrap_or_default();
    }

    chunks.truncate(keep);
    chunks
}

/// Separate the answer from its `SOURCES:` line
///
/// Without a marker the whole text is the answer and the citation string is
/// empty. A `QUESTION:` marker also ends the answer, since models sometimes
/// continue the worked example.
#[inline]
pub fn split_sources(text: &str) -> (String, String) {
    if !matches!(SOURCES_MARKER.is_match(text), Ok(true)) {
        return (text.trim().to_string(), String::new());
    }

    let boundaries: Vec<(usize, usize)> = ANSWER_BOUNDARY
        .find_iter(text)
        .filter_map(std::result::Result::ok)
        .take(2)
        .map(|m| (m.start(), m.end()))
        .collect();

    let Some(&(first_start, first_end)) = boundaries.first() else {
        return (text.trim().to_string(), String::new());
    };

    let answer = text.get(..first_start).unwrap_or_default().trim().to_string();
    let tail_end = boundaries.get(1).map_or(text.len(), |&(start, _)| start);
    let sources = text
        .get(first_end..tail_end)
        .unwrap_or_default()
        .split('\n')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();

    (answer, sources)
}
