// Chat sessions: one upload, its vector store and the chain answering over it

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::chain::RetrievalQaChain;
use crate::citations::{SourceElement, annotate_answer, reconcile_sources};
use crate::config::Config;
use crate::database::{VectorStore, lancedb::records_from_embeddings};
use crate::ingest::{DocumentChunk, UploadedFile, create_docs};
use crate::openai::OpenAiClient;
use crate::{QaError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    #[inline]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Everything shown for one answered message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatResponse {
    /// Answer with the citation notice appended
    pub content: String,
    pub answer: String,
    /// Citation string as returned by the model
    pub sources: String,
    pub found_sources: Vec<String>,
    pub elements: Vec<SourceElement>,
}

/// One uploaded document and the chain that answers questions about it
#[derive(Debug)]
pub struct ChatSession {
    id: SessionId,
    file_name: String,
    chain: RetrievalQaChain,
    chunks: Vec<DocumentChunk>,
}

impl ChatSession {
    /// Ingest and index an upload
    ///
    /// Loading, splitting and embedding run on a blocking worker; the vector
    /// store is built once the embeddings are back.
    #[inline]
    pub async fn start(file: UploadedFile, config: &Config, client: OpenAiClient) -> Result<Self> {
        let file_name = file.name.clone();
        let chunking = config.chunking.clone();
        let worker_client = client.clone();

        info!("Processing upload {}", file_name);

        let (chunks, embeddings) = tokio::task::spawn_blocking(move || -> Result<_> {
            let chunks = create_docs(&file, &chunking)?;
            let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
            let embeddings = worker_client
                .embed_documents(&texts)
                .map_err(|e| QaError::Embedding(format!("{:#}", e)))?;
            Ok((chunks, embeddings))
        })
        .await
        .map_err(|e| QaError::Session(format!("Ingestion worker failed: {}", e)))??;

        let records = records_from_embeddings(chunks.clone(), embeddings);
        let store = VectorStore::from_records(&records).await?;
        let chain = RetrievalQaChain::new(client, store, config);

        let session = Self {
            id: SessionId::new(),
            file_name,
            chain,
            chunks,
        };

        info!(
            "Session {} ready: {} chunks from {}",
            session.id,
            session.chunks.len(),
            session.file_name
        );
        Ok(session)
    }

    #[inline]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[inline]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    #[inline]
    pub fn chunks(&self) -> &[DocumentChunk] {
        &self.chunks
    }

    #[inline]
    pub fn chain(&self) -> &RetrievalQaChain {
        &self.chain
    }

    /// Answer one message and reconcile its citations against this upload
    #[inline]
    pub async fn ask<F>(&self, question: &str, on_token: F) -> Result<ChatResponse>
    where
        F: FnMut(&str) + Send,
    {
        let question = question.trim();
        if question.is_empty() {
            return Err(QaError::Session("Question is empty".to_string()));
        }

        debug!("Session {} asked: {}", self.id, question);

        let output = self.chain.call(question, on_token).await?;
        let reconciled = reconcile_sources(&output.sources, &self.chunks);
        let content = annotate_answer(&output.answer, &output.sources, &reconciled);

        Ok(ChatResponse {
            content,
            answer: output.answer,
            sources: output.sources,
            found_sources: reconciled.found_sources,
            elements: reconciled.elements,
        })
    }
}

/// Active sessions keyed by id
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<ChatSession>>>,
}

impl SessionStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub async fn insert(&self, session: ChatSession) -> SessionId {
        let id = session.id();
        self.sessions.write().await.insert(id, Arc::new(session));
        id
    }

    #[inline]
    pub async fn get(&self, id: SessionId) -> Option<Arc<ChatSession>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Remove a session; its vector store is deleted once the last handle drops
    #[inline]
    pub async fn remove(&self, id: SessionId) -> Option<Arc<ChatSession>> {
        self.sessions.write().await.remove(&id)
    }

    #[inline]
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    #[inline]
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
