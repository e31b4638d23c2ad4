// Upload handling: MIME dispatch, loaders and source tagging

pub mod loaders;


use std::path::Path;

use tracing::{debug, info};

use crate::config::{ACCEPTED_MIME_TYPES, UploadConfig};
use crate::embeddings::chunking::{ChunkingConfig, TextSplitter};
use crate::{QaError, Result};

pub use loaders::{LoadedDocument, load_pdf, load_text};

/// A file handed to the session by the upload prompt
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub mime: String,
    pub content: Vec<u8>,
}

/// Loader selected from the declared MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Text,
    Pdf,
}

impl FileKind {
    #[inline]
    pub fn from_mime(mime: &str) -> Result<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "text/plain" => Ok(Self::Text),
            "application/pdf" => Ok(Self::Pdf),
            other => Err(QaError::UnsupportedFileType(format!(
                "{} (accepted: {})",
                other,
                ACCEPTED_MIME_TYPES.join(", ")
            ))),
        }
    }
}

/// A span of uploaded text plus the identifier the model cites it by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// `source_<index>`, unique within one upload
    pub source: String,
    pub file_name: String,
    /// 1-based PDF page, `None` for plain text
    pub page: Option<u32>,
}

impl UploadedFile {
    #[inline]
    pub fn new(name: impl Into<String>, mime: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            content,
        }
    }

    /// Read a file from disk the way the upload prompt accepts it
    ///
    /// The MIME type is guessed from the extension and must be one of the
    /// accepted types. The size limit is checked before reading, and the
    /// read itself is bounded by the upload timeout.
    #[inline]
    pub async fn from_path(path: &Path, limits: &UploadConfig) -> Result<Self> {
        let mime = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        FileKind::from_mime(&mime)?;

        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(QaError::Ingest(format!("{} is not a file", path.display())));
        }

        if metadata.len() > limits.max_size_bytes() {
            return Err(QaError::Ingest(format!(
                "{} is {} bytes, larger than the {} MB limit",
                path.display(),
                metadata.len(),
                limits.max_size_mb
            )));
        }

        let content = tokio::time::timeout(limits.timeout(), tokio::fs::read(path))
            .await
            .map_err(|_| {
                QaError::Ingest(format!(
                    "Timed out after {}s reading {}",
                    limits.timeout_secs,
                    path.display()
                ))
            })??;

        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

        debug!("Read upload {} ({}, {} bytes)", name, mime, content.len());

        Ok(Self {
            name,
            mime,
            content,
        })
    }

    #[inline]
    pub fn kind(&self) -> Result<FileKind> {
        FileKind::from_mime(&self.mime)
    }

    /// Run the loader matching the declared MIME type
    #[inline]
    pub fn load(&self) -> Result<Vec<LoadedDocument>> {
        match self.kind()? {
            FileKind::Text => load_text(&self.content),
            FileKind::Pdf => load_pdf(&self.content),
        }
    }
}

/// Load, split and tag an upload
///
/// Every chunk gets `source_<i>` in order across the whole file, so the
/// identifiers run without gaps even when a PDF contributes several pages.
#[inline]
pub fn create_docs(file: &UploadedFile, chunking: &ChunkingConfig) -> Result<Vec<DocumentChunk>> {
    let documents = file.load()?;
    let splitter = TextSplitter::new(chunking);
    debug!(
        "Splitting {} with chunk size {} and overlap {}",
        file.name,
        splitter.chunk_size(),
        splitter.chunk_overlap()
    );

    let pieces: Vec<(String, Option<u32>)> = documents
        .iter()
        .flat_map(|doc| {
            splitter
                .split_text(&doc.text)
                .into_iter()
                .map(move |chunk| (chunk, doc.page))
        })
        .collect();

    if pieces.is_empty() {
        return Err(QaError::Ingest(format!(
            "{} contains no extractable text",
            file.name
        )));
    }

    let chunks = assign_sources(&file.name, pieces);

    info!(
        "Split {} into {} chunks from {} documents",
        file.name,
        chunks.len(),
        documents.len()
    );

    Ok(chunks)
}

/// Tag chunks with sequential `source_<i>` identifiers in input order
#[inline]
pub fn assign_sources<I>(file_name: &str, pieces: I) -> Vec<DocumentChunk>
where
    I: IntoIterator<Item = (String, Option<u32>)>,
{
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, (content, page))| DocumentChunk {
            content,
            metadata: ChunkMetadata {
                source: source_id(i),
                file_name: file_name.to_string(),
                page,
            },
        })
        .collect()
}

#[inline]
pub fn source_id(index: usize) -> String {
    format!("source_{}", index)
}
