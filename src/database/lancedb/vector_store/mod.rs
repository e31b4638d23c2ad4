
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use tempfile::TempDir;
use tracing::{debug, info};

use super::EmbeddingRecord;
use crate::ingest::{ChunkMetadata, DocumentChunk};
use crate::{QaError, Result};

const TABLE_NAME: &str = "chunks";

/// Vector store for the chunks of one upload
///
/// The database lives in a temporary directory owned by the store and is
/// removed when the store is dropped.
pub struct VectorStore {
    connection: Connection,
    table: Table,
    vector_dimension: usize,
    // Declared last so it is removed after the handles pointing into it
    dir: TempDir,
}

/// Search result from vector similarity search
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk: DocumentChunk,
    pub chunk_index: u32,
    pub similarity_score: f32,
    pub distance: f32,
}

impl std::fmt::Debug for VectorStore {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("path", &self.dir.path())
            .field("table", &TABLE_NAME)
            .field("vector_dimension", &self.vector_dimension)
            .finish_non_exhaustive()
    }
}

impl VectorStore {
    /// Build a store holding every record
    ///
    /// The vector dimension is taken from the first record and every other
    /// record must match it.
    #[inline]
    pub async fn from_records(records: &[EmbeddingRecord]) -> Result<Self> {
        let vector_dimension = records
            .first()
            .map(|r| r.vector.len())
            .ok_or_else(|| QaError::Database("No embeddings to store".to_string()))?;

        if vector_dimension == 0 {
            return Err(QaError::Database("Embeddings are empty vectors".to_string()));
        }

        if let Some(bad) = records.iter().find(|r| r.vector.len() != vector_dimension) {
            return Err(QaError::Database(format!(
                "Embedding for {} has {} dimensions, expected {}",
                bad.chunk.metadata.source,
                bad.vector.len(),
                vector_dimension
            )));
        }

        let dir = TempDir::new().map_err(|e| {
            QaError::Database(format!("Failed to create vector database directory: {}", e))
        })?;
        let connection = Self::connect(dir.path()).await?;

        let schema = create_schema(vector_dimension);
        let table = connection
            .create_empty_table(TABLE_NAME, schema)
            .execute()
            .await
            .map_err(|e| QaError::Database(format!("Failed to create table: {}", e)))?;

        let store = Self {
            connection,
            table,
            vector_dimension,
            dir,
        };
        store.insert(records).await?;

        info!(
            "Vector store ready with {} embeddings of {} dimensions",
            records.len(),
            vector_dimension
        );
        Ok(store)
    }

    async fn connect(path: &Path) -> Result<Connection> {
        let uri = format!("file://{}", path.display());
        debug!("Initializing LanceDB at path: {}", path.display());

        lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| QaError::Database(format!("Failed to connect to LanceDB: {}", e)))
    }

    async fn insert(&self, records: &[EmbeddingRecord]) -> Result<()> {
        let record_batch = self.create_record_batch(records)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        self.table
            .add(reader)
            .execute()
            .await
            .map_err(|e| QaError::Database(format!("Failed to insert embeddings: {}", e)))?;

        debug!("Stored batch of {} embeddings", records.len());
        Ok(())
    }

    /// Create a RecordBatch from embedding records
    fn create_record_batch(&self, records: &[EmbeddingRecord]) -> Result<RecordBatch> {
        let len = records.len();
        let vector_dim = self.vector_dimension;

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);
        let mut sources = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut file_names = Vec::with_capacity(len);
        let mut pages = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);

        for record in records {
            ids.push(record.id.as_str());
            flat_values.extend_from_slice(&record.vector);
            sources.push(record.chunk.metadata.source.as_str());
            contents.push(record.chunk.content.as_str());
            file_names.push(record.chunk.metadata.file_name.as_str());
            pages.push(record.chunk.metadata.page);
            chunk_indices.push(record.chunk_index);
            created_ats.push(record.created_at.as_str());
        }

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            dimension_i32(vector_dim)?,
            Arc::new(values_array),
            None,
        )
        .map_err(|e| QaError::Database(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(sources)),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(file_names)),
            Arc::new(UInt32Array::from(pages)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(create_schema(vector_dim), arrays)
            .map_err(|e| QaError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Nearest chunks to `query_vector` by cosine distance, nearest first
    #[inline]
    pub async fn search_similar(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        if query_vector.len() != self.vector_dimension {
            return Err(QaError::Database(format!(
                "Query vector has {} dimensions, expected {}",
                query_vector.len(),
                self.vector_dimension
            )));
        }

        debug!("Searching for similar vectors with limit: {}", limit);

        let results = self
            .table
            .vector_search(query_vector)
            .map_err(|e| QaError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| QaError::Database(format!("Failed to execute search: {}", e)))?;

        let mut search_results = parse_search_results_stream(results).await?;
        search_results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(search_results)
    }

    /// Get the total number of embeddings stored
    #[inline]
    pub async fn count(&self) -> Result<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| QaError::Database(format!("Failed to count rows: {}", e)))
    }

    #[inline]
    pub fn vector_dimension(&self) -> usize {
        self.vector_dimension
    }

    #[inline]
    pub async fn table_names(&self) -> Result<Vec<String>> {
        self.connection
            .table_names()
            .execute()
            .await
            .map_err(|e| QaError::Database(format!("Failed to list tables: {}", e)))
    }
}

fn dimension_i32(vector_dim: usize) -> Result<i32> {
    i32::try_from(vector_dim)
        .map_err(|_| QaError::Database(format!("Vector dimension {} is too large", vector_dim)))
}

/// Create schema with the specified vector dimension
fn create_schema(vector_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                i32::try_from(vector_dim).unwrap_or(i32::MAX),
            ),
            false,
        ),
        Field::new("source", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("file_name", DataType::Utf8, false),
        Field::new("page", DataType::UInt32, true),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

/// Parse search results from LanceDB stream into SearchResult structs
async fn parse_search_results_stream(
    mut results: lancedb::arrow::SendableRecordBatchStream,
) -> Result<Vec<SearchResult>> {
    let mut search_results = Vec::new();

    while let Some(batch) = results
        .try_next()
        .await
        .map_err(|e| QaError::Database(format!("Failed to read result stream: {}", e)))?
    {
        search_results.extend(parse_search_batch(&batch)?);
    }

    debug!("Parsed {} search results from stream", search_results.len());
    Ok(search_results)
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| QaError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| QaError::Database(format!("Invalid {} column type", name)))
}

/// Parse a single record batch from search results
fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
    let sources = column::<StringArray>(batch, "source")?;
    let contents = column::<StringArray>(batch, "content")?;
    let file_names = column::<StringArray>(batch, "file_name")?;
    let pages = column::<UInt32Array>(batch, "page")?;
    let chunk_indices = column::<UInt32Array>(batch, "chunk_index")?;

    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    let results = (0..batch.num_rows())
        .map(|row| {
            let distance =
                distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            SearchResult {
                chunk: DocumentChunk {
                    content: contents.value(row).to_string(),
                    metadata: ChunkMetadata {
                        source: sources.value(row).to_string(),
                        file_name: file_names.value(row).to_string(),
                        page: (!pages.is_null(row)).then(|| pages.value(row)),
                    },
                },
                chunk_index: chunk_indices.value(row),
                // Convert distance to similarity score (higher is better)
                similarity_score: 1.0 - distance,
                distance,
            }
        })
        .collect();

    Ok(results)
}
