use super::*;
use crate::ingest::ChunkMetadata;

fn chunk(source: &str) -> DocumentChunk {
    DocumentChunk {
        content: format!("content of {}", source),
        metadata: ChunkMetadata {
            source: source.to_string(),
            file_name: "notes.txt".to_string(),
            page: None,
        },
    }
}

#[test]
fn embedding_record_structure() {
    let record = EmbeddingRecord::new(chunk("source_0"), 0, vec![0.1, 0.2, 0.3]);

    assert_eq!(record.vector.len(), 3);
    assert_eq!(record.chunk.metadata.source, "source_0");
    assert_eq!(record.chunk_index, 0);
    assert!(Uuid::parse_str(&record.id).is_ok());
    assert!(chrono::DateTime::parse_from_rfc3339(&record.created_at).is_ok());
}

#[test]
fn records_keep_upload_order() {
    let chunks = vec![chunk("source_0"), chunk("source_1"), chunk("source_2")];
    let embeddings = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.5, 0.5]];

    let records = records_from_embeddings(chunks, embeddings);

    assert_eq!(records.len(), 3);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.chunk_index as usize, i);
        assert_eq!(record.chunk.metadata.source, format!("source_{}", i));
    }
    assert_eq!(records[1].vector, vec![1.0, 0.0]);
    assert_ne!(records[0].id, records[1].id);
}
