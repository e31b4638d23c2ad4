#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end chat sessions: a file on disk is uploaded, indexed into a
// session-scoped LanceDB table and questioned against a mock completion service

use std::fs;

use doc_qa::config::{Config, Credentials, OpenAiConfig};
use doc_qa::embeddings::chunking::ChunkingConfig;
use doc_qa::ingest::UploadedFile;
use doc_qa::openai::OpenAiClient;
use doc_qa::session::{ChatSession, SessionStore};
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const DOCUMENT: &str = "Rust is a systems language with ownership.\n\n\
    Python is a scripting language with a GIL.\n\n\
    Go uses goroutines for concurrency.";

/// Embeds text as keyword counts so the nearest chunk is predictable
struct KeywordEmbeddings;

impl Respond for KeywordEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).expect("request should be json");
        let inputs = body["input"].as_array().expect("input should be an array");

        let data: Vec<Value> = inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                let text = input.as_str().unwrap_or_default().to_lowercase();
                let embedding: Vec<f32> = ["rust", "python", "goroutine"]
                    .iter()
                    .map(|word| text.matches(word).count() as f32 + 0.01)
                    .collect();
                json!({"index": index, "embedding": embedding})
            })
            .collect();

        ResponseTemplate::new(200).set_body_json(json!({"object": "list", "data": data}))
    }
}

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-test",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    }))
}

fn config_for(server: &MockServer, dir: &TempDir) -> Config {
    Config {
        openai: OpenAiConfig {
            api_base: format!("{}/v1", server.uri()),
            streaming: false,
            retry_attempts: 1,
            ..OpenAiConfig::default()
        },
        chunking: ChunkingConfig {
            chunk_size: 50,
            chunk_overlap: 0,
        },
        base_dir: dir.path().to_path_buf(),
        ..Config::default()
    }
}

async fn session_from_disk(server: &MockServer, dir: &TempDir) -> ChatSession {
    let config = config_for(server, dir);
    let file_path = dir.path().join("languages.txt");
    fs::write(&file_path, DOCUMENT).expect("can write document");

    let file = UploadedFile::from_path(&file_path, &config.upload)
        .await
        .expect("can read upload");
    assert_eq!(file.mime, "text/plain");

    let credentials = Credentials {
        api_key: "sk-test".to_string(),
        organization: None,
    };
    let client = OpenAiClient::new(&config.openai, credentials).expect("can build client");

    ChatSession::start(file, &config, client)
        .await
        .expect("can start session")
}

#[tokio::test]
async fn answers_from_uploaded_file_with_citations() {
    let server = MockServer::start().await;
    let dir = TempDir::new().expect("can create temp dir");

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(KeywordEmbeddings)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("QUESTION: What does Python have?"))
        .and(body_string_contains("Source: source_1"))
        .respond_with(completion("Python has a GIL.\nSOURCES: source_1, source_9"))
        .expect(1)
        .mount(&server)
        .await;

    let session = session_from_disk(&server, &dir).await;
    assert_eq!(session.file_name(), "languages.txt");
    assert_eq!(session.chunks().len(), 3);

    let mut streamed = Vec::new();
    let response = session
        .ask("What does Python have?", |token| streamed.push(token.to_string()))
        .await
        .expect("can answer question");

    // Non-streaming sessions never emit tokens
    assert!(streamed.is_empty());
    assert_eq!(response.answer, "Python has a GIL.");
    assert_eq!(response.sources, "source_1, source_9");
    assert_eq!(response.found_sources, vec!["source_1"]);
    assert_eq!(response.content, "Python has a GIL.\nSources: source_1");
    assert_eq!(response.elements.len(), 1);
    assert_eq!(response.elements[0].name, "source_1");
    assert_eq!(
        response.elements[0].content,
        "Python is a scripting language with a GIL."
    );
}

#[tokio::test]
async fn answer_without_citations_is_left_as_is() {
    let server = MockServer::start().await;
    let dir = TempDir::new().expect("can create temp dir");

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(KeywordEmbeddings)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion("I don't know."))
        .mount(&server)
        .await;

    let session = session_from_disk(&server, &dir).await;
    let response = session
        .ask("Who wrote the document?", |_| {})
        .await
        .expect("can answer question");

    assert_eq!(response.answer, "I don't know.");
    assert!(response.sources.is_empty());
    assert_eq!(response.content, "I don't know.");
    assert!(response.elements.is_empty());
}

#[tokio::test]
async fn sessions_are_independent() {
    let server = MockServer::start().await;
    let dir = TempDir::new().expect("can create temp dir");

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(KeywordEmbeddings)
        .mount(&server)
        .await;

    let store = SessionStore::new();
    let first = store.insert(session_from_disk(&server, &dir).await).await;
    let second = store.insert(session_from_disk(&server, &dir).await).await;
    assert_ne!(first, second);
    assert_eq!(store.len().await, 2);

    let removed = store.remove(first).await.expect("first session is stored");
    assert_eq!(removed.chunks().len(), 3);

    let remaining = store.get(second).await.expect("second session is stored");
    assert_eq!(
        remaining
            .chain()
            .store()
            .count()
            .await
            .expect("can count rows"),
        3
    );
}
