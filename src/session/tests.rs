use std::fmt::Write as _;

use serde_json::{Value, json};
use wiremock::{
    Mock, MockServer, Request, Respond, ResponseTemplate,
    matchers::{body_string_contains, method, path},
};

use super::*;
use crate::config::{Credentials, OpenAiConfig};
use crate::embeddings::chunking::ChunkingConfig;

const DOCUMENT: &str = "Rust is a systems language with ownership.\n\n\
    Python is a scripting language with a GIL.\n\n\
    Go uses goroutines for concurrency.";

/// Embeds text as keyword counts so similarity is predictable
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
                json!({"object": "embedding", "index": index, "embedding": embedding})
            })
            .collect();

        ResponseTemplate::new(200).set_body_json(json!({"object": "list", "data": data}))
    }
}

fn sse_body(tokens: &[&str]) -> String {
    let mut body = String::from(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n",
    );
    for token in tokens {
        let chunk = json!({"choices": [{"index": 0, "delta": {"content": token}}]});
        write!(body, "data: {}\n\n", chunk).expect("writing to a string cannot fail");
    }
    body.push_str("data: [DONE]\n\n");
    body
}

async fn mock_service(server: &MockServer, tokens: &[&str]) {
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(KeywordEmbeddings)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("Source: source_0"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body(tokens), "text/event-stream"),
        )
        .mount(server)
        .await;
}

fn test_config(server: &MockServer) -> Config {
    Config {
        openai: OpenAiConfig {
            api_base: format!("{}/v1", server.uri()),
            retry_attempts: 1,
            ..OpenAiConfig::default()
        },
        chunking: ChunkingConfig {
            chunk_size: 50,
            chunk_overlap: 0,
        },
        ..Config::default()
    }
}

fn test_client(config: &Config) -> OpenAiClient {
    let credentials = Credentials {
        api_key: "sk-test".to_string(),
        organization: None,
    };
    OpenAiClient::new(&config.openai, credentials).expect("client should build")
}

async fn start_session(server: &MockServer) -> ChatSession {
    let config = test_config(server);
    let file = UploadedFile::new("langs.txt", "text/plain", DOCUMENT.as_bytes().to_vec());
    ChatSession::start(file, &config, test_client(&config))
        .await
        .expect("session should start")
}

#[test]
fn session_ids_are_unique() {
    let a = SessionId::new();
    let b = SessionId::new();
    assert_ne!(a, b);
    assert_eq!(a.to_string().len(), 36);
}

#[tokio::test]
async fn start_indexes_every_chunk() {
    let server = MockServer::start().await;
    mock_service(&server, &[]).await;

    let session = start_session(&server).await;

    assert_eq!(session.file_name(), "langs.txt");
    assert_eq!(session.chunks().len(), 3);
    assert_eq!(session.chunks()[2].metadata.source, "source_2");
    assert_eq!(
        session
            .chain()
            .store()
            .count()
            .await
            .expect("store should count"),
        3
    );
}

#[tokio::test]
async fn ask_streams_answer_and_reconciles_sources() {
    let server = MockServer::start().await;
    mock_service(&server, &["Rust uses", " ownership.\nSOURCES: source_0"]).await;
    let session = start_session(&server).await;

    let mut streamed = String::new();
    let response = session
        .ask("What does Rust use?", |token| streamed.push_str(token))
        .await
        .expect("question should be answered");

    assert_eq!(streamed, "Rust uses ownership.\n");
    assert_eq!(response.answer, "Rust uses ownership.");
    assert_eq!(response.sources, "source_0");
    assert_eq!(response.found_sources, vec!["source_0"]);
    assert_eq!(response.content, "Rust uses ownership.\nSources: source_0");
    assert_eq!(response.elements.len(), 1);
    assert_eq!(
        response.elements[0].content,
        "Rust is a systems language with ownership."
    );
}

#[tokio::test]
async fn ask_reports_unknown_sources() {
    let server = MockServer::start().await;
    mock_service(&server, &["Nobody knows.\nSOURCES: source_42"]).await;
    let session = start_session(&server).await;

    let response = session
        .ask("What does Rust use?", |_| {})
        .await
        .expect("question should be answered");

    assert_eq!(response.content, "Nobody knows.\nNo sources found");
    assert!(response.elements.is_empty());
}

#[tokio::test]
async fn ask_rejects_blank_question() {
    let server = MockServer::start().await;
    mock_service(&server, &[]).await;
    let session = start_session(&server).await;

    let error = session
        .ask("   ", |_| {})
        .await
        .expect_err("blank question should fail");
    assert!(matches!(error, QaError::Session(_)));
}

#[tokio::test]
async fn start_fails_for_empty_upload() {
    let server = MockServer::start().await;
    mock_service(&server, &[]).await;
    let config = test_config(&server);
    let file = UploadedFile::new("empty.txt", "text/plain", Vec::new());

    let error = ChatSession::start(file, &config, test_client(&config))
        .await
        .expect_err("empty upload should fail");
    assert!(matches!(error, QaError::Ingest(_)));
}

#[tokio::test]
async fn session_store_lifecycle() {
    let server = MockServer::start().await;
    mock_service(&server, &[]).await;
    let store = SessionStore::new();
    assert!(store.is_empty().await);

    let id = store.insert(start_session(&server).await).await;
    assert_eq!(store.len().await, 1);

    let session = store.get(id).await.expect("session should be stored");
    assert_eq!(session.id(), id);
    assert!(store.get(SessionId::new()).await.is_none());

    assert!(store.remove(id).await.is_some());
    assert!(store.is_empty().await);
    assert!(store.remove(id).await.is_none());
}
