use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use memory_engine::config::MemoryConfig;
use memory_engine::database::InMemoryVectorDatabase;
use memory_engine::kv::InMemoryKvStore;
use memory_engine::models::ChatMessage;
use memory_engine::services::memory::{EmbeddingProvider, Outcome, TextGenerator};
use memory_engine::utils::error::MemoryError;
use memory_engine::{build_router, AppState, Backends};

const API_KEY: &str = "test-secret";

/// Deterministic bag-of-letters embedding: similar words, similar vectors.
struct LetterEmbeddings;

fn letters(text: &str) -> Vec<f32> {
    let mut v = vec![0.0; 26];
    for c in text.to_ascii_lowercase().bytes().filter(u8::is_ascii_lowercase) {
        v[(c - b'a') as usize] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for LetterEmbeddings {
    async fn embed(&self, text: &str) -> Outcome<Vec<f32>> {
        Outcome::Fresh(letters(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Outcome<Vec<Vec<f32>>> {
        Outcome::Fresh(texts.iter().map(|t| letters(t)).collect())
    }

    fn dimension(&self) -> usize {
        26
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

struct CannedSummary;

#[async_trait]
impl TextGenerator for CannedSummary {
    async fn generate_with(
        &self,
        _messages: &[ChatMessage],
        _max_tokens: usize,
        _temperature: f32,
    ) -> Result<String, MemoryError> {
        Ok(r#"{"issues":"login","details":"","solutions":"reset","unresolved":""}"#.to_string())
    }
}

fn state(api_key: Option<&str>) -> AppState {
    let backends = Backends {
        kv: Arc::new(InMemoryKvStore::new()),
        conversations: Arc::new(InMemoryVectorDatabase::new()),
        items: Arc::new(InMemoryVectorDatabase::new()),
        knowledge: Arc::new(InMemoryVectorDatabase::new()),
        embeddings: Arc::new(LetterEmbeddings),
        generator: Arc::new(CannedSummary),
    };
    AppState::new(backends, &MemoryConfig::default(), api_key.map(str::to_string))
}

fn app() -> (Router, AppState) {
    let state = state(Some(API_KEY));
    (build_router(state.clone()), state)
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("X-API-Key", API_KEY)
        .header("content-type", "application/json");
    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn health_is_public() {
    let (app, _) = app();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-process-time"));

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["dependencies"]["embeddings"], "healthy");
}

#[tokio::test]
async fn protected_routes_require_api_key() {
    let (app, _) = app();

    let missing = Request::builder()
        .uri("/memories/u1")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, missing).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    let wrong = Request::builder()
        .uri("/memories/u1")
        .header("X-API-Key", "nope")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn auth_disabled_without_configured_key() {
    let app = build_router(state(None));
    let request = Request::builder()
        .uri("/memories/u1")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_memory_type_is_rejected_without_write() {
    let (app, _) = app();
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/memories",
            Some(json!({"userId": "u1", "type": "medium_term", "key": "k", "value": {"a": 1}})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadRequest");

    let (_, body) = send(&app, request("GET", "/memories/u1", None)).await;
    assert_eq!(body["memories"], json!([]));
}

#[tokio::test]
async fn short_term_memory_round_trip() {
    let (app, _) = app();
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/memories",
            Some(json!({
                "userId": "u1",
                "type": "short_term",
                "key": "cart",
                "value": {"items": ["sku-9"]},
                "metadata": {"channel": "web"},
                "ttl": 300
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "memory:u1:short_term:cart");
    assert_eq!(body["status"], "stored");

    let (status, body) = send(&app, request("GET", "/memories/u1?type=short_term&key=cart", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["memories"][0]["value"], json!({"items": ["sku-9"]}));
    assert_eq!(body["memories"][0]["metadata"], json!({"channel": "web"}));
}

#[tokio::test]
async fn long_term_memory_found_after_queue_drains() {
    let (app, state) = app();
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/memories",
            Some(json!({"userId": "u1", "type": "long_term", "key": "address", "value": {"city": "Bogor"}})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "memory:u1:long_term:address");

    state.memory_manager.embedding_queue().wait_idle().await;

    let (_, body) = send(&app, request("GET", "/memories/u1?type=long_term", None)).await;
    assert_eq!(body["memories"][0]["key"], "address");
    assert_eq!(body["memories"][0]["value"], json!({"city": "Bogor"}));

    let (status, body) = send(&app, request("DELETE", "/memories/u1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 1);
}

#[tokio::test]
async fn conversation_store_get_and_search() {
    let (app, _) = app();
    let turns = [
        ("2024-05-01T10:02:00Z", "my password reset link expired"),
        ("2024-05-01T10:00:00Z", "hello there"),
    ];
    for (i, (timestamp, message)) in turns.iter().enumerate() {
        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/memory",
                Some(json!({
                    "userId": "u1",
                    "sessionId": "s1",
                    "conversationTurn": {
                        "messageId": format!("m{}", i),
                        "message": message,
                        "response": "ok",
                        "timestamp": timestamp,
                        "channel": "chat"
                    }
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["memoryId"].is_string());
    }

    let (status, body) = send(&app, request("GET", "/api/memory?userId=u1&sessionId=s1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["history"][0]["message"], "hello there");
    assert_eq!(body["history"][1]["message"], "my password reset link expired");
    assert_eq!(body["firstInteraction"], "2024-05-01T10:00:00Z");

    let (status, body) = send(
        &app,
        request("GET", "/api/memory/search?userId=u1&query=password%20reset&limit=1", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["results"][0]["message"], "my password reset link expired");
}

#[tokio::test]
async fn long_aggregate_is_summarized_on_store() {
    let (app, _) = app();
    let history: Vec<Value> = (0..20)
        .map(|i| json!({"messageId": format!("h{}", i), "message": "q", "response": "a", "timestamp": "2024-05-01T09:00:00Z"}))
        .collect();

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/memory",
            Some(json!({
                "userId": "u1",
                "sessionId": "s1",
                "conversationTurn": {"message": "still locked out", "response": "escalating"},
                "memory": {"userId": "u1", "sessionId": "s1", "history": history, "context": {}}
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["memory"]["history"].as_array().unwrap().len(), 10);
    assert_eq!(body["memory"]["context"]["conversation_summary"]["issues"], "login");
}

#[tokio::test]
async fn session_context_update_and_get() {
    let (app, _) = app();
    let (status, body) = send(
        &app,
        request("POST", "/context/s1", Some(json!({"orderId": "ORD-1", "step": 2}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "updated");

    let (_, body) = send(&app, request("GET", "/context/s1", None)).await;
    assert_eq!(body["sessionId"], "s1");
    assert_eq!(body["context"], json!({"orderId": "ORD-1", "step": 2}));

    let (_, body) = send(&app, request("GET", "/context/unknown", None)).await;
    assert_eq!(body["context"], json!({}));
}

#[tokio::test]
async fn optimize_context_shape() {
    let (app, state) = app();
    send(
        &app,
        request(
            "POST",
            "/memories",
            Some(json!({"userId": "u1", "type": "long_term", "key": "note", "value": "refund requested"})),
        ),
    )
    .await;
    state.memory_manager.embedding_queue().wait_idle().await;
    send(&app, request("POST", "/context/s1", Some(json!({"tier": "gold"})))).await;

    let history: Vec<Value> = (0..12).map(|i| json!(format!("T{}", i))).collect();
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/optimize-context",
            Some(json!({
                "conversation_history": history,
                "user_query": "refund requested",
                "userId": "u1",
                "sessionId": "s1"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let context = &body["optimized_context"];
    assert_eq!(
        context["conversation_history"],
        json!(["T0", "T1", "T4", "T5", "T6", "T7", "T8", "T9", "T10", "T11"])
    );
    assert_eq!(context["relevant_memories"][0]["content"], "refund requested");
    assert_eq!(context["relevant_memories"][0]["relevance"], 1.0);
    assert_eq!(context["session_context"], json!({"tier": "gold"}));
    assert!(context.get("degraded").is_none());
}

#[tokio::test]
async fn optimize_without_user_or_session() {
    let (app, _) = app();
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/optimize-context",
            Some(json!({"conversation_history": ["a", "b"], "user_query": "hi"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["optimized_context"],
        json!({"conversation_history": ["a", "b"], "relevant_memories": [], "session_context": {}})
    );
}

#[tokio::test]
async fn knowledge_base_add_and_search() {
    let (app, _) = app();
    let entries = [
        ("return policy", "org1", Some("Returns")),
        ("zzz", "org1", None),
        ("return policy", "org2", None),
    ];
    for (text, organization, title) in entries {
        let mut metadata = json!({"organizationId": organization});
        if let Some(title) = title {
            metadata["title"] = json!(title);
        }
        let (status, body) = send(
            &app,
            request("POST", "/vectors", Some(json!({"text": text, "metadata": metadata}))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "stored");
        assert_eq!(body["dimensions"], 26);
        assert!(body["id"].as_str().unwrap().starts_with("vec-"));
    }

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/knowledge/search",
            Some(json!({"query": "return policy", "organizationId": "org1"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["content"], "return policy");
    assert_eq!(results[0]["title"], "Returns");
    assert_eq!(results[0]["source"], "knowledge_base");
    assert_eq!(results[0]["relevance"], 1.0);
    assert!(results[0].get("url").is_none());
}

#[tokio::test]
async fn short_term_zero_ttl_is_kept() {
    let (app, _) = app();
    let (status, _) = send(
        &app,
        request(
            "POST",
            "/memories",
            Some(json!({"userId": "u1", "type": "short_term", "key": "lang", "value": "id", "ttl": 0})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, request("GET", "/memories/u1?type=short_term", None)).await;
    assert_eq!(body["memories"][0]["key"], "lang");
    assert!(body["memories"][0].get("ttl").is_none());
}
