//! Development backend endpoint tests

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use tower::ServiceExt;
use tutor_mascot::backend::{Answerer, BackendServer, EchoAnswerer, NO_ANSWER};
use tutor_mascot::{Error, Result};

struct Fixed(&'static str);

#[async_trait]
impl Answerer for Fixed {
    async fn answer(&self, _: &str) -> Result<String> {
        Ok(self.0.to_string())
    }
}

struct Broken;

#[async_trait]
impl Answerer for Broken {
    async fn answer(&self, _: &str) -> Result<String> {
        Err(Error::Backend("pipeline not loaded".to_string()))
    }
}

fn server(answerer: Arc<dyn Answerer>) -> BackendServer {
    BackendServer::new(answerer, 0, vec!["http://localhost:3000".to_string()])
}

fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health() {
    let response = server(Arc::new(EchoAnswerer))
        .router()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "AI Tutor Backend Running!");
}

#[tokio::test]
async fn test_query_tags_emotion() {
    let router = server(Arc::new(Fixed("You should start with the basics."))).router();

    let response = router
        .oneshot(post_json(
            "/query",
            &serde_json::json!({ "question": "Where do I begin?" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["text"], "You should start with the basics.");
    assert_eq!(json["emotion"], "thinking");
}

#[tokio::test]
async fn test_query_empty_answer_falls_back() {
    let router = server(Arc::new(Fixed(""))).router();

    let response = router
        .oneshot(post_json("/query", &serde_json::json!({ "question": "?" })))
        .await
        .unwrap();

    let json = json_body(response).await;
    assert_eq!(json["text"], NO_ANSWER);
}

#[tokio::test]
async fn test_chat_opens_and_continues_session() {
    let backend = server(Arc::new(EchoAnswerer));
    let sessions = backend.sessions();
    let router = backend.router();

    let first = router
        .clone()
        .oneshot(post_json("/chat", &serde_json::json!({ "message": "hello" })))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first = json_body(first).await;
    let session_id = first["session_id"].as_str().unwrap().to_string();
    assert!(!session_id.is_empty());
    assert_eq!(first["chat_history"].as_array().unwrap().len(), 1);

    let second = router
        .oneshot(post_json(
            "/chat",
            &serde_json::json!({ "message": "again", "session_id": session_id }),
        ))
        .await
        .unwrap();
    let second = json_body(second).await;
    assert_eq!(second["session_id"], session_id.as_str());
    let history = second["chat_history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1]["question"], "again");
    assert_eq!(history[1]["answer"], "You asked: again");

    assert_eq!(sessions.read().await.len(), 1);
}

#[tokio::test]
async fn test_answer_failure_is_500() {
    let router = server(Arc::new(Broken)).router();

    let response = router
        .oneshot(post_json("/query", &serde_json::json!({ "question": "hi" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = json_body(response).await;
    assert!(json["detail"].as_str().unwrap().contains("pipeline not loaded"));
}

#[tokio::test]
async fn test_malformed_body_rejected() {
    let router = server(Arc::new(EchoAnswerer)).router();

    let response = router
        .oneshot(post_json("/query", &serde_json::json!({ "q": "wrong field" })))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_cors_allows_configured_origin() {
    let router = server(Arc::new(EchoAnswerer)).router();

    let response = router
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/query")
                .header(header::ORIGIN, "http://localhost:3000")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://localhost:3000"
    );
}
