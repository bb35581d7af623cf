//! Development backend speaking the `/query` and `/chat` protocol
//!
//! Sessions live in memory only and are lost on restart.

mod answer;
mod emotion;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use answer::{Answerer, EchoAnswerer, NO_ANSWER};
pub use emotion::{detect_emotion, polarity};

use crate::inference::{ChatReply, Exchange, Reply};
use crate::{Error, Result};

/// Chat history per session id
pub type Sessions = Arc<RwLock<HashMap<String, Vec<Exchange>>>>;

/// Shared state for backend handlers
#[derive(Clone)]
pub struct BackendState {
    pub answerer: Arc<dyn Answerer>,
    pub sessions: Sessions,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    question: String,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    detail: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn internal_error(e: &Error) -> ApiError {
    tracing::error!(error = %e, "answer failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            detail: e.to_string(),
        }),
    )
}

async fn answer(state: &BackendState, question: &str) -> std::result::Result<String, ApiError> {
    let text = state
        .answerer
        .answer(question)
        .await
        .map_err(|e| internal_error(&e))?;
    if text.trim().is_empty() {
        Ok(NO_ANSWER.to_string())
    } else {
        Ok(text)
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "AI Tutor Backend Running!".to_string(),
    })
}

/// Single-turn question
async fn query(
    State(state): State<BackendState>,
    Json(request): Json<QueryRequest>,
) -> std::result::Result<Json<Reply>, ApiError> {
    let text = answer(&state, &request.question).await?;
    let emotion = detect_emotion(&text);
    tracing::debug!(%emotion, "query answered");
    Ok(Json(Reply { text, emotion }))
}

/// Session-based chat; a missing session id opens a new session
async fn chat(
    State(state): State<BackendState>,
    Json(request): Json<ChatRequest>,
) -> std::result::Result<Json<ChatReply>, ApiError> {
    let session_id = request
        .session_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let text = answer(&state, &request.message).await?;
    let emotion = detect_emotion(&text);

    let chat_history = {
        let mut sessions = state.sessions.write().await;
        let history = sessions.entry(session_id.clone()).or_default();
        history.push(Exchange {
            question: request.message,
            answer: text.clone(),
        });
        history.clone()
    };

    tracing::debug!(%session_id, turns = chat_history.len(), %emotion, "chat answered");

    Ok(Json(ChatReply {
        session_id: Some(session_id),
        text,
        emotion,
        chat_history,
    }))
}

/// Development backend server
pub struct BackendServer {
    state: BackendState,
    port: u16,
    allowed_origins: Vec<String>,
}

impl BackendServer {
    #[must_use]
    pub fn new(answerer: Arc<dyn Answerer>, port: u16, allowed_origins: Vec<String>) -> Self {
        Self {
            state: BackendState {
                answerer,
                sessions: Arc::new(RwLock::new(HashMap::new())),
            },
            port,
            allowed_origins,
        }
    }

    #[must_use]
    pub fn sessions(&self) -> Sessions {
        Arc::clone(&self.state.sessions)
    }

    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        let origins: Vec<HeaderValue> = self
            .allowed_origins
            .iter()
            .filter_map(|origin| {
                origin
                    .parse()
                    .map_err(|_| tracing::warn!(%origin, "ignoring invalid CORS origin"))
                    .ok()
            })
            .collect();

        let cors = CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true);

        Router::new()
            .route("/", get(health))
            .route("/query", post(query))
            .route("/chat", post(chat))
            .with_state(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Serve on an already bound listener
    ///
    /// # Errors
    ///
    /// Returns error if the server fails while running
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "backend listening");
        }
        axum::serve(listener, self.router())
            .await
            .map_err(|e| Error::Backend(format!("server error: {e}")))
    }

    /// Bind the configured port and serve
    ///
    /// # Errors
    ///
    /// Returns error if the server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Backend(format!("failed to bind {addr}: {e}")))?;
        self.serve(listener).await
    }

    /// Serve in a background task
    #[must_use]
    pub fn spawn(self, listener: TcpListener) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.serve(listener).await })
    }
}
