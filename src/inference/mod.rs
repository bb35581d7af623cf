//! Inference client for the question-answering backend
//!
//! Two calls: a stateless `/query` and a session-based `/chat`. Any non-2xx
//! status is a hard failure; the caller decides what the user sees.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::turn::Emotion;
use crate::{Error, Result};

/// Answer to a single question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
    #[serde(default)]
    pub emotion: Emotion,
}

/// One question/answer pair of a chat session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
}

/// Answer within a chat session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    /// Session the backend filed this exchange under
    pub session_id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub emotion: Emotion,
    /// Every exchange of the session so far, this one included
    #[serde(default)]
    pub chat_history: Vec<Exchange>,
}

/// A question-answering backend
#[async_trait]
pub trait Inference: Send + Sync {
    /// Ask one question with no session
    async fn query(&self, question: &str) -> Result<Reply>;

    /// Send a message within a session, opening one when `session_id` is `None`
    async fn chat(&self, message: &str, session_id: Option<&str>) -> Result<ChatReply>;
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    question: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

/// HTTP client for the `/query` and `/chat` endpoints
#[derive(Clone)]
pub struct InferenceClient {
    client: reqwest::Client,
    base_url: String,
}

impl InferenceClient {
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: serde::de::DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(%url, "inference request");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, %url, "inference request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, "inference API error");
            return Err(Error::Inference(format!("API error: {status}")));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl Inference for InferenceClient {
    async fn query(&self, question: &str) -> Result<Reply> {
        let reply: Reply = self.post("/query", &QueryRequest { question }).await?;
        tracing::info!(emotion = %reply.emotion, chars = reply.text.len(), "query answered");
        Ok(reply)
    }

    async fn chat(&self, message: &str, session_id: Option<&str>) -> Result<ChatReply> {
        let reply: ChatReply = self
            .post("/chat", &ChatRequest {
                message,
                session_id,
            })
            .await?;
        tracing::info!(
            session_id = reply.session_id.as_deref().unwrap_or("<none>"),
            emotion = %reply.emotion,
            history = reply.chat_history.len(),
            "chat answered"
        );
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_omits_missing_session() {
        let json = serde_json::to_value(ChatRequest {
            message: "hi",
            session_id: None,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "message": "hi" }));

        let json = serde_json::to_value(ChatRequest {
            message: "hi",
            session_id: Some("abc"),
        })
        .unwrap();
        assert_eq!(json["session_id"], "abc");
    }

    #[test]
    fn test_reply_without_emotion_is_neutral() {
        let reply: Reply = serde_json::from_str(r#"{"text":"4"}"#).unwrap();
        assert_eq!(reply.emotion, Emotion::Neutral);
    }

    #[test]
    fn test_chat_reply_parses_history() {
        let reply: ChatReply = serde_json::from_str(
            r#"{"session_id":"s1","text":"Paris","emotion":"happy",
                "chat_history":[{"question":"Capital of France?","answer":"Paris"}]}"#,
        )
        .unwrap();
        assert_eq!(reply.session_id.as_deref(), Some("s1"));
        assert_eq!(reply.emotion, Emotion::Happy);
        assert_eq!(reply.chat_history.len(), 1);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        assert_eq!(
            InferenceClient::new("http://localhost:8000/").base_url(),
            "http://localhost:8000"
        );
    }
}
