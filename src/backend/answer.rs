//! Answer sources for the development backend

use async_trait::async_trait;

use crate::Result;

/// Text returned when an answer source comes back empty
pub const NO_ANSWER: &str = "Sorry, I couldn't find relevant information.";

/// Produces an answer for a question
#[async_trait]
pub trait Answerer: Send + Sync {
    async fn answer(&self, question: &str) -> Result<String>;
}

/// Repeats the question back, for exercising the front end without a model
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoAnswerer;

#[async_trait]
impl Answerer for EchoAnswerer {
    async fn answer(&self, question: &str) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("You asked: {question}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo() {
        let answer = EchoAnswerer.answer("  why is the sky blue? ").await.unwrap();
        assert_eq!(answer, "You asked: why is the sky blue?");
    }
}
