//! Speech-to-text (STT) over a Whisper-compatible API

use crate::{Error, Result};

/// Response from a Whisper-compatible transcription API
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcribes recorded speech to text
pub struct SpeechToText {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    language: String,
}

impl SpeechToText {
    /// Create a transcriber for `{base_url}/audio/transcriptions`
    ///
    /// The API key may be omitted for self-hosted servers.
    #[must_use]
    pub fn new(base_url: &str, api_key: Option<String>, model: String, language: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            language,
        }
    }

    /// Transcribe WAV audio to text
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the API reports an error
    pub async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), model = %self.model, "starting transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone())
            .text("language", self.language.clone());

        let mut request = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, "transcription request failed");
            e
        })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription API error");
            return Err(Error::Stt(format!("transcription API error {status}: {body}")));
        }

        let result: TranscriptionResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse transcription response");
            e
        })?;

        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }
}
