//! Text-to-speech (TTS) over an OpenAI-compatible speech API

use crate::{Error, Result};

/// Lowest and highest speed the speech API accepts
const SPEED_RANGE: (f32, f32) = (0.25, 4.0);

/// Synthesizes speech from text
pub struct TextToSpeech {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl TextToSpeech {
    /// Create a synthesizer for `{base_url}/audio/speech`
    ///
    /// The API key may be omitted for self-hosted servers.
    #[must_use]
    pub fn new(base_url: &str, api_key: Option<String>, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }

    /// Whether credentials are configured for a hosted API
    #[must_use]
    pub const fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    /// Synthesize text to MP3 audio
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the API reports an error
    pub async fn synthesize(&self, text: &str, voice: &str, speed: f32) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct SpeechRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
            response_format: &'a str,
        }

        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice,
            speed: speed.clamp(SPEED_RANGE.0, SPEED_RANGE.1),
            response_format: "mp3",
        };

        tracing::debug!(voice, speed = request.speed, chars = text.len(), "synthesizing speech");

        let mut builder = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("speech API error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}
