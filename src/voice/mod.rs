//! Voice processing module
//!
//! Capture side: microphone samples, utterance endpointing and remote
//! transcription behind [`SpeechRecognizer`]. Playback side: voice
//! selection, remote synthesis and speaker output behind [`Speaker`].

mod capture;
mod detector;
mod playback;
mod recognizer;
mod speaker;
mod stt;
mod tts;
mod voices;

pub use capture::{AudioCapture, SAMPLE_RATE, rms, samples_to_wav};
pub use detector::{DetectorState, ENERGY_THRESHOLD, UtteranceDetector};
pub use playback::{AudioPlayback, PLAYBACK_SAMPLE_RATE, apply_volume, decode_mp3, shift_pitch};
pub use recognizer::{CaptureError, MicrophoneRecognizer, SpeechRecognizer, finalize_transcript};
pub use speaker::{
    CloudSpeechEngine, PlaybackError, PlaybackEvent, PlaybackEvents, PlaybackSink, Speaker,
    SynthesisEngine, Utterance,
};
pub use stt::SpeechToText;
pub use tts::TextToSpeech;
pub use voices::{DEFAULT_ENGINE_VOICES, DEFAULT_PREFERRED_VOICES, Prosody, Voice, select_voice};
