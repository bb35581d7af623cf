//! Utterance endpoint detection
//!
//! Decides when a single spoken question starts and ends using RMS energy,
//! so capture can stop on its own after the speaker falls silent.

use super::capture::{SAMPLE_RATE, rms};

/// Default minimum audio energy to consider speech
pub const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum voiced audio in an utterance (0.3 seconds at 16kHz)
const MIN_SPEECH_SAMPLES: usize = SAMPLE_RATE as usize * 3 / 10;

/// Trailing silence that ends an utterance (0.5 seconds)
const SILENCE_SAMPLES: usize = SAMPLE_RATE as usize / 2;

/// State of the utterance detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// No speech heard yet
    Waiting,
    /// Speech in progress, accumulating samples
    Speaking,
    /// Enough speech followed by enough silence
    Complete,
}

/// Detects the start and end of one utterance
pub struct UtteranceDetector {
    threshold: f32,
    state: DetectorState,
    speech_buffer: Vec<f32>,
    voiced_samples: usize,
    silence_counter: usize,
}

impl Default for UtteranceDetector {
    fn default() -> Self {
        Self::new(ENERGY_THRESHOLD)
    }
}

impl UtteranceDetector {
    /// Create a detector with the given RMS speech threshold
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self {
            threshold,
            state: DetectorState::Waiting,
            speech_buffer: Vec::new(),
            voiced_samples: 0,
            silence_counter: 0,
        }
    }

    /// Feed a chunk of samples and return the resulting state
    pub fn process(&mut self, samples: &[f32]) -> DetectorState {
        let energy = rms(samples);
        let is_speech = energy > self.threshold;

        match self.state {
            DetectorState::Waiting => {
                if is_speech {
                    self.state = DetectorState::Speaking;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.voiced_samples = samples.len();
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech started");
                }
            }
            DetectorState::Speaking => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.voiced_samples += samples.len();
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                if self.silence_counter > SILENCE_SAMPLES
                    && self.voiced_samples > MIN_SPEECH_SAMPLES
                {
                    tracing::debug!(samples = self.speech_buffer.len(), "utterance complete");
                    self.state = DetectorState::Complete;
                } else if self.silence_counter > SILENCE_SAMPLES * 2 {
                    // a click or cough, not a question
                    tracing::trace!("false start, waiting again");
                    self.reset();
                }
            }
            DetectorState::Complete => {}
        }

        self.state
    }

    /// Whether any speech has been heard
    #[must_use]
    pub fn heard_speech(&self) -> bool {
        self.state != DetectorState::Waiting
    }

    /// Get the accumulated speech buffer
    #[must_use]
    pub fn speech_buffer(&self) -> &[f32] {
        &self.speech_buffer
    }

    /// Take the speech buffer, resetting the detector
    pub fn take_speech_buffer(&mut self) -> Vec<f32> {
        let buffer = std::mem::take(&mut self.speech_buffer);
        self.reset();
        buffer
    }

    /// Reset to waiting
    pub fn reset(&mut self) {
        self.state = DetectorState::Waiting;
        self.speech_buffer.clear();
        self.voiced_samples = 0;
        self.silence_counter = 0;
    }

    /// Get current state
    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }
}
