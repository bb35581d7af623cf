//! Audio playback to speakers

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// How often the playing thread checks for completion or cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Plays audio to the default output device
#[derive(Clone)]
pub struct AudioPlayback {
    config: StreamConfig,
}

impl AudioPlayback {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns error if there is no output device or it cannot play at 24kHz
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
            c.channels() == channels
                && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
        };

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| supports(c, 1))
            .or_else(|| {
                device
                    .supported_output_configs()
                    .ok()?
                    .find(|c| supports(c, 2))
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self { config })
    }

    /// Play mono samples until they finish or `cancel` fires
    ///
    /// `on_start` runs once the output stream is running. Returns `Ok(true)`
    /// when every sample was played and `Ok(false)` when cancelled.
    ///
    /// # Errors
    ///
    /// Returns error if the output stream cannot be opened
    pub fn play_blocking(
        &self,
        samples: Vec<f32>,
        cancel: &CancellationToken,
        on_start: impl FnOnce(),
    ) -> Result<bool> {
        if samples.is_empty() {
            on_start();
            return Ok(true);
        }

        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device".to_string()))?;

        let channels = usize::from(self.config.channels.max(1));
        let sample_count = samples.len();

        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);
            device
                .build_output_stream(
                    &self.config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut pos = position.load(Ordering::Relaxed);
                        for frame in data.chunks_mut(channels) {
                            let sample = samples.get(pos).copied().unwrap_or(0.0);
                            frame.fill(sample);
                            if pos < samples.len() {
                                pos += 1;
                            }
                        }
                        position.store(pos, Ordering::Relaxed);
                        if pos >= samples.len() {
                            finished.store(true, Ordering::Release);
                        }
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        on_start();

        let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
        let deadline = Instant::now() + Duration::from_millis(duration_ms + 500);

        let mut completed = true;
        while !finished.load(Ordering::Acquire) {
            if cancel.is_cancelled() {
                completed = false;
                break;
            }
            if Instant::now() > deadline {
                tracing::warn!("playback overran expected duration");
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        if completed {
            // let the device drain its last buffer
            std::thread::sleep(Duration::from_millis(100));
        }

        drop(stream);
        tracing::debug!(samples = sample_count, completed, "playback finished");

        Ok(completed)
    }
}

/// Decode MP3 bytes to mono f32 samples
///
/// # Errors
///
/// Returns error if the data is not valid MP3
pub fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}

/// Raise or lower pitch by resampling with linear interpolation
///
/// A factor above 1.0 shortens the clip and raises the pitch by the same
/// ratio; callers compensate the tempo when requesting synthesis.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn shift_pitch(samples: &[f32], factor: f32) -> Vec<f32> {
    if samples.is_empty() || factor <= 0.0 || (factor - 1.0).abs() < f32::EPSILON {
        return samples.to_vec();
    }

    let out_len = (samples.len() as f32 / factor).floor() as usize;
    (0..out_len)
        .map(|i| {
            let src = i as f32 * factor;
            let idx = src.floor() as usize;
            let frac = src - idx as f32;
            let a = samples[idx.min(samples.len() - 1)];
            let b = samples[(idx + 1).min(samples.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}

/// Scale samples by a volume in `0.0..=1.0`
pub fn apply_volume(samples: &mut [f32], volume: f32) {
    let volume = volume.clamp(0.0, 1.0);
    if (volume - 1.0).abs() < f32::EPSILON {
        return;
    }
    for s in samples {
        *s *= volume;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_pitch_shortens() {
        let samples: Vec<f32> = (0..1200).map(|i| (i % 10) as f32 / 10.0).collect();
        let shifted = shift_pitch(&samples, 1.2);
        assert_eq!(shifted.len(), 1000);
    }

    #[test]
    fn test_shift_pitch_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(shift_pitch(&samples, 1.0), samples);
        assert!(shift_pitch(&[], 1.5).is_empty());
    }

    #[test]
    fn test_shift_pitch_interpolates() {
        let shifted = shift_pitch(&[0.0, 1.0, 2.0, 3.0], 1.5);
        assert_eq!(shifted.len(), 2);
        assert!((shifted[1] - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_apply_volume() {
        let mut samples = vec![0.5, -0.5];
        apply_volume(&mut samples, 0.5);
        assert!((samples[0] - 0.25).abs() < 1e-6);
        assert!((samples[1] + 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_decode_garbage_is_empty_or_error() {
        // minimp3 skips data it cannot sync to, so garbage decodes to nothing
        let decoded = decode_mp3(&[0u8; 64]);
        assert!(decoded.map(|s| s.is_empty()).unwrap_or(true));
    }
}
