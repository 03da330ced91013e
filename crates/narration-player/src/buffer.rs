//! Decoded audio buffer model.
//!
//! [`AudioBuffer`] is the immutable product of the decode stage and the only
//! input the WAV encoder accepts. Samples are stored planar (one `Vec<f32>`
//! per channel); the playback path works on interleaved samples, so helpers
//! for both layouts live here.

use crate::error::NarrationError;

/// Immutable decoded audio: planar `f32` samples plus a sample rate.
///
/// Invariants, enforced at construction:
/// - at least one channel
/// - all channels have the same length
/// - sample rate is non-zero
///
/// Sample values are nominally in `[-1, 1]`; out-of-range values are legal
/// here and clamped by the encoder.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Build a buffer from planar channel data, validating the invariants.
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self, NarrationError> {
        if sample_rate == 0 {
            return Err(NarrationError::InvalidAudioBuffer(
                "sample rate must be non-zero".to_string(),
            ));
        }
        if channels.is_empty() {
            return Err(NarrationError::InvalidAudioBuffer(
                "at least one channel is required".to_string(),
            ));
        }
        let frames = channels[0].len();
        if channels.iter().any(|ch| ch.len() != frames) {
            return Err(NarrationError::InvalidAudioBuffer(format!(
                "channel lengths differ: {:?}",
                channels.iter().map(Vec::len).collect::<Vec<_>>()
            )));
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    /// Build a buffer from interleaved samples
    /// (`frame0[ch0], frame0[ch1], ..., frame1[ch0], ...`).
    pub fn from_interleaved(
        sample_rate: u32,
        channel_count: usize,
        samples: &[f32],
    ) -> Result<Self, NarrationError> {
        if channel_count == 0 {
            return Err(NarrationError::InvalidAudioBuffer(
                "at least one channel is required".to_string(),
            ));
        }
        if samples.len() % channel_count != 0 {
            return Err(NarrationError::InvalidAudioBuffer(format!(
                "{} interleaved samples do not divide into {} channels",
                samples.len(),
                channel_count
            )));
        }
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (ch, sample) in frame.iter().enumerate() {
                channels[ch].push(*sample);
            }
        }
        Self::new(sample_rate, channels)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Samples in interleaved order, one per channel per frame.
    pub fn interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.frames() * self.channel_count());
        for frame in 0..self.frames() {
            for ch in &self.channels {
                out.push(ch[frame]);
            }
        }
        out
    }

    /// Total duration in milliseconds, rounded down.
    pub fn duration_ms(&self) -> u64 {
        (self.frames() as u64).saturating_mul(1000) / self.sample_rate as u64
    }
}
