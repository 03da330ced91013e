//! In-memory speech payload decode stage.
//!
//! Uses Symphonia to probe and decode the compressed audio returned by the
//! speech API, then normalizes the result to the canonical narration layout
//! (target channel count and sample rate). The payload is a complete clip,
//! so decoding runs to EOF in one call rather than streaming.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::buffer::AudioBuffer;
use crate::error::NarrationError;
use crate::resample;

/// Canonical layout a decoded clip is normalized to.
#[derive(Clone, Copy, Debug)]
pub struct DecodeTarget {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Output channel count.
    pub channels: usize,
}

impl Default for DecodeTarget {
    /// Speech payloads are single-channel 24 kHz source material.
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            channels: 1,
        }
    }
}

/// Decode a compressed clip payload into an [`AudioBuffer`] at `target`.
///
/// `ext_hint` is a container/extension hint for the probe (for example
/// `"mp3"`). Decode faults are classified as [`NarrationError::PlaybackFault`].
pub fn decode_clip_bytes(
    bytes: Vec<u8>,
    ext_hint: Option<&str>,
    target: DecodeTarget,
    chunk_frames: usize,
) -> Result<AudioBuffer, NarrationError> {
    if target.sample_rate == 0 || target.channels == 0 {
        return Err(NarrationError::InvalidAudioBuffer(format!(
            "decode target {}Hz/{}ch is not usable",
            target.sample_rate, target.channels
        )));
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = ext_hint {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| NarrationError::PlaybackFault(format!("unrecognized audio payload: {e}")))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| NarrationError::PlaybackFault("no default audio track".to_string()))?;

    let src_channels = track
        .codec_params
        .channels
        .ok_or_else(|| NarrationError::PlaybackFault("unknown channel layout".to_string()))?
        .count();
    let src_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| NarrationError::PlaybackFault("unknown sample rate".to_string()))?;

    let codec_params = track.codec_params.clone();
    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| NarrationError::PlaybackFault(format!("decoder init failed: {e}")))?;

    let mut interleaved: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(_) => break, // EOF
        };

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(_) => continue,
        };

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
        sample_buf.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(sample_buf.samples());
    }

    if interleaved.is_empty() {
        return Err(NarrationError::PlaybackFault(
            "payload decoded to zero audio frames".to_string(),
        ));
    }

    let mapped = map_channels(&interleaved, src_channels, target.channels);
    let converted = if src_rate == target.sample_rate {
        mapped
    } else {
        tracing::debug!(
            from_hz = src_rate,
            to_hz = target.sample_rate,
            "resampling decoded clip"
        );
        resample::resample_interleaved(
            &mapped,
            target.channels,
            src_rate,
            target.sample_rate,
            chunk_frames,
        )
        .map_err(|e| NarrationError::PlaybackFault(format!("{e:#}")))?
    };

    AudioBuffer::from_interleaved(target.sample_rate, target.channels, &converted)
}

/// Remap interleaved samples to a different channel count.
///
/// Mapping rules:
/// - stereo → mono: average L/R
/// - mono → stereo: duplicate channel 0
/// - other layouts: best-effort clamp to available channels
fn map_channels(interleaved: &[f32], src_channels: usize, dst_channels: usize) -> Vec<f32> {
    if src_channels == dst_channels {
        return interleaved.to_vec();
    }

    let frames = interleaved.len() / src_channels;
    let mut out = Vec::with_capacity(frames * dst_channels);
    for frame in 0..frames {
        let base = frame * src_channels;
        for ch in 0..dst_channels {
            let sample = match (src_channels, dst_channels) {
                (2, 1) => 0.5 * (interleaved[base] + interleaved[base + 1]),
                (1, 2) => interleaved[base],
                _ => interleaved[base + ch.min(src_channels - 1)],
            };
            out.push(sample);
        }
    }
    out
}
