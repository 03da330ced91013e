//! Canonical WAV artifact encoder.
//!
//! Produces an uncompressed RIFF/WAVE byte stream with a single "fmt " and a
//! single "data" sub-chunk: 16-bit little-endian PCM, interleaved in channel
//! order. The layout is a wire contract consumed byte-for-byte by existing
//! clients, including its quantization quirk (see [`quantize`]).

use crate::buffer::AudioBuffer;
use crate::error::NarrationError;

/// Fixed RIFF/WAVE + "fmt " + "data" header size in bytes.
pub const HEADER_LEN: usize = 44;

const FORMAT_PCM: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;

/// Encode a decoded buffer as a complete WAV byte stream.
///
/// The output is exactly `44 + frames * channels * 2` bytes. Deterministic,
/// no side effects; the only error path is a clip too large to address with
/// the container's 32-bit length fields.
pub fn encode_wav(buffer: &AudioBuffer) -> Result<Vec<u8>, NarrationError> {
    let frames = buffer.frames();
    let channels = buffer.channel_count();
    let rate = buffer.sample_rate();

    if channels > usize::from(u16::MAX) {
        return Err(NarrationError::InvalidAudioBuffer(format!(
            "{channels} channels exceed the WAV channel field"
        )));
    }
    let block_align = channels as u16 * (BITS_PER_SAMPLE / 8);
    let byte_rate = u64::from(rate) * u64::from(block_align);
    let data_len = frames as u64 * u64::from(block_align);
    if byte_rate > u64::from(u32::MAX) || data_len + 36 > u64::from(u32::MAX) {
        return Err(NarrationError::InvalidAudioBuffer(
            "clip too large for a RIFF container".to_string(),
        ));
    }

    let mut out = Vec::with_capacity(HEADER_LEN + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&FORMAT_PCM.to_le_bytes());
    out.extend_from_slice(&(channels as u16).to_le_bytes());
    out.extend_from_slice(&rate.to_le_bytes());
    out.extend_from_slice(&(byte_rate as u32).to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data_len as u32).to_le_bytes());
    for frame in 0..frames {
        for channel in buffer.channels() {
            out.extend_from_slice(&quantize(channel[frame]).to_le_bytes());
        }
    }

    Ok(out)
}

/// Map a float sample to 16-bit PCM.
///
/// Clamps to `[-1, 1]`, scales negative samples by 32768 and non-negative
/// ones by 32767, then truncates toward zero. The asymmetric scale carries a
/// small DC bias; existing artifacts were produced with it, so it is kept
/// bit-exact rather than corrected.
fn quantize(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    let scaled = if s < 0.0 { s * 32768.0 } else { s * 32767.0 };
    scaled as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(rate: u32, channels: Vec<Vec<f32>>) -> AudioBuffer {
        AudioBuffer::new(rate, channels).unwrap()
    }

    fn int16_at(bytes: &[u8], offset: usize) -> i16 {
        i16::from_le_bytes([bytes[offset], bytes[offset + 1]])
    }

    #[test]
    fn output_length_is_header_plus_two_bytes_per_sample() {
        for (rate, channels, frames) in [
            (8_000u32, 1usize, 0usize),
            (24_000, 1, 7),
            (24_000, 2, 5),
            (44_100, 3, 11),
            (48_000, 2, 1024),
        ] {
            let data = vec![vec![0.25f32; frames]; channels];
            let wav = encode_wav(&buffer(rate, data)).unwrap();
            assert_eq!(wav.len(), HEADER_LEN + frames * channels * 2);
        }
    }

    #[test]
    fn header_layout_matches_contract() {
        let wav = encode_wav(&buffer(24_000, vec![vec![0.0; 4]])).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(wav[4..8].try_into().unwrap()), 44);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(u32::from_le_bytes(wav[16..20].try_into().unwrap()), 16);
        assert_eq!(u16::from_le_bytes(wav[20..22].try_into().unwrap()), 1);
        assert_eq!(u16::from_le_bytes(wav[22..24].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(wav[24..28].try_into().unwrap()), 24_000);
        assert_eq!(u32::from_le_bytes(wav[28..32].try_into().unwrap()), 48_000);
        assert_eq!(u16::from_le_bytes(wav[32..34].try_into().unwrap()), 2);
        assert_eq!(u16::from_le_bytes(wav[34..36].try_into().unwrap()), 16);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32::from_le_bytes(wav[40..44].try_into().unwrap()), 8);
    }

    #[test]
    fn header_fields_scale_with_rate_and_channels() {
        let wav = encode_wav(&buffer(48_000, vec![vec![0.0; 3]; 2])).unwrap();

        // riff length = 36 + 3 frames * 2 ch * 2 bytes
        assert_eq!(u32::from_le_bytes(wav[4..8].try_into().unwrap()), 48);
        assert_eq!(u16::from_le_bytes(wav[22..24].try_into().unwrap()), 2);
        assert_eq!(u32::from_le_bytes(wav[24..28].try_into().unwrap()), 48_000);
        assert_eq!(u32::from_le_bytes(wav[28..32].try_into().unwrap()), 192_000);
        assert_eq!(u16::from_le_bytes(wav[32..34].try_into().unwrap()), 4);
        assert_eq!(u32::from_le_bytes(wav[40..44].try_into().unwrap()), 12);
    }

    #[test]
    fn known_samples_quantize_to_reference_words() {
        let wav = encode_wav(&buffer(24_000, vec![vec![0.0, 0.5, -0.5, 1.0]])).unwrap();

        assert_eq!(wav.len(), 52);
        assert_eq!(int16_at(&wav, 44), 0);
        assert_eq!(int16_at(&wav, 46), 16_383);
        assert_eq!(int16_at(&wav, 48), -16_384);
        assert_eq!(int16_at(&wav, 50), 32_767);
    }

    #[test]
    fn out_of_range_samples_clamp() {
        let wav = encode_wav(&buffer(24_000, vec![vec![2.0, -2.0]])).unwrap();
        assert_eq!(int16_at(&wav, 44), 32_767);
        assert_eq!(int16_at(&wav, 46), -32_768);
    }

    #[test]
    fn frames_interleave_in_channel_order() {
        let wav = encode_wav(&buffer(
            24_000,
            vec![vec![0.25, 0.75], vec![-0.25, -0.75]],
        ))
        .unwrap();

        assert_eq!(int16_at(&wav, 44), (0.25f32 * 32_767.0) as i16);
        assert_eq!(int16_at(&wav, 46), (-0.25f32 * 32_768.0) as i16);
        assert_eq!(int16_at(&wav, 48), (0.75f32 * 32_767.0) as i16);
        assert_eq!(int16_at(&wav, 50), (-0.75f32 * 32_768.0) as i16);
    }

    #[test]
    fn quantization_round_trips_within_one_step() {
        for s in [-1.0f32, -0.9, -0.31, -0.001, 0.0, 0.001, 0.31, 0.9, 1.0] {
            let q = quantize(s);
            let restored = if q < 0 {
                f64::from(q) / 32_768.0
            } else {
                f64::from(q) / 32_767.0
            };
            assert!(
                (restored - f64::from(s)).abs() <= 1.0 / 32_768.0,
                "sample {s} decoded to {restored}"
            );
        }
    }

    #[test]
    fn empty_buffer_is_header_only() {
        let wav = encode_wav(&buffer(24_000, vec![Vec::new()])).unwrap();
        assert_eq!(wav.len(), HEADER_LEN);
        assert_eq!(u32::from_le_bytes(wav[40..44].try_into().unwrap()), 0);
    }
}
