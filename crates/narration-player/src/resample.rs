//! Whole-buffer resample stage.
//!
//! Uses Rubato to convert interleaved `f32` audio between sample rates.
//! Narration clips are complete buffers rather than streams, so this runs
//! synchronously and collects the converted samples into a `Vec` instead of
//! feeding a queue.

use anyhow::{Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

/// Convert interleaved samples from `src_rate` to `dst_rate`.
///
/// `chunk_frames` sets the steady-state input chunk size; the final partial
/// chunk is processed with a shortened input window. Returns the input
/// unchanged when the rates already match.
pub fn resample_interleaved(
    input: &[f32],
    channels: usize,
    src_rate: u32,
    dst_rate: u32,
    chunk_frames: usize,
) -> Result<Vec<f32>> {
    if src_rate == dst_rate || input.is_empty() {
        return Ok(input.to_vec());
    }
    if channels == 0 || input.len() % channels != 0 {
        return Err(anyhow!(
            "{} interleaved samples do not divide into {} channels",
            input.len(),
            channels
        ));
    }

    let f_ratio = f64::from(dst_rate) / f64::from(src_rate);

    let sinc_len = 128;
    let oversampling_factor = 256;
    let interpolation = SincInterpolationType::Cubic;
    let window = WindowFunction::BlackmanHarris2;
    let f_cutoff = calculate_cutoff(sinc_len, window);

    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff,
        interpolation,
        oversampling_factor,
        window,
    };

    let chunk_in_frames = chunk_frames.max(1);
    let mut resampler = Async::<f32>::new_sinc(
        f_ratio,
        1.1,
        &params,
        chunk_in_frames,
        channels,
        FixedAsync::Input,
    )
    .map_err(|e| anyhow!("resampler init error: {e}"))?;

    let out_capacity_frames = ((chunk_in_frames as f64 * f_ratio).ceil() as usize + 32)
        .max(chunk_in_frames * 3);
    let mut out_interleaved = vec![0.0f32; channels * out_capacity_frames];

    let mut indexing = Indexing {
        input_offset: 0,
        output_offset: 0,
        active_channels_mask: None,
        partial_len: None,
    };

    let total_frames = input.len() / channels;
    let mut output = Vec::with_capacity((input.len() as f64 * f_ratio) as usize + channels * 64);
    let mut pos_frames = 0usize;

    while total_frames - pos_frames >= chunk_in_frames {
        let start = pos_frames * channels;
        let end = start + chunk_in_frames * channels;
        let input_adapter = InterleavedSlice::new(&input[start..end], channels, chunk_in_frames)
            .map_err(|e| anyhow!("interleaved slice (input) error: {e}"))?;
        let mut output_adapter =
            InterleavedSlice::new_mut(&mut out_interleaved, channels, out_capacity_frames)
                .map_err(|e| anyhow!("interleaved slice (output) error: {e}"))?;

        indexing.partial_len = None;
        let (_nbr_in, nbr_out) = resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
            .map_err(|e| anyhow!("resampler process error: {e}"))?;

        output.extend_from_slice(&out_interleaved[..nbr_out * channels]);
        pos_frames += chunk_in_frames;
    }

    let tail_frames = total_frames - pos_frames;
    if tail_frames > 0 {
        let start = pos_frames * channels;
        let input_adapter = InterleavedSlice::new(&input[start..], channels, tail_frames)
            .map_err(|e| anyhow!("interleaved slice (tail input) error: {e}"))?;
        let mut output_adapter =
            InterleavedSlice::new_mut(&mut out_interleaved, channels, out_capacity_frames)
                .map_err(|e| anyhow!("interleaved slice (tail output) error: {e}"))?;

        indexing.partial_len = Some(tail_frames);
        let (_nbr_in, nbr_out) = resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
            .map_err(|e| anyhow!("resampler tail process error: {e}"))?;

        output.extend_from_slice(&out_interleaved[..nbr_out * channels]);
    }

    Ok(output)
}
