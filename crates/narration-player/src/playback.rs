//! CPAL playback sink.
//!
//! Production [`NarrationSink`]: each `play` spawns a session thread that
//! picks an output device, resamples the clip to the device rate when
//! needed, and feeds the samples to a CPAL output stream. The callback:
//! - reads interleaved samples from the clip at a cursor
//! - applies basic channel mapping (mono↔stereo, best-effort otherwise)
//! - converts `f32` samples to the device sample format
//!
//! Natural completion (cursor exhausted) and stream faults are reported back
//! to the controller as commands carrying the session counter.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::Sender;

use crate::cache::NarrationClip;
use crate::config::PlaybackTuning;
use crate::controller::{ControllerCommand, NarrationSink};
use crate::device;
use crate::resample;

/// Sink that renders narration clips on a CPAL output device.
pub struct CpalSink {
    device_hint: Option<String>,
    tuning: PlaybackTuning,
    session: Option<SinkSession>,
}

struct SinkSession {
    cancel: Arc<AtomicBool>,
    join: thread::JoinHandle<()>,
}

impl CpalSink {
    /// `device_hint` selects an output device by substring match; `None`
    /// uses the host default.
    pub fn new(device_hint: Option<String>, tuning: PlaybackTuning) -> Self {
        Self {
            device_hint,
            tuning,
            session: None,
        }
    }
}

impl NarrationSink for CpalSink {
    fn play(
        &mut self,
        clip: Arc<NarrationClip>,
        session: u64,
        played_frames: Arc<AtomicU64>,
        events: Sender<ControllerCommand>,
    ) -> Result<()> {
        self.stop();

        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_for_thread = cancel.clone();
        let device_hint = self.device_hint.clone();
        let tuning = self.tuning.clone();

        let join = thread::spawn(move || {
            match run_session(
                device_hint.as_deref(),
                &tuning,
                &clip,
                &cancel_for_thread,
                &played_frames,
            ) {
                Ok(true) => {
                    let _ = events.send(ControllerCommand::PlaybackFinished { session });
                }
                Ok(false) => {} // cancelled; the controller has already moved on
                Err(e) => {
                    tracing::warn!("narration playback error: {e:#}");
                    let _ = events.send(ControllerCommand::PlaybackFailed {
                        session,
                        error: format!("{e:#}"),
                    });
                }
            }
        });

        self.session = Some(SinkSession { cancel, join });
        Ok(())
    }

    /// Cancel the active session and join its thread.
    fn stop(&mut self) {
        if let Some(sess) = self.session.take() {
            sess.cancel.store(true, Ordering::Relaxed);
            let _ = sess.join.join();
        }
    }
}

/// Play one clip to completion, cancellation, or fault.
///
/// Returns `Ok(true)` on natural completion and `Ok(false)` when cancelled.
fn run_session(
    device_hint: Option<&str>,
    tuning: &PlaybackTuning,
    clip: &NarrationClip,
    cancel: &Arc<AtomicBool>,
    played_frames: &Arc<AtomicU64>,
) -> Result<bool> {
    let host = cpal::default_host();
    let device = device::pick_device(&host, device_hint)?;
    let supported = device::pick_output_config(&device, Some(clip.sample_rate))?;
    let mut stream_config: cpal::StreamConfig = supported.clone().into();
    if let Some(buf) = device::pick_buffer_size(&supported) {
        stream_config.buffer_size = buf;
    }

    let samples = if clip.sample_rate == stream_config.sample_rate {
        clip.samples.clone()
    } else {
        tracing::debug!(
            from_hz = clip.sample_rate,
            to_hz = stream_config.sample_rate,
            "resampling clip to device rate"
        );
        resample::resample_interleaved(
            &clip.samples,
            clip.channels,
            clip.sample_rate,
            stream_config.sample_rate,
            tuning.chunk_frames,
        )?
    };

    let feed = FeedState {
        pos: 0,
        src: samples,
        src_channels: clip.channels,
    };
    let done = Arc::new(AtomicBool::new(false));
    let failed = Arc::new(AtomicBool::new(false));

    let stream = build_output_stream(
        &device,
        &stream_config,
        supported.sample_format(),
        feed,
        done.clone(),
        failed.clone(),
        played_frames.clone(),
    )?;
    stream.play()?;

    loop {
        if cancel.load(Ordering::Relaxed) {
            return Ok(false);
        }
        if failed.load(Ordering::Relaxed) {
            return Err(anyhow!("output stream reported an error"));
        }
        if done.load(Ordering::Relaxed) {
            break;
        }
        thread::sleep(tuning.poll_interval);
    }

    // let the device drain its final buffer before dropping the stream
    thread::sleep(Duration::from_millis(100));
    Ok(true)
}

/// Local playback cursor over a clip's interleaved samples.
struct FeedState {
    pos: usize,
    src: Vec<f32>,
    src_channels: usize,
}

fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    feed: FeedState,
    done: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    played_frames: Arc<AtomicU64>,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => {
            build_stream::<f32>(device, config, feed, done, failed, played_frames)
        }
        cpal::SampleFormat::I16 => {
            build_stream::<i16>(device, config, feed, done, failed, played_frames)
        }
        cpal::SampleFormat::I32 => {
            build_stream::<i32>(device, config, feed, done, failed, played_frames)
        }
        cpal::SampleFormat::U16 => {
            build_stream::<u16>(device, config, feed, done, failed, played_frames)
        }
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

/// Type-specialized stream builder for CPAL sample formats.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    feed: FeedState,
    done: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    played_frames: Arc<AtomicU64>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = config.channels as usize;
    let state = Arc::new(Mutex::new(feed));

    let err_flag = failed.clone();
    let err_fn = move |err| {
        tracing::warn!("stream error: {err}");
        err_flag.store(true, Ordering::Relaxed);
    };

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let mut st = state.lock().unwrap();

            let frames = data.len() / channels_out;
            let mut filled_frames = 0usize;

            for frame in 0..frames {
                if st.pos >= st.src.len() {
                    done.store(true, Ordering::Relaxed);
                    for idx in (frame * channels_out)..data.len() {
                        data[idx] = <T as cpal::Sample>::from_sample::<f32>(0.0);
                    }
                    break;
                }
                for ch in 0..channels_out {
                    let sample_f32 = next_sample_mapped(&mut *st, channels_out, ch);
                    data[frame * channels_out + ch] =
                        <T as cpal::Sample>::from_sample::<f32>(sample_f32);
                }
                filled_frames += 1;
            }

            if filled_frames > 0 {
                played_frames.fetch_add(filled_frames as u64, Ordering::Relaxed);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Read one output sample for `dst_ch`, applying a simple channel mapping.
///
/// `st.pos` advances once per destination frame (after the last channel).
fn next_sample_mapped(st: &mut FeedState, dst_channels: usize, dst_ch: usize) -> f32 {
    if st.pos >= st.src.len() {
        return 0.0;
    }

    let frame_start = st.pos;
    let get_src = |ch: usize, st: &FeedState| -> f32 {
        if ch < st.src_channels && frame_start + ch < st.src.len() {
            st.src[frame_start + ch]
        } else {
            0.0
        }
    };

    let out = match (st.src_channels, dst_channels) {
        (1, 1) => get_src(0, st),
        (2, 2) => get_src(dst_ch.min(1), st),
        (2, 1) => 0.5 * (get_src(0, st) + get_src(1, st)),
        (1, 2) => get_src(0, st),
        _ => get_src(dst_ch.min(st.src_channels.saturating_sub(1)), st),
    };

    if dst_ch + 1 == dst_channels {
        st.pos += st.src_channels;
    }
    out
}
