//! Shared narration status state.
//!
//! The controller thread is the only writer; API handlers take snapshots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use narration_types::{NarrationEndReason, NarrationPhase, NarrationStatus};

use crate::cache::NarrationClip;

/// Mutable status state behind the controller's mutex.
#[derive(Debug, Default)]
pub struct NarrationStatusState {
    /// Current controller phase.
    pub phase: NarrationPhase,
    /// Active narration id while generating or playing.
    pub narration_id: Option<String>,
    /// Sample rate of the active clip.
    pub sample_rate: Option<u32>,
    /// Channel count of the active clip.
    pub channels: Option<u16>,
    /// Duration of the active clip in milliseconds.
    pub duration_ms: Option<u64>,
    /// Counter updated by the playback callback for elapsed progress.
    pub played_frames: Option<Arc<AtomicU64>>,
    /// Message from the most recent failure.
    pub last_error: Option<String>,
    /// How the previous narration ended.
    pub end_reason: Option<NarrationEndReason>,
}

impl NarrationStatusState {
    /// Create a shared, mutex-protected status store.
    pub fn shared() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Return a snapshot suitable for API responses.
    pub fn snapshot(&self, cached_clips: usize) -> NarrationStatus {
        let elapsed_ms = match (self.played_frames.as_ref(), self.sample_rate) {
            (Some(frames), Some(rate)) if rate > 0 => {
                let frames = frames.load(Ordering::Relaxed);
                Some(frames.saturating_mul(1000) / u64::from(rate))
            }
            _ => None,
        };
        NarrationStatus {
            phase: self.phase,
            narration_id: self.narration_id.clone(),
            elapsed_ms,
            duration_ms: self.duration_ms,
            sample_rate: self.sample_rate,
            channels: self.channels,
            last_error: self.last_error.clone(),
            end_reason: self.end_reason,
            cached_clips,
        }
    }

    /// Record the start of generation for `id`.
    pub fn on_generating(&mut self, id: &str) {
        self.phase = NarrationPhase::Generating;
        self.narration_id = Some(id.to_string());
        self.sample_rate = None;
        self.channels = None;
        self.duration_ms = None;
        self.played_frames = None;
        self.last_error = None;
        self.end_reason = None;
    }

    /// Record the start of playback for `id`.
    pub fn on_playing(&mut self, id: &str, clip: &NarrationClip, played_frames: Arc<AtomicU64>) {
        self.phase = NarrationPhase::Playing;
        self.narration_id = Some(id.to_string());
        self.sample_rate = Some(clip.sample_rate);
        self.channels = Some(clip.channels as u16);
        self.duration_ms = Some(clip.duration_ms);
        self.played_frames = Some(played_frames);
        self.last_error = None;
        self.end_reason = None;
    }

    /// Record the return to idle, optionally with a failure message.
    pub fn on_idle(&mut self, reason: NarrationEndReason, error: Option<String>) {
        self.phase = NarrationPhase::Idle;
        self.narration_id = None;
        self.sample_rate = None;
        self.channels = None;
        self.duration_ms = None;
        self.played_frames = None;
        self.last_error = error;
        self.end_reason = Some(reason);
    }
}
