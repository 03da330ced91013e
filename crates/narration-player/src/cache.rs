//! Per-narration clip cache.
//!
//! One successful generation per narration id for the lifetime of the
//! process: repeated playback requests reuse the cached clip instead of
//! re-invoking the external speech API. No eviction, no TTL — the scope is a
//! single server run, and a capacity bound stays a documented hardening path.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex};

use crate::buffer::AudioBuffer;
use crate::error::NarrationError;
use crate::wav;

/// Immutable product of one successful generation.
///
/// Shared as `Arc<NarrationClip>`: the cache holds one reference, the active
/// playback session holds another, and dropping the last reference releases
/// the audio.
#[derive(Debug)]
pub struct NarrationClip {
    /// Canonical WAV artifact served to download clients.
    pub wav: Vec<u8>,
    /// Interleaved samples used by the playback sink.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count of `samples`.
    pub channels: usize,
    /// Clip duration in milliseconds.
    pub duration_ms: u64,
}

impl NarrationClip {
    /// Build a clip (WAV artifact + playback samples) from a decoded buffer.
    pub fn from_buffer(buffer: &AudioBuffer) -> Result<Self, NarrationError> {
        let wav = wav::encode_wav(buffer)?;
        Ok(Self {
            wav,
            samples: buffer.interleaved(),
            sample_rate: buffer.sample_rate(),
            channels: buffer.channel_count(),
            duration_ms: buffer.duration_ms(),
        })
    }
}

/// Map of narration id → generated clip, first writer wins.
#[derive(Debug, Default)]
pub struct PlaybackCache {
    inner: Mutex<HashMap<String, Arc<NarrationClip>>>,
}

impl PlaybackCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pure lookup; never mutates.
    pub fn get(&self, id: &str) -> Option<Arc<NarrationClip>> {
        self.inner.lock().unwrap().get(id).cloned()
    }

    /// Insert a clip if the id is vacant and return the entry's value.
    ///
    /// When an entry already exists the stored clip wins and `clip` is
    /// returned to its owner by value semantics: the caller's `Arc` simply
    /// drops, releasing the losing clip. Concurrent generations for one id
    /// are wasted work, not a correctness issue.
    pub fn put(&self, id: &str, clip: Arc<NarrationClip>) -> Arc<NarrationClip> {
        let mut entries = self.inner.lock().unwrap();
        match entries.entry(id.to_string()) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => slot.insert(clip).clone(),
        }
    }

    /// Number of cached clips.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(marker: u8) -> Arc<NarrationClip> {
        Arc::new(NarrationClip {
            wav: vec![marker],
            samples: vec![f32::from(marker)],
            sample_rate: 24_000,
            channels: 1,
            duration_ms: 0,
        })
    }

    #[test]
    fn get_misses_before_put() {
        let cache = PlaybackCache::new();
        assert!(cache.get("a1").is_none());
        // read has no hidden mutation
        assert!(cache.get("a1").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn put_then_get_returns_same_clip() {
        let cache = PlaybackCache::new();
        let stored = cache.put("a1", clip(1));
        let fetched = cache.get("a1").unwrap();
        assert!(Arc::ptr_eq(&stored, &fetched));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn first_writer_wins() {
        let cache = PlaybackCache::new();
        let first = cache.put("a1", clip(1));
        let second = cache.put("a1", clip(2));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.get("a1").unwrap().wav, vec![1]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn entries_are_per_id() {
        let cache = PlaybackCache::new();
        cache.put("a1", clip(1));
        cache.put("b2", clip(2));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("b2").unwrap().wav, vec![2]);
    }

    #[test]
    fn clip_from_buffer_carries_artifact_and_samples() {
        let buffer = AudioBuffer::new(24_000, vec![vec![0.0, 0.5, -0.5, 1.0]]).unwrap();
        let clip = NarrationClip::from_buffer(&buffer).unwrap();

        assert_eq!(clip.wav.len(), 52);
        assert_eq!(clip.samples, vec![0.0, 0.5, -0.5, 1.0]);
        assert_eq!(clip.sample_rate, 24_000);
        assert_eq!(clip.channels, 1);
        assert_eq!(clip.duration_ms, 0);
    }
}
