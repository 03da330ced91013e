/// Tuning parameters shared by the resample and playback stages.
#[derive(Clone, Debug)]
pub struct PlaybackTuning {
    /// Resampler input chunk size in frames.
    ///
    /// Larger values reduce per-call overhead at the cost of memory.
    pub chunk_frames: usize,
    /// How often the playback session checks for completion or cancellation.
    pub poll_interval: std::time::Duration,
}

impl Default for PlaybackTuning {
    /// Defaults tuned for short narration clips.
    fn default() -> Self {
        Self {
            chunk_frames: 1024,
            poll_interval: std::time::Duration::from_millis(25),
        }
    }
}
