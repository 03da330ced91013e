//! Failure taxonomy for the narration engine.
//!
//! Every failure is terminal for the request that caused it: the controller
//! returns to idle and records the message. Nothing here crashes the process.

/// Classified narration failures surfaced to the hosting layer.
#[derive(Debug, thiserror::Error)]
pub enum NarrationError {
    /// A decoded audio buffer violated its preconditions (zero channels,
    /// unequal channel lengths, zero sample rate). Fails fast, never retried.
    #[error("invalid audio buffer: {0}")]
    InvalidAudioBuffer(String),

    /// The external speech call returned no usable audio or failed outright.
    #[error("speech generation failed: {0}")]
    GenerationFailed(String),

    /// Decoding or playing generated audio failed.
    #[error("playback fault: {0}")]
    PlaybackFault(String),
}
