use serde::{Deserialize, Serialize};

/// Lifecycle phase of the narration controller.
///
/// Exactly one phase is active at a time; `Generating` and `Playing` carry
/// the active narration id in [`NarrationStatus`].
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum NarrationPhase {
    /// No narration is being generated or played.
    #[default]
    Idle,
    /// Speech generation for the active id is in flight.
    Generating,
    /// Audio for the active id is playing on the output device.
    Playing,
}

/// Reason why the previous narration left the `Playing`/`Generating` phase.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum NarrationEndReason {
    /// The audio stream reached its natural end.
    Completed,
    /// Narration was explicitly stopped (or toggled off by re-requesting it).
    Stopped,
    /// A different narration id was requested and took over the output.
    Superseded,
    /// Generation or playback reported an error.
    Failed,
}

/// Controller status snapshot exposed by the server API.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NarrationStatus {
    /// Current controller phase.
    pub phase: NarrationPhase,
    /// Active narration id while generating or playing.
    pub narration_id: Option<String>,
    /// Elapsed playback time in milliseconds.
    pub elapsed_ms: Option<u64>,
    /// Total clip duration in milliseconds.
    pub duration_ms: Option<u64>,
    /// Sample rate of the active clip (Hz).
    pub sample_rate: Option<u32>,
    /// Channel count of the active clip.
    pub channels: Option<u16>,
    /// Human-readable message from the most recent failure, if any.
    pub last_error: Option<String>,
    /// How the previous narration ended.
    pub end_reason: Option<NarrationEndReason>,
    /// Number of clips held by the playback cache.
    pub cached_clips: usize,
}
