//! Configuration loading and parsing.
//!
//! Defines the server config schema and resolves defaults.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use narration_player::decode::DecodeTarget;

/// Top-level server configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    /// Bind address (host:port).
    pub bind: Option<String>,
    /// Speech generation API settings.
    pub speech: Option<SpeechConfig>,
    /// Output device and canonical clip layout.
    pub audio: Option<AudioConfig>,
}

/// Speech generation API settings.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SpeechConfig {
    /// API key sent as a bearer token (required).
    pub api_key: Option<String>,
    /// Service base URL (required).
    pub base_url: Option<String>,
    /// Model identifier.
    pub model: Option<String>,
    /// Voice identifier.
    pub voice: Option<String>,
    /// Compressed payload container returned by the service (default: mp3).
    pub format: Option<String>,
    /// Minimum delay between generation calls in milliseconds (default: 0).
    pub rate_limit_ms: Option<u64>,
}

/// Output device and decode settings.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AudioConfig {
    /// Optional output device substring match.
    pub device: Option<String>,
    /// Canonical clip sample rate in Hz (default: 24000).
    pub sample_rate: Option<u32>,
    /// Canonical clip channel count (default: 1).
    pub channels: Option<usize>,
}

impl ServerConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<ServerConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }
}

/// Parse an optional bind address from config.
pub fn bind_from_config(cfg: &ServerConfig) -> Result<Option<SocketAddr>> {
    let Some(bind) = cfg.bind.as_deref() else {
        return Ok(None);
    };
    let addr = bind.parse().with_context(|| format!("parse bind {bind}"))?;
    Ok(Some(addr))
}

/// Resolve the canonical clip layout from config.
pub fn decode_target_from_config(cfg: &ServerConfig) -> DecodeTarget {
    let defaults = DecodeTarget::default();
    let audio = cfg.audio.as_ref();
    DecodeTarget {
        sample_rate: audio
            .and_then(|a| a.sample_rate)
            .filter(|rate| *rate > 0)
            .unwrap_or(defaults.sample_rate),
        channels: audio
            .and_then(|a| a.channels)
            .filter(|ch| *ch > 0)
            .unwrap_or(defaults.channels),
    }
}

/// Extract the optional output device hint, dropping empty values.
pub fn device_from_config(cfg: &ServerConfig) -> Option<String> {
    cfg.audio.as_ref().and_then(|a| {
        a.device.as_deref().and_then(|name| {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    })
}
