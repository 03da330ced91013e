//! Speech generation client.
//!
//! Blocking HTTP client for the external text-to-speech service. The service
//! returns base64-encoded compressed audio (single-channel 24 kHz source
//! material) in a JSON envelope, or an error string. The call has no
//! client-side timeout beyond transport defaults and cannot be cancelled once
//! issued; the controller only abandons interest in superseded results.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use base64::Engine as _;
use base64::engine::general_purpose;
use serde::Deserialize;

use narration_player::controller::SpeechGenerator;

use crate::config::SpeechConfig;

const DEFAULT_MODEL: &str = "speech-1";
const DEFAULT_VOICE: &str = "narrator";
const DEFAULT_FORMAT: &str = "mp3";
const SPEECH_PATH: &str = "/v1/audio/speech";

pub struct SpeechClient {
    base_url: String,
    api_key: String,
    model: String,
    voice: String,
    format: String,
    rate_limit: Duration,
    last_request: Mutex<Instant>,
    agent: ureq::Agent,
}

impl SpeechClient {
    pub fn new(cfg: &SpeechConfig) -> Result<Self> {
        let Some(api_key) = cfg.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
            bail!("speech api_key is required in config");
        };
        let Some(base_url) = cfg.base_url.as_deref().filter(|u| !u.trim().is_empty()) else {
            bail!("speech base_url is required in config");
        };
        let rate_limit = Duration::from_millis(cfg.rate_limit_ms.unwrap_or(0));
        let agent = ureq::Agent::new_with_config(ureq::Agent::config_builder().build());

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: cfg.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            voice: cfg.voice.clone().unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            format: cfg
                .format
                .clone()
                .unwrap_or_else(|| DEFAULT_FORMAT.to_string()),
            rate_limit,
            last_request: Mutex::new(Instant::now()),
            agent,
        })
    }

    /// Container format of the returned payload (decode probe hint).
    pub fn payload_format(&self) -> &str {
        &self.format
    }

    fn wait_rate_limit(&self) {
        if self.rate_limit.is_zero() {
            return;
        }
        let mut last = self.last_request.lock().expect("speech rate limit lock");
        let elapsed = last.elapsed();
        if elapsed < self.rate_limit {
            std::thread::sleep(self.rate_limit - elapsed);
        }
        *last = Instant::now();
    }
}

#[derive(Debug, Deserialize)]
struct SpeechResponse {
    audio: Option<String>,
    error: Option<String>,
}

/// Unpack the JSON envelope into compressed audio bytes.
fn audio_bytes_from_response(body: SpeechResponse) -> Result<Vec<u8>> {
    if let Some(error) = body.error {
        bail!("speech api error: {error}");
    }
    let encoded = body
        .audio
        .ok_or_else(|| anyhow!("speech response missing audio field"))?;
    let bytes = general_purpose::STANDARD
        .decode(encoded.trim())
        .context("speech payload base64 decode failed")?;
    if bytes.is_empty() {
        bail!("speech api returned empty audio");
    }
    Ok(bytes)
}

impl SpeechGenerator for SpeechClient {
    fn generate(&self, text: &str) -> Result<Vec<u8>> {
        self.wait_rate_limit();

        let url = format!("{}{}", self.base_url, SPEECH_PATH);
        let payload = serde_json::json!({
            "model": self.model,
            "voice": self.voice,
            "input": text,
            "format": self.format,
        });
        tracing::debug!(chars = text.len(), "speech generation request");

        let mut resp = self
            .agent
            .post(&url)
            .header("authorization", &format!("Bearer {}", self.api_key))
            .send_json(payload)
            .context("speech request failed")?;
        let body: SpeechResponse = resp
            .body_mut()
            .read_json()
            .context("speech response parse failed")?;

        audio_bytes_from_response(body)
    }
}
