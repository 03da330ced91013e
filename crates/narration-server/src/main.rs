//! Narration server — reads community texts aloud on the host audio output.
//!
//! ## Pipeline
//! 1. **Generate**: a session thread calls the external speech API and gets
//!    compressed audio for the requested text.
//! 2. **Decode**: Symphonia decodes the payload; the result is normalized to
//!    the canonical clip layout and encoded as a WAV artifact.
//! 3. **Play**: the CPAL sink renders the clip; at most one stream at a time.
//!
//! Generated clips are cached per narration id for the lifetime of the
//! process, so repeat requests play immediately without a second API call.

mod api;
mod cli;
mod config;
mod openapi;
mod speech;

use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use narration_player::cache::PlaybackCache;
use narration_player::config::PlaybackTuning;
use narration_player::controller::{ThreadedGenerator, spawn_controller};
use narration_player::device;
use narration_player::playback::CpalSink;
use narration_player::status::NarrationStatusState;

use crate::speech::SpeechClient;

#[actix_web::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,actix_web=info,narration_server=info")
        }))
        .init();

    if args.list_devices {
        device::list_devices(&cpal::default_host())?;
        return Ok(());
    }

    let cfg = match args.config.as_ref() {
        Some(path) => config::ServerConfig::load(path)?,
        None => {
            let auto_path = std::env::current_exe()
                .ok()
                .and_then(|path| path.parent().map(|dir| dir.join("config.toml")));
            match auto_path {
                Some(path) if path.exists() => config::ServerConfig::load(&path)?,
                _ => {
                    return Err(anyhow::anyhow!("config file is required; use --config"));
                }
            }
        }
    };

    let bind = match args.bind {
        Some(addr) => addr,
        None => config::bind_from_config(&cfg)?
            .unwrap_or_else(|| "127.0.0.1:5580".parse().expect("default bind")),
    };

    let speech_cfg = cfg.speech.clone().unwrap_or_default();
    let client = SpeechClient::new(&speech_cfg)?;
    let payload_hint = Some(client.payload_format().to_string());
    let target = config::decode_target_from_config(&cfg);
    let device_hint = args.device.clone().or_else(|| config::device_from_config(&cfg));
    let tuning = PlaybackTuning::default();

    let cache = Arc::new(PlaybackCache::new());
    let status = NarrationStatusState::shared();
    let sink = CpalSink::new(device_hint.clone(), tuning.clone());
    let backend = ThreadedGenerator::new(Arc::new(client), target, payload_hint, tuning.chunk_frames);
    let controller = spawn_controller(Box::new(backend), Box::new(sink), cache, status);

    let controller_for_signal = controller.clone();
    let _ = ctrlc::set_handler(move || {
        controller_for_signal.quit();
        std::process::exit(130);
    });

    tracing::info!(
        bind = %bind,
        device = device_hint.as_deref().unwrap_or("default"),
        clip_rate_hz = target.sample_rate,
        "starting narration-server"
    );

    let state = web::Data::new(api::AppState {
        controller: controller.clone(),
    });
    HttpServer::new(move || {
        App::new().app_data(state.clone()).service(
            web::scope("/api")
                .service(api::health)
                .service(api::status)
                .service(api::narrate)
                .service(api::stop)
                .service(api::narration_audio)
                .service(openapi::openapi_json),
        )
    })
    .bind(bind)?
    .run()
    .await?;

    controller.quit();
    Ok(())
}
